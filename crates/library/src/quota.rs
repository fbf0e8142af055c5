//! Storage quota checks.
//!
//! Before any bytes are transferred, the candidate file is checked against the
//! single-file ceiling and the account's remaining storage. The check only
//! reads; the usage counter is maintained by the record store as image
//! records come and go.

use crate::context::Limits;
use crate::error::{ErrorKind, Limit, Result, UploadFailure};
use derive_more::Display;
use exn::ResultExt;
use memefold_records::{RecordStore, UserId};

/// An account's storage consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Usage {
    pub used: u64,
    /// Effective limit, with the free-tier default applied.
    pub limit: u64,
}
impl Usage {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    /// Share of the limit in use, from 0 to 100.
    pub fn percentage(&self) -> f64 {
        if self.limit == 0 {
            return 100.0;
        }
        (self.used as f64 / self.limit as f64 * 100.0).min(100.0)
    }
}

/// Why an upload was refused.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Denial {
    #[display("file is too large ({} > {})", format_bytes(*size), format_bytes(*max))]
    FileTooLarge { size: u64, max: u64 },
    #[display("storage limit exceeded ({} used of {})", format_bytes(*used), format_bytes(*limit))]
    QuotaExceeded { used: u64, limit: u64, requested: u64 },
    #[display("could not verify storage")]
    Unverified,
}
impl From<Denial> for ErrorKind {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::FileTooLarge { size, max } => Self::LimitExceeded(Limit::FileSize { size, max }),
            Denial::QuotaExceeded { used, limit, requested } => {
                Self::LimitExceeded(Limit::Storage { used, limit, requested })
            },
            Denial::Unverified => Self::Upload(UploadFailure::Unverified),
        }
    }
}

/// Outcome of [`check_limit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub reason: Option<Denial>,
    /// Current usage, if the account could be read.
    pub usage: Option<Usage>,
}
impl QuotaCheck {
    fn allow(usage: Usage) -> Self {
        Self { allowed: true, reason: None, usage: Some(usage) }
    }

    fn deny(reason: Denial, usage: Option<Usage>) -> Self {
        Self { allowed: false, reason: Some(reason), usage }
    }

    /// Turn a refusal into an error.
    #[track_caller]
    pub fn into_result(self) -> Result<Option<Usage>> {
        match self.reason {
            Some(denial) => Err(exn::Exn::from(ErrorKind::from(denial))),
            None => Ok(self.usage),
        }
    }
}

/// Decide whether `size` more bytes may be uploaded for `user`.
///
/// Fails closed: if the account can't be read, the upload is refused with
/// [`Denial::Unverified`].
pub async fn check_limit(records: &dyn RecordStore, limits: &Limits, user: &UserId, size: u64) -> QuotaCheck {
    let usage = match records.storage_usage(user).await {
        Ok(usage) => Usage { used: usage.used_bytes, limit: limits.storage_limit(usage.limit_bytes) },
        Err(err) => {
            tracing::warn!(user = %user, error = %err, "could not read storage usage");
            return QuotaCheck::deny(Denial::Unverified, None);
        },
    };
    if size > limits.max_file_size {
        return QuotaCheck::deny(Denial::FileTooLarge { size, max: limits.max_file_size }, Some(usage));
    }
    if usage.used.saturating_add(size) > usage.limit {
        let denial = Denial::QuotaExceeded { used: usage.used, limit: usage.limit, requested: size };
        return QuotaCheck::deny(denial, Some(usage));
    }
    QuotaCheck::allow(usage)
}

/// Current usage of an account, for display.
pub async fn storage_usage(records: &dyn RecordStore, limits: &Limits, user: &UserId) -> Result<Usage> {
    let usage = records.storage_usage(user).await.or_raise(|| ErrorKind::Remote)?;
    Ok(Usage { used: usage.used_bytes, limit: limits.storage_limit(usage.limit_bytes) })
}

/// Human-readable byte count, in powers of 1024.
///
/// ```
/// use memefold_library::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 Bytes");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{:.2}", (value * 100.0).round() / 100.0);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use memefold_records::{MockStore, Operation};
    use rstest::rstest;

    const MIB: u64 = 1024 * 1024;

    fn store(used: u64, limit: Option<u64>) -> MockStore {
        MockStore::default().with_profile("user-1", used, limit)
    }

    #[rstest]
    #[case(0, "0 Bytes")]
    #[case(1, "1 Bytes")]
    #[case(1023, "1023 Bytes")]
    #[case(1024, "1 KB")]
    #[case(1536, "1.5 KB")]
    #[case(1_234_567, "1.18 MB")]
    #[case(10 * MIB, "10 MB")]
    #[case(5 * 1024 * MIB, "5 GB")]
    #[case(3 * 1024 * 1024 * MIB, "3072 GB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[rstest]
    #[case(0, 100, 0.0)]
    #[case(50, 200, 25.0)]
    #[case(300, 200, 100.0)]
    #[case(1, 0, 100.0)]
    fn test_percentage(#[case] used: u64, #[case] limit: u64, #[case] expected: f64) {
        assert_eq!(Usage { used, limit }.percentage(), expected);
    }

    #[tokio::test]
    async fn test_allowed_reports_usage() {
        let records = store(2 * MIB, None);
        let check = check_limit(&records, &Limits::default(), &"user-1".into(), 2 * MIB).await;
        assert!(check.allowed);
        assert_eq!(check.reason, None);
        assert_eq!(check.usage, Some(Usage { used: 2 * MIB, limit: 100 * MIB }));
    }

    #[tokio::test]
    async fn test_file_too_large_even_with_quota_left() {
        let records = store(0, Some(1024 * MIB));
        let check = check_limit(&records, &Limits::default(), &"user-1".into(), 11 * MIB).await;
        assert!(!check.allowed);
        assert_eq!(check.reason, Some(Denial::FileTooLarge { size: 11 * MIB, max: 10 * MIB }));
        let err = check.into_result().unwrap_err();
        assert!(matches!(&*err, ErrorKind::LimitExceeded(Limit::FileSize { .. })));
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let records = store(99 * MIB, None);
        let check = check_limit(&records, &Limits::default(), &"user-1".into(), 2 * MIB).await;
        assert_eq!(
            check.reason,
            Some(Denial::QuotaExceeded { used: 99 * MIB, limit: 100 * MIB, requested: 2 * MIB })
        );
        // Exactly filling the quota is fine
        let check = check_limit(&records, &Limits::default(), &"user-1".into(), MIB).await;
        assert!(check.allowed);
    }

    #[tokio::test]
    async fn test_fails_closed() {
        let records = store(0, None).fail_always(Operation::StorageUsage);
        let check = check_limit(&records, &Limits::default(), &"user-1".into(), 1).await;
        assert!(!check.allowed);
        assert_eq!(check.reason, Some(Denial::Unverified));
        assert_eq!(check.reason.map(|r| r.to_string()).as_deref(), Some("could not verify storage"));
        assert_eq!(check.usage, None);
        let err = check.into_result().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Upload(UploadFailure::Unverified)));
    }

    #[tokio::test]
    async fn test_missing_profile_fails_closed() {
        let records = MockStore::default();
        let check = check_limit(&records, &Limits::default(), &"user-1".into(), 1).await;
        assert_eq!(check.reason, Some(Denial::Unverified));
    }

    #[tokio::test]
    async fn test_storage_usage() {
        let records = store(MIB, Some(4 * MIB));
        let usage = storage_usage(&records, &Limits::default(), &"user-1".into()).await.unwrap();
        assert_eq!(usage, Usage { used: MIB, limit: 4 * MIB });
        assert_eq!(usage.remaining(), 3 * MIB);
        let err = storage_usage(&MockStore::default(), &Limits::default(), &"user-1".into()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Remote));
    }
}
