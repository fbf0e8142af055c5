use crate::error::{Error, ErrorKind};
use exn::ResultExt;

/// Account-level storage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    pub used_bytes: u64,
    /// `None` when the account has no explicit limit (free tier).
    pub limit_bytes: Option<u64>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct UsageRow {
    storage_used_bytes: i64,
    storage_limit_bytes: Option<i64>,
}
impl TryFrom<UsageRow> for StorageUsage {
    type Error = Error;
    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            used_bytes: u64::try_from(row.storage_used_bytes).or_raise(|| ErrorKind::InvalidData("storage used"))?,
            limit_bytes: row
                .storage_limit_bytes
                .map(u64::try_from)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("storage limit"))?,
        })
    }
}
