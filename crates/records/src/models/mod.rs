//! Record models and their SQLite row counterparts.

mod folder;
mod image;
mod profile;

pub use self::folder::{FolderRecord, FolderUpdate, NewFolder};
pub(crate) use self::folder::FolderRow;
pub use self::image::{ImageRecord, ImageUpdate, NewImage};
pub(crate) use self::image::ImageRow;
pub use self::profile::StorageUsage;
pub(crate) use self::profile::UsageRow;
use derive_more::Display;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

id_type!(
    /// Identity of an account, handed out by the authentication provider.
    UserId
);
id_type!(
    /// Store-assigned folder identifier.
    FolderId
);
id_type!(
    /// Store-assigned image identifier.
    ImageId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_and_compare() {
        let a = FolderId::from("a");
        let b = FolderId::new(String::from("b"));
        assert!(a < b);
        assert_eq!(a.to_string(), "a");
        assert_eq!(b.as_str(), "b");
        assert_eq!(UserId::from("u").as_ref(), "u");
    }
}
