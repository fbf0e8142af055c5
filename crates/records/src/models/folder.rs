use crate::error::{Error, ErrorKind};
use crate::models::{FolderId, UserId};
use exn::ResultExt;
use time::UtcDateTime;

/// A user-created folder as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRecord {
    pub id: FolderId,
    pub user_id: UserId,
    pub name: String,
    pub color: String,
    pub is_public: bool,
    pub created_at: UtcDateTime,
}

/// Fields for a folder that doesn't exist yet. New folders start private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFolder {
    pub user_id: UserId,
    pub name: String,
    pub color: String,
}

/// Partial update of a folder; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub is_public: Option<bool>,
}
impl FolderUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn color(color: impl Into<String>) -> Self {
        Self { color: Some(color.into()), ..Self::default() }
    }

    pub fn public(is_public: bool) -> Self {
        Self { is_public: Some(is_public), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none() && self.is_public.is_none()
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FolderRow {
    id: String,
    user_id: String,
    name: String,
    color: String,
    is_public: bool,
    created_at: i64,
}
impl TryFrom<FolderRow> for FolderRecord {
    type Error = Error;
    fn try_from(row: FolderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            name: row.name,
            color: row.color,
            is_public: row.is_public,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("folder creation date"))?,
        })
    }
}
