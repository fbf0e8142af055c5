use crate::error::{Error, ErrorKind};
use crate::models::{FolderId, ImageId, UserId};
use exn::ResultExt;
use time::UtcDateTime;

/// Image metadata as persisted. The bytes live in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub user_id: UserId,
    pub folder_id: FolderId,
    /// Durable (public) URL of the image bytes.
    pub url: String,
    pub is_favorite: bool,
    /// Sort key within the folder, ascending.
    pub position: i64,
    /// Size counted against the account quota; `None` for images hosted elsewhere.
    pub file_size_bytes: Option<u64>,
    /// Object storage path, if the bytes were uploaded by us.
    pub storage_path: Option<String>,
    pub created_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub user_id: UserId,
    pub folder_id: FolderId,
    pub url: String,
    pub is_favorite: bool,
    pub position: i64,
    pub file_size_bytes: Option<u64>,
    pub storage_path: Option<String>,
}

/// Partial update of an image; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageUpdate {
    pub folder_id: Option<FolderId>,
    pub is_favorite: Option<bool>,
    pub position: Option<i64>,
}
impl ImageUpdate {
    pub fn favorite(is_favorite: bool) -> Self {
        Self { is_favorite: Some(is_favorite), ..Self::default() }
    }

    pub fn position(position: i64) -> Self {
        Self { position: Some(position), ..Self::default() }
    }

    pub fn move_to(folder_id: FolderId, position: i64) -> Self {
        Self { folder_id: Some(folder_id), position: Some(position), ..Self::default() }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ImageRow {
    id: String,
    user_id: String,
    folder_id: String,
    url: String,
    is_favorite: bool,
    position: i64,
    file_size_bytes: Option<i64>,
    storage_path: Option<String>,
    created_at: i64,
}
impl TryFrom<ImageRow> for ImageRecord {
    type Error = Error;
    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            folder_id: row.folder_id.into(),
            url: row.url,
            is_favorite: row.is_favorite,
            position: row.position,
            file_size_bytes: row
                .file_size_bytes
                .map(u64::try_from)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("file size"))?,
            storage_path: row.storage_path,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("image creation date"))?,
        })
    }
}
