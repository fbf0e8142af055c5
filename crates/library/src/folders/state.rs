use memefold_records::{FolderId, FolderRecord, ImageId, ImageRecord, UserId};
use std::collections::HashSet;
use time::UtcDateTime;

/// Id of the derived Favorites folder.
pub const FAVORITES_ID: &str = "Favorites";
pub const FAVORITES_COLOR: &str = "#FFD700";

/// Whether `id` names the derived Favorites folder rather than a real one.
pub fn is_favorites(id: &FolderId) -> bool {
    id.as_str() == FAVORITES_ID
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub id: ImageId,
    /// The real folder this image belongs to, also when listed in Favorites.
    pub folder_id: FolderId,
    pub url: String,
    pub is_favorite: bool,
    pub position: i64,
    pub size: Option<u64>,
    pub storage_path: Option<String>,
    pub created_at: UtcDateTime,
}
impl From<ImageRecord> for Image {
    fn from(record: ImageRecord) -> Self {
        Self {
            id: record.id,
            folder_id: record.folder_id,
            url: record.url,
            is_favorite: record.is_favorite,
            position: record.position,
            size: record.file_size_bytes,
            storage_path: record.storage_path,
            created_at: record.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub color: String,
    pub is_public: bool,
    /// In display order.
    pub images: Vec<Image>,
}
impl Folder {
    pub fn is_derived(&self) -> bool {
        is_favorites(&self.id)
    }

    pub fn image(&self, id: &ImageId) -> Option<&Image> {
        self.images.iter().find(|i| &i.id == id)
    }

    /// Position for an image appended at the end.
    pub(crate) fn next_position(&self) -> i64 {
        self.images.iter().map(|i| i.position).max().map_or(0, |p| p + 1)
    }

    pub(crate) fn apply(&mut self, record: FolderRecord) {
        self.name = record.name;
        self.color = record.color;
        self.is_public = record.is_public;
    }
}
impl From<FolderRecord> for Folder {
    fn from(record: FolderRecord) -> Self {
        Self { id: record.id, name: record.name, color: record.color, is_public: record.is_public, images: Vec::new() }
    }
}

/// Immutable view of a user's folders.
///
/// Favorites is projected from the real folders when the snapshot is built:
/// every image flagged as a favorite, in folder order and then image order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Folders {
    user: UserId,
    folders: Vec<Folder>,
    favorites: Folder,
}
impl Folders {
    pub(crate) fn new(user: UserId, folders: Vec<Folder>) -> Self {
        let mut seen = HashSet::new();
        let images = folders
            .iter()
            .flat_map(|f| f.images.iter())
            .filter(|i| i.is_favorite && seen.insert(i.id.clone()))
            .cloned()
            .collect();
        let favorites = Folder {
            id: FolderId::from(FAVORITES_ID),
            name: FAVORITES_ID.to_string(),
            color: FAVORITES_COLOR.to_string(),
            is_public: false,
            images,
        };
        Self { user, folders, favorites }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Real folders, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Folder> {
        self.folders.iter()
    }

    pub fn favorites(&self) -> &Folder {
        &self.favorites
    }

    /// A real folder, or Favorites for its sentinel id.
    pub fn get(&self, id: &FolderId) -> Option<&Folder> {
        if is_favorites(id) {
            return Some(&self.favorites);
        }
        self.folders.iter().find(|f| &f.id == id)
    }

    /// Number of real folders.
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Images across all real folders.
    pub fn image_count(&self) -> usize {
        self.folders.iter().map(|f| f.images.len()).sum()
    }

    pub fn favorite_count(&self) -> usize {
        self.favorites.images.len()
    }

    /// Find an image by id in any real folder.
    pub fn find_image(&self, id: &ImageId) -> Option<&Image> {
        self.folders.iter().find_map(|f| f.image(id))
    }

    pub(crate) fn to_vec(&self) -> Vec<Folder> {
        self.folders.clone()
    }
}
impl<'a> IntoIterator for &'a Folders {
    type Item = &'a Folder;
    type IntoIter = std::slice::Iter<'a, Folder>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str, folder: &str, position: i64, is_favorite: bool) -> Image {
        Image {
            id: id.into(),
            folder_id: folder.into(),
            url: format!("https://cdn.example.com/{id}.png"),
            is_favorite,
            position,
            size: None,
            storage_path: None,
            created_at: UtcDateTime::UNIX_EPOCH,
        }
    }

    fn folder(id: &str, images: Vec<Image>) -> Folder {
        Folder { id: id.into(), name: id.to_uppercase(), color: "#a855f7".into(), is_public: false, images }
    }

    #[test]
    fn test_favorites_projection() {
        let folders = Folders::new(
            "u".into(),
            vec![
                folder("a", vec![image("1", "a", 0, false), image("2", "a", 1, true)]),
                folder("b", vec![image("3", "b", 0, true)]),
            ],
        );
        let ids: Vec<_> = folders.favorites().images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(folders.favorites().color, FAVORITES_COLOR);
        assert!(folders.favorites().is_derived());
        assert_eq!(folders.image_count(), 3);
        assert_eq!(folders.favorite_count(), 2);
        assert_eq!(folders.len(), 2);
    }

    #[test]
    fn test_get_resolves_sentinel() {
        let folders = Folders::new("u".into(), vec![folder("a", vec![image("1", "a", 0, true)])]);
        assert_eq!(folders.get(&FAVORITES_ID.into()).map(|f| f.images.len()), Some(1));
        assert_eq!(folders.get(&"a".into()).map(|f| f.name.as_str()), Some("A"));
        assert!(folders.get(&"z".into()).is_none());
        assert_eq!(folders.find_image(&"1".into()).map(|i| i.folder_id.as_str()), Some("a"));
    }

    #[test]
    fn test_next_position() {
        assert_eq!(folder("a", vec![]).next_position(), 0);
        assert_eq!(folder("a", vec![image("1", "a", 4, false), image("2", "a", 2, false)]).next_position(), 5);
    }
}
