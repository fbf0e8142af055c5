//! Command execution against a signed-in [`FolderManager`].

use crate::cli::{Command, FolderAction, ImageAction};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use memefold_library::{Folder, FolderManager, NewImage, find_orphans, format_bytes, remove_orphans};
use memefold_records::{FolderId, ImageId};
use std::io::Write;

macro_rules! out {
    ($out:expr, $($arg:tt)*) => {
        writeln!($out, $($arg)*).or_raise(|| ErrorKind::Output)?
    };
}

pub async fn run(manager: &FolderManager, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Folders { action } => folders(manager, action, out).await,
        Command::Images { action } => images(manager, action, out).await,
        Command::Usage => usage(manager, out).await,
        Command::Orphans { min_age, delete } => orphans(manager, min_age, delete, out).await,
    }
}

fn describe(folder: &Folder) -> String {
    let count = folder.images.len();
    let noun = if count == 1 { "image" } else { "images" };
    let visibility = if folder.is_public { ", public" } else { "" };
    format!("{}\t{}\t{}\t{count} {noun}{visibility}", folder.id, folder.name, folder.color)
}

async fn folders(manager: &FolderManager, action: FolderAction, out: &mut impl Write) -> Result<()> {
    match action {
        FolderAction::List => {
            let folders = manager.folders().await.or_raise(|| ErrorKind::Command)?;
            out!(out, "{}", describe(folders.favorites()));
            for folder in folders.iter() {
                out!(out, "{}", describe(folder));
            }
        },
        FolderAction::Create { name, color } => {
            let id = manager.create_folder(&name, color.as_deref()).await.or_raise(|| ErrorKind::Command)?;
            out!(out, "{id}");
        },
        FolderAction::Rename { id, name } => {
            manager.rename_folder(&FolderId::from(id), &name).await.or_raise(|| ErrorKind::Command)?;
        },
        FolderAction::Color { id, color } => {
            manager.set_folder_color(&FolderId::from(id), &color).await.or_raise(|| ErrorKind::Command)?;
        },
        FolderAction::Public { id, public } => {
            manager.set_folder_public(&FolderId::from(id), public).await.or_raise(|| ErrorKind::Command)?;
        },
        FolderAction::Delete { id } => {
            manager.delete_folder(&FolderId::from(id)).await.or_raise(|| ErrorKind::Command)?;
        },
    }
    Ok(())
}

async fn images(manager: &FolderManager, action: ImageAction, out: &mut impl Write) -> Result<()> {
    match action {
        ImageAction::Add { folder, sources, favorite } => {
            let folder = FolderId::from(folder);
            for source in sources {
                let image = manager
                    .add_image(&folder, NewImage::new(source).favorite(favorite))
                    .await
                    .or_raise(|| ErrorKind::Command)?;
                out!(out, "{}\t{}", image.id, image.url);
            }
        },
        ImageAction::Remove { folder, image } => {
            manager
                .remove_image(&FolderId::from(folder), &ImageId::from(image))
                .await
                .or_raise(|| ErrorKind::Command)?;
        },
        ImageAction::Favorite { folder, image } => {
            let is_favorite = manager
                .toggle_favorite(&FolderId::from(folder), &ImageId::from(image))
                .await
                .or_raise(|| ErrorKind::Command)?;
            out!(out, "{}", if is_favorite { "favorite" } else { "not favorite" });
        },
        ImageAction::Reorder { folder, images } => {
            let order: Vec<ImageId> = images.into_iter().map(ImageId::from).collect();
            manager.reorder_images(&FolderId::from(folder), &order).await.or_raise(|| ErrorKind::Command)?;
        },
        ImageAction::Move { image, from, to } => {
            let moved = manager
                .move_image(&ImageId::from(image), &FolderId::from(from), &FolderId::from(to))
                .await
                .or_raise(|| ErrorKind::Command)?;
            out!(out, "{}\t{}", moved.id, moved.folder_id);
        },
    }
    Ok(())
}

async fn usage(manager: &FolderManager, out: &mut impl Write) -> Result<()> {
    let usage = manager.storage_usage().await.or_raise(|| ErrorKind::Command)?;
    out!(
        out,
        "{} of {} used ({:.1}%)",
        format_bytes(usage.used),
        format_bytes(usage.limit),
        usage.percentage()
    );
    let premium = manager.context().limits.premium_tier_bytes;
    if usage.limit < premium && usage.percentage() >= 80.0 {
        out!(out, "Premium accounts get {} of storage.", format_bytes(premium));
    }
    Ok(())
}

async fn orphans(manager: &FolderManager, min_age: u32, delete: bool, out: &mut impl Write) -> Result<()> {
    let folders = manager.folders().await.or_raise(|| ErrorKind::Command)?;
    let context = manager.context();
    let min_age = time::Duration::seconds(i64::from(min_age));
    if delete {
        let removed = remove_orphans(context, folders.user(), min_age).await.or_raise(|| ErrorKind::Command)?;
        out!(out, "removed {} objects ({})", removed.objects, format_bytes(removed.bytes));
        if removed.failed > 0 {
            out!(out, "{} objects could not be removed", removed.failed);
        }
    } else {
        for orphan in find_orphans(context, folders.user(), min_age).await.or_raise(|| ErrorKind::Command)? {
            out!(out, "{}\t{}", orphan.path.display(), format_bytes(orphan.size));
        }
    }
    Ok(())
}
