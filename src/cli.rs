//! Command-line arguments.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "memefold", version, about = "Organize saved images into folders", long_about = None)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON). Defaults to `config.toml` in the
    /// platform config directory.
    #[arg(short, long, global = true, env = "MEMEFOLD_CONFIG")]
    pub config: Option<PathBuf>,
    /// More logging. Repeat for more.
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,
    /// Less logging. Repeat for less.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,
    /// Account to act as.
    #[arg(short, long, env = "MEMEFOLD_USER")]
    pub user: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage folders
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },
    /// Manage images within folders
    Images {
        #[command(subcommand)]
        action: ImageAction,
    },
    /// Show storage used by the account
    Usage,
    /// Find stored objects that no image refers to
    Orphans {
        /// Ignore objects younger than this many seconds.
        #[arg(long, default_value_t = 3600)]
        min_age: u32,
        /// Delete what was found.
        #[arg(long)]
        delete: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum FolderAction {
    /// List folders, Favorites first
    List,
    Create {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    Rename {
        id: String,
        name: String,
    },
    Color {
        id: String,
        color: String,
    },
    /// Mark a folder public or private
    Public {
        id: String,
        #[arg(action = ArgAction::Set)]
        public: bool,
    },
    /// Delete a folder and every image in it
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ImageAction {
    /// Add images from local files or remote URLs
    Add {
        folder: String,
        #[arg(required = true)]
        sources: Vec<String>,
        #[arg(long)]
        favorite: bool,
    },
    Remove {
        folder: String,
        image: String,
    },
    /// Toggle the favorite flag of an image
    Favorite {
        folder: String,
        image: String,
    },
    /// Set the display order of every image in a folder
    Reorder {
        folder: String,
        #[arg(required = true)]
        images: Vec<String>,
    },
    Move {
        image: String,
        from: String,
        to: String,
    },
}
