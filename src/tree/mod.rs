//! In-memory file tree: directories and files addressed by `/`-separated
//! paths, kept sorted for deterministic traversal.
//!
//! Directories own their children; parent links are weak back-references
//! used only for path validation and detachment.

mod allocator;
mod checker;
mod entity;
mod error;
mod file_tree;
mod linkage;
mod path;

pub use allocator::{HeapAllocator, PathAllocator};
pub use checker::{
    InvariantViolation, Report, TracingReport, check_directory, check_file, check_tree, is_valid,
};
pub use entity::{
    DirRef, DirectoryNode, Entity, FileNode, FileRef, compare, destroy_directory, destroy_file,
};
pub use error::TreeError;
pub use file_tree::{EntryInfo, EntryKind, FileTree, TreeConfig};
pub use linkage::{has_directory, has_file, link_directory, link_file, unlink_directory, unlink_file};
pub use path::{SEPARATOR, is_direct_child, join, segments};
