use std::cell::RefCell;
use std::cmp::Ordering;
use std::mem;
use std::rc::{Rc, Weak};

use snafu::OptionExt;

use super::allocator::PathAllocator;
use super::error::{MemorySnafu, TreeError};
use super::linkage;
use super::path::SEPARATOR;

pub type DirRef = Rc<RefCell<DirectoryNode>>;
pub type FileRef = Rc<RefCell<FileNode>>;

/// Anything stored in the tree, addressed by its full path.
pub trait Entity {
    fn path(&self) -> &str;
    fn parent(&self) -> Option<DirRef>;
}

/// Orders two entities by path. This is the only ordering key used for
/// both child collections.
pub fn compare(first: &impl Entity, second: &impl Entity) -> Ordering {
    first.path().cmp(second.path())
}

/// A directory: a path plus two sorted child collections.
#[derive(Debug)]
pub struct DirectoryNode {
    pub(crate) path: String,
    pub(crate) parent: Weak<RefCell<DirectoryNode>>,
    pub(crate) files: Vec<FileRef>,
    pub(crate) dirs: Vec<DirRef>,
}

/// A leaf holding an opaque byte buffer.
#[derive(Debug)]
pub struct FileNode {
    pub(crate) path: String,
    pub(crate) parent: Weak<RefCell<DirectoryNode>>,
    pub(crate) contents: Vec<u8>,
}

impl Entity for DirectoryNode {
    fn path(&self) -> &str {
        &self.path
    }

    fn parent(&self) -> Option<DirRef> {
        self.parent.upgrade()
    }
}

impl Entity for FileNode {
    fn path(&self) -> &str {
        &self.path
    }

    fn parent(&self) -> Option<DirRef> {
        self.parent.upgrade()
    }
}

/// Builds `parent_path/segment`, or just `segment` when there is no parent.
fn build_path(
    segment: &str,
    parent_path: Option<&str>,
    allocator: &mut impl PathAllocator,
) -> Result<String, TreeError> {
    let capacity = parent_path.map_or(0, |parent| parent.len() + 1) + segment.len();
    let mut path = allocator.allocate(capacity).with_context(|| MemorySnafu {
        path: match parent_path {
            Some(parent) => format!("{parent}{SEPARATOR}{segment}"),
            None => segment.to_string(),
        },
    })?;

    if let Some(parent) = parent_path {
        path.push_str(parent);
        path.push(SEPARATOR);
    }
    path.push_str(segment);
    Ok(path)
}

impl DirectoryNode {
    /// Creates an unattached directory named `segment` below `parent_path`.
    /// The caller links it with [`linkage::link_directory`].
    pub fn create(
        segment: &str,
        parent_path: Option<&str>,
        allocator: &mut impl PathAllocator,
    ) -> Result<DirRef, TreeError> {
        let path = build_path(segment, parent_path, allocator)?;
        Ok(Rc::new(RefCell::new(Self {
            path,
            parent: Weak::new(),
            files: Vec::new(),
            dirs: Vec::new(),
        })))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn file(&self, index: usize) -> Option<FileRef> {
        self.files.get(index).cloned()
    }

    pub fn dir(&self, index: usize) -> Option<DirRef> {
        self.dirs.get(index).cloned()
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    pub fn dirs(&self) -> &[DirRef] {
        &self.dirs
    }
}

impl FileNode {
    /// Creates an unattached file named `segment` inside the directory at
    /// `parent_path`, taking ownership of `contents`.
    pub fn create(
        segment: &str,
        parent_path: &str,
        contents: Vec<u8>,
        allocator: &mut impl PathAllocator,
    ) -> Result<FileRef, TreeError> {
        let path = build_path(segment, Some(parent_path), allocator)?;
        Ok(Rc::new(RefCell::new(Self {
            path,
            parent: Weak::new(),
            contents,
        })))
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Installs `contents` and returns the previous buffer.
    pub fn replace_contents(&mut self, contents: Vec<u8>) -> Vec<u8> {
        mem::replace(&mut self.contents, contents)
    }
}

/// Destroys `dir` and everything below it, detaching it from its parent
/// first. Returns the number of entities destroyed.
pub fn destroy_directory(dir: DirRef) -> usize {
    let parent = dir.borrow().parent();
    if let Some(parent) = parent {
        linkage::unlink_directory(&parent, &dir);
    }

    // Explicit stack so deep hierarchies never recurse through Drop.
    let mut destroyed = 0;
    let mut pending = vec![dir];
    while let Some(dir) = pending.pop() {
        let mut node = dir.borrow_mut();
        destroyed += 1 + node.files.len();
        node.files.clear();
        pending.append(&mut node.dirs);
    }
    destroyed
}

/// Destroys a single file, detaching it from its parent first.
pub fn destroy_file(file: FileRef) -> usize {
    let parent = file.borrow().parent();
    if let Some(parent) = parent {
        linkage::unlink_file(&parent, &file);
    }
    1
}
