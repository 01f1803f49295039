//! Attaching and detaching entities to a parent directory's sorted child
//! collections.
//!
//! Files and directories share one namespace: a directory never holds a file
//! and a subdirectory with the same path.

use std::cell::RefCell;
use std::rc::Rc;

use snafu::{OptionExt, ensure};
use tracing::debug;

use super::entity::{DirRef, DirectoryNode, Entity, FileRef};
use super::error::{AlreadyInTreeSnafu, MemorySnafu, ParentChildSnafu, TreeError};
use super::path;

/// Binary search over a sorted child collection. `Ok(index)` when a child
/// with `path` exists, `Err(index)` with the insertion point otherwise.
fn search<E: Entity>(children: &[Rc<RefCell<E>>], path: &str) -> Result<usize, usize> {
    children.binary_search_by(|child| child.borrow().path().cmp(path))
}

/// Looks up a subdirectory of `parent` by full path.
pub fn has_directory(parent: &DirectoryNode, path: &str) -> Result<usize, usize> {
    search(&parent.dirs, path)
}

/// Looks up a file of `parent` by full path.
pub fn has_file(parent: &DirectoryNode, path: &str) -> Result<usize, usize> {
    search(&parent.files, path)
}

/// Which of a directory's child collections an entity belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildKind {
    Directory,
    File,
}

/// Checks the structural preconditions shared by both kinds of link and
/// returns the insertion index within the collection for `kind`.
fn check_linkable(
    parent: &DirectoryNode,
    child_path: &str,
    kind: ChildKind,
) -> Result<usize, TreeError> {
    let (same, other) = match kind {
        ChildKind::Directory => (has_directory(parent, child_path), has_file(parent, child_path)),
        ChildKind::File => (has_file(parent, child_path), has_directory(parent, child_path)),
    };
    let index = match (same, other) {
        (Err(index), Err(_)) => index,
        _ => return AlreadyInTreeSnafu { path: child_path }.fail(),
    };
    ensure!(
        path::is_direct_child(&parent.path, child_path),
        ParentChildSnafu {
            parent: parent.path.as_str(),
            child: child_path,
        }
    );
    Ok(index)
}

/// Makes `child` a subdirectory of `parent`.
pub fn link_directory(parent: &DirRef, child: &DirRef) -> Result<(), TreeError> {
    let child_path = child.borrow().path.clone();
    ensure!(
        !Rc::ptr_eq(parent, child),
        ParentChildSnafu {
            parent: child_path.as_str(),
            child: child_path.as_str(),
        }
    );

    let mut parent_node = parent.borrow_mut();
    let index = check_linkable(&parent_node, &child_path, ChildKind::Directory)?;
    parent_node
        .dirs
        .try_reserve(1)
        .ok()
        .context(MemorySnafu { path: child_path.as_str() })?;
    parent_node.dirs.insert(index, Rc::clone(child));
    child.borrow_mut().parent = Rc::downgrade(parent);

    debug!("Linked directory '{}' under '{}'", child_path, parent_node.path);
    Ok(())
}

/// Makes `child` a file of `parent`.
pub fn link_file(parent: &DirRef, child: &FileRef) -> Result<(), TreeError> {
    let child_path = child.borrow().path.clone();
    let mut parent_node = parent.borrow_mut();
    let index = check_linkable(&parent_node, &child_path, ChildKind::File)?;
    parent_node
        .files
        .try_reserve(1)
        .ok()
        .context(MemorySnafu { path: child_path.as_str() })?;
    parent_node.files.insert(index, Rc::clone(child));
    child.borrow_mut().parent = Rc::downgrade(parent);

    debug!("Linked file '{}' under '{}'", child_path, parent_node.path);
    Ok(())
}

/// Removes `child` from `parent`'s subdirectories. Does nothing if it is not
/// there. The child itself is left intact apart from its parent reference.
pub fn unlink_directory(parent: &DirRef, child: &DirRef) {
    let child_path = child.borrow().path.clone();
    let mut parent_node = parent.borrow_mut();
    if let Ok(index) = has_directory(&parent_node, &child_path)
        && Rc::ptr_eq(&parent_node.dirs[index], child)
    {
        let removed = parent_node.dirs.remove(index);
        removed.borrow_mut().parent = Default::default();
    }
}

/// Removes `child` from `parent`'s files. Does nothing if it is not there.
pub fn unlink_file(parent: &DirRef, child: &FileRef) {
    let child_path = child.borrow().path.clone();
    let mut parent_node = parent.borrow_mut();
    if let Ok(index) = has_file(&parent_node, &child_path)
        && Rc::ptr_eq(&parent_node.files[index], child)
    {
        let removed = parent_node.files.remove(index);
        removed.borrow_mut().parent = Default::default();
    }
}
