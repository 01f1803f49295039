//! Independent structural validation of a file tree.
//!
//! The checker walks the whole hierarchy and re-derives every invariant the
//! mutation code is supposed to maintain, without reusing the linkage
//! helpers. A failure means the tree code has a bug.

use std::cmp::Ordering;
use std::rc::Rc;

use snafu::{OptionExt, Snafu, ensure};
use tracing::error;

use super::entity::{DirRef, Entity, FileNode};
use super::path::SEPARATOR;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum InvariantViolation {
    #[snafu(display("Not initialized, but count is {}", count))]
    UninitializedWithCount { count: usize },
    #[snafu(display("Not initialized, but root is not empty"))]
    UninitializedWithRoot,
    #[snafu(display("Tree has no root, but count is {}", count))]
    EmptyWithCount { count: usize },
    #[snafu(display("Root path '{}' contains the separator", path))]
    RootPathHasSeparator { path: String },
    #[snafu(display("Root '{}' has a parent", path))]
    RootHasParent { path: String },
    #[snafu(display("An entity has an empty path"))]
    EmptyPath,
    #[snafu(display("File '{}' is not attached to a directory", path))]
    DetachedFile { path: String },
    #[snafu(display("Parent path '{}' is not a prefix of '{}'", parent, child))]
    NotAPrefix { parent: String, child: String },
    #[snafu(display("'{}' is not a direct child of '{}'", child, parent))]
    NotADirectChild { parent: String, child: String },
    #[snafu(display("'{}' is stored under '{}' but points at another parent", child, parent))]
    ParentMismatch { parent: String, child: String },
    #[snafu(display("Children '{}' and '{}' are out of order", first, second))]
    ChildrenOutOfOrder { first: String, second: String },
    #[snafu(display("Directory has duplicate children '{}'", path))]
    DuplicateChild { path: String },
    #[snafu(display("'{}' is both a file and a directory", path))]
    KindCollision { path: String },
    #[snafu(display("Counted {} entities, but count is {}", counted, count))]
    CountMismatch { counted: usize, count: usize },
}

/// Destination for checker diagnostics.
pub trait Report {
    fn report(&mut self, violation: &InvariantViolation);
}

/// Emits every violation as a `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReport;

impl Report for TracingReport {
    fn report(&mut self, violation: &InvariantViolation) {
        error!("File tree invariant violated: {}", violation);
    }
}

/// Verifies that `path` sits exactly one segment below `parent_path`.
fn check_lineage(parent_path: &str, path: &str) -> Result<(), InvariantViolation> {
    let rest = path.strip_prefix(parent_path).context(NotAPrefixSnafu {
        parent: parent_path,
        child: path,
    })?;

    let segment = rest.strip_prefix(SEPARATOR);
    ensure!(
        segment.is_some_and(|segment| !segment.is_empty() && !segment.contains(SEPARATOR)),
        NotADirectChildSnafu {
            parent: parent_path,
            child: path,
        }
    );
    Ok(())
}

/// Checks that consecutive paths are strictly ascending.
fn check_sorted<'a>(paths: impl Iterator<Item = &'a str>) -> Result<(), InvariantViolation> {
    let mut previous: Option<&str> = None;
    for path in paths {
        if let Some(previous) = previous {
            match previous.cmp(path) {
                Ordering::Less => {}
                Ordering::Equal => return DuplicateChildSnafu { path }.fail(),
                Ordering::Greater => {
                    return ChildrenOutOfOrderSnafu {
                        first: previous,
                        second: path,
                    }
                    .fail();
                }
            }
        }
        previous = Some(path);
    }
    Ok(())
}

/// Merge walk over two sorted path lists looking for a shared path.
fn check_disjoint(files: &[String], dirs: &[String]) -> Result<(), InvariantViolation> {
    let (mut f, mut d) = (0, 0);
    while f < files.len() && d < dirs.len() {
        match files[f].cmp(&dirs[d]) {
            Ordering::Less => f += 1,
            Ordering::Greater => d += 1,
            Ordering::Equal => return KindCollisionSnafu { path: files[f].as_str() }.fail(),
        }
    }
    Ok(())
}

/// Validates a single file node.
pub fn check_file(file: &FileNode) -> Result<(), InvariantViolation> {
    ensure!(!file.path.is_empty(), EmptyPathSnafu);
    let parent = file.parent().context(DetachedFileSnafu {
        path: file.path.as_str(),
    })?;
    check_lineage(&parent.borrow().path, &file.path)
}

/// Validates a single directory node: its own path and lineage, the order of
/// both child collections, the shared file/directory namespace and every
/// child's back-reference.
pub fn check_directory(dir: &DirRef) -> Result<(), InvariantViolation> {
    let node = dir.borrow();
    ensure!(!node.path.is_empty(), EmptyPathSnafu);
    if let Some(parent) = node.parent() {
        check_lineage(&parent.borrow().path, &node.path)?;
    }

    let file_paths = node
        .files
        .iter()
        .map(|file| file.borrow().path.clone())
        .collect::<Vec<_>>();
    let dir_paths = node
        .dirs
        .iter()
        .map(|child| child.borrow().path.clone())
        .collect::<Vec<_>>();
    check_sorted(file_paths.iter().map(String::as_str))?;
    check_sorted(dir_paths.iter().map(String::as_str))?;
    check_disjoint(&file_paths, &dir_paths)?;

    let points_back = |parent: Option<DirRef>| parent.is_some_and(|parent| Rc::ptr_eq(&parent, dir));
    for file in &node.files {
        let file = file.borrow();
        ensure!(
            points_back(file.parent()),
            ParentMismatchSnafu {
                parent: node.path.as_str(),
                child: file.path.as_str(),
            }
        );
        check_file(&file)?;
    }
    for child in &node.dirs {
        let child = child.borrow();
        ensure!(
            points_back(child.parent()),
            ParentMismatchSnafu {
                parent: node.path.as_str(),
                child: child.path.as_str(),
            }
        );
    }
    Ok(())
}

/// Validates the whole tree and returns the number of reachable entities.
pub fn check_tree(
    initialized: bool,
    root: Option<&DirRef>,
    count: usize,
) -> Result<usize, InvariantViolation> {
    if !initialized {
        ensure!(count == 0, UninitializedWithCountSnafu { count });
        ensure!(root.is_none(), UninitializedWithRootSnafu);
        return Ok(0);
    }

    let Some(root) = root else {
        ensure!(count == 0, EmptyWithCountSnafu { count });
        return Ok(0);
    };

    {
        let node = root.borrow();
        ensure!(
            !node.path.contains(SEPARATOR),
            RootPathHasSeparatorSnafu {
                path: node.path.as_str(),
            }
        );
        ensure!(
            node.parent().is_none(),
            RootHasParentSnafu {
                path: node.path.as_str(),
            }
        );
    }

    let mut counted = 0;
    let mut pending = vec![Rc::clone(root)];
    while let Some(dir) = pending.pop() {
        check_directory(&dir)?;
        let node = dir.borrow();
        counted += 1 + node.files.len();
        pending.extend(node.dirs.iter().rev().cloned());
    }

    ensure!(counted == count, CountMismatchSnafu { counted, count });
    Ok(counted)
}

/// Runs [`check_tree`], handing any violation to `report`.
pub fn is_valid(
    initialized: bool,
    root: Option<&DirRef>,
    count: usize,
    report: &mut impl Report,
) -> bool {
    match check_tree(initialized, root, count) {
        Ok(_) => true,
        Err(violation) => {
            report.report(&violation);
            false
        }
    }
}
