use std::rc::Rc;

use derive_more::Display;
use snafu::ensure;
use tracing::debug;

use super::allocator::{HeapAllocator, PathAllocator};
use super::checker::{self, InvariantViolation, TracingReport};
use super::entity::{self, DirRef, DirectoryNode, Entity, FileNode, FileRef};
use super::error::{
    AlreadyInTreeSnafu, ConflictingPathSnafu, InitializationSnafu, NoSuchPathSnafu,
    NotADirectorySnafu, NotAFileSnafu, TreeError,
};
use super::linkage;
use super::path;

/// Behaviour switches for a [`FileTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Run the checker before and after every public operation and panic on
    /// the first violation.
    pub check_invariants: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            check_invariants: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EntryKind {
    #[display("directory")]
    Directory,
    #[display("file")]
    File,
}

/// What [`FileTree::stat`] knows about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EntryInfo {
    #[display("directory")]
    Directory,
    #[display("file, {length} bytes")]
    File { length: usize },
}

impl EntryInfo {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryInfo::Directory => EntryKind::Directory,
            EntryInfo::File { .. } => EntryKind::File,
        }
    }
}

/// Result of walking a path from the root.
#[derive(Debug, Default)]
struct Location {
    /// Deepest directory whose path is a prefix of the target.
    dir: Option<DirRef>,
    /// Number of target segments covered by `dir`.
    depth: usize,
    /// File that names the next segment below `dir`, stopping the descent.
    file: Option<FileRef>,
}

impl Location {
    fn is_directory(&self, len: usize) -> bool {
        self.dir.is_some() && self.depth == len
    }

    fn is_file(&self, len: usize) -> bool {
        self.file.is_some() && self.depth + 1 == len
    }

    fn blocked_by_file(&self, len: usize) -> bool {
        self.file.is_some() && self.depth + 1 < len
    }
}

/// Directories created by a single insertion that are not yet reachable
/// from the tree.
struct PendingChain {
    head: DirRef,
    tail: DirRef,
    len: usize,
}

impl PendingChain {
    fn discard(self) {
        let discarded = entity::destroy_directory(self.head);
        debug!("Rolled back {} newly created directories", discarded);
    }
}

/// An in-memory hierarchy of directories and files addressed by
/// `/`-separated paths.
///
/// A tree starts uninitialized; [`init`](Self::init) makes it usable and
/// [`teardown`](Self::teardown) destroys its contents and returns it to the
/// uninitialized state.
#[derive(Debug)]
pub struct FileTree<A: PathAllocator = HeapAllocator> {
    initialized: bool,
    root: Option<DirRef>,
    count: usize,
    config: TreeConfig,
    allocator: A,
}

impl FileTree {
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self::with_allocator(config, HeapAllocator)
    }
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: PathAllocator> FileTree<A> {
    pub fn with_allocator(config: TreeConfig, allocator: A) -> Self {
        Self {
            initialized: false,
            root: None,
            count: 0,
            config,
            allocator,
        }
    }

    pub fn config(&self) -> TreeConfig {
        self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of entities currently in the tree.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Runs the checker over the current state and returns the number of
    /// reachable entities.
    pub fn check(&self) -> Result<usize, InvariantViolation> {
        checker::check_tree(self.initialized, self.root.as_ref(), self.count)
    }

    fn assert_valid(&self) {
        if self.config.check_invariants {
            assert!(
                checker::is_valid(
                    self.initialized,
                    self.root.as_ref(),
                    self.count,
                    &mut TracingReport
                ),
                "file tree invariants violated"
            );
        }
    }

    /// Runs a mutating operation between two invariant checks.
    fn guarded<T>(&mut self, operation: impl FnOnce(&mut Self) -> T) -> T {
        self.assert_valid();
        let result = operation(self);
        self.assert_valid();
        result
    }

    fn ensure_initialized(&self) -> Result<(), TreeError> {
        ensure!(
            self.initialized,
            InitializationSnafu {
                state: "not initialized"
            }
        );
        Ok(())
    }

    pub fn init(&mut self) -> Result<(), TreeError> {
        self.guarded(|tree| {
            ensure!(
                !tree.initialized,
                InitializationSnafu {
                    state: "already initialized"
                }
            );
            tree.root = None;
            tree.count = 0;
            tree.initialized = true;
            debug!("Initialized file tree");
            Ok(())
        })
    }

    /// Destroys every entity and returns the tree to the uninitialized state.
    pub fn teardown(&mut self) -> Result<(), TreeError> {
        self.guarded(|tree| {
            tree.ensure_initialized()?;
            if let Some(root) = tree.root.take() {
                let destroyed = entity::destroy_directory(root);
                tree.count -= destroyed;
                debug!("Tore down file tree, destroyed {} entities", destroyed);
            }
            tree.initialized = false;
            Ok(())
        })
    }

    /// Walks from the root as far down `segments` as existing directories
    /// allow.
    fn locate(&self, segments: &[&str]) -> Location {
        let Some(root) = &self.root else {
            return Location::default();
        };
        if root.borrow().path() != segments[0] {
            return Location::default();
        }

        let mut current = Rc::clone(root);
        let mut depth = 1;
        let mut file = None;
        while depth < segments.len() {
            let prefix = path::join(segments, depth + 1);
            let next = {
                let node = current.borrow();
                match linkage::has_directory(&node, &prefix) {
                    Ok(index) => node.dir(index),
                    Err(_) => {
                        file = linkage::has_file(&node, &prefix)
                            .ok()
                            .and_then(|index| node.file(index));
                        None
                    }
                }
            };
            match next {
                Some(next) => {
                    current = next;
                    depth += 1;
                }
                None => break,
            }
        }

        Location {
            dir: Some(current),
            depth,
            file,
        }
    }

    /// Locates `path` after the usual lifecycle and syntax checks.
    fn resolve<'p>(&self, path: &'p str) -> Result<(Vec<&'p str>, Location), TreeError> {
        self.ensure_initialized()?;
        let segments = path::segments(path)?;
        let location = self.locate(&segments);
        Ok((segments, location))
    }

    /// Creates the directories named by `segments` as a detached chain below
    /// `anchor_path`. On failure everything created so far is destroyed.
    fn build_chain(
        &mut self,
        anchor_path: Option<&str>,
        segments: &[&str],
    ) -> Result<Option<PendingChain>, TreeError> {
        let mut chain: Option<PendingChain> = None;
        for segment in segments {
            if let Err(error) = self.extend_chain(&mut chain, anchor_path, segment) {
                if let Some(chain) = chain {
                    chain.discard();
                }
                return Err(error);
            }
        }
        Ok(chain)
    }

    fn extend_chain(
        &mut self,
        chain: &mut Option<PendingChain>,
        anchor_path: Option<&str>,
        segment: &str,
    ) -> Result<(), TreeError> {
        match chain {
            None => {
                let dir = DirectoryNode::create(segment, anchor_path, &mut self.allocator)?;
                *chain = Some(PendingChain {
                    head: Rc::clone(&dir),
                    tail: dir,
                    len: 1,
                });
            }
            Some(chain) => {
                let parent_path = chain.tail.borrow().path().to_string();
                let dir = DirectoryNode::create(segment, Some(&parent_path), &mut self.allocator)?;
                linkage::link_directory(&chain.tail, &dir)?;
                chain.tail = dir;
                chain.len += 1;
            }
        }
        Ok(())
    }

    /// Makes a pending chain reachable, either below `anchor` or as the new
    /// root. `extra` counts entities hanging off the chain beyond its
    /// directories.
    fn splice(
        &mut self,
        anchor: Option<&DirRef>,
        chain: PendingChain,
        extra: usize,
    ) -> Result<(), TreeError> {
        match anchor {
            Some(anchor) => {
                if let Err(error) = linkage::link_directory(anchor, &chain.head) {
                    chain.discard();
                    return Err(error);
                }
            }
            None => self.root = Some(Rc::clone(&chain.head)),
        }
        self.count += chain.len + extra;
        Ok(())
    }

    fn root_conflict(&self, location: &Location, path: &str) -> Result<(), TreeError> {
        ensure!(
            location.dir.is_some() || self.root.is_none(),
            ConflictingPathSnafu {
                path,
                reason: "the tree already has a different root",
            }
        );
        Ok(())
    }

    /// Inserts the directory at `path`, creating every missing ancestor.
    /// Either all new directories are added or none are.
    pub fn insert_directory(&mut self, path: &str) -> Result<(), TreeError> {
        self.guarded(|tree| tree.insert_directory_at(path))
    }

    fn insert_directory_at(&mut self, path: &str) -> Result<(), TreeError> {
        let (segments, location) = self.resolve(path)?;
        let len = segments.len();
        ensure!(
            !location.is_directory(len) && !location.is_file(len),
            AlreadyInTreeSnafu { path }
        );
        ensure!(!location.blocked_by_file(len), NotADirectorySnafu { path });
        self.root_conflict(&location, path)?;

        let anchor_path = location.dir.as_ref().map(|dir| dir.borrow().path().to_string());
        let chain = self.build_chain(anchor_path.as_deref(), &segments[location.depth..])?;
        if let Some(chain) = chain {
            let created = chain.len;
            self.splice(location.dir.as_ref(), chain, 0)?;
            debug!("Inserted directory '{}' ({} created)", path, created);
        }
        Ok(())
    }

    /// Inserts a file at `path` holding `contents`, creating every missing
    /// ancestor directory in the same atomic step.
    pub fn insert_file(&mut self, path: &str, contents: Vec<u8>) -> Result<(), TreeError> {
        self.guarded(|tree| tree.insert_file_at(path, contents))
    }

    fn insert_file_at(&mut self, path: &str, contents: Vec<u8>) -> Result<(), TreeError> {
        let (segments, location) = self.resolve(path)?;
        let len = segments.len();
        ensure!(
            !location.is_directory(len) && !location.is_file(len),
            AlreadyInTreeSnafu { path }
        );
        let Some((name, ancestors)) = segments
            .split_last()
            .filter(|(_, ancestors)| !ancestors.is_empty())
        else {
            return ConflictingPathSnafu {
                path,
                reason: "a file cannot be the root",
            }
            .fail();
        };
        ensure!(!location.blocked_by_file(len), NotADirectorySnafu { path });
        self.root_conflict(&location, path)?;

        let anchor_path = location.dir.as_ref().map(|dir| dir.borrow().path().to_string());
        let chain = self.build_chain(anchor_path.as_deref(), &ancestors[location.depth..])?;

        // Without new directories the anchor is the parent.
        let Some(parent) = chain
            .as_ref()
            .map(|chain| Rc::clone(&chain.tail))
            .or_else(|| location.dir.clone())
        else {
            return ConflictingPathSnafu {
                path,
                reason: "a file cannot be the root",
            }
            .fail();
        };
        let parent_path = parent.borrow().path().to_string();

        let linked = FileNode::create(name, &parent_path, contents, &mut self.allocator)
            .and_then(|file| linkage::link_file(&parent, &file));
        if let Err(error) = linked {
            if let Some(chain) = chain {
                chain.discard();
            }
            return Err(error);
        }

        match chain {
            Some(chain) => self.splice(location.dir.as_ref(), chain, 1)?,
            None => self.count += 1,
        }
        debug!("Inserted file '{}'", path);
        Ok(())
    }

    /// Removes the directory at `path` and everything below it.
    pub fn remove_directory(&mut self, path: &str) -> Result<(), TreeError> {
        self.guarded(|tree| tree.remove_directory_at(path))
    }

    fn remove_directory_at(&mut self, path: &str) -> Result<(), TreeError> {
        let (segments, location) = self.resolve(path)?;
        let len = segments.len();
        ensure!(!location.is_file(len), NotADirectorySnafu { path });
        ensure!(location.is_directory(len), NoSuchPathSnafu { path });

        let Some(dir) = location.dir else {
            return NoSuchPathSnafu { path }.fail();
        };
        if dir.borrow().parent().is_none() {
            self.root = None;
        }
        let destroyed = entity::destroy_directory(dir);
        self.count -= destroyed;
        debug!("Removed directory '{}' ({} entities)", path, destroyed);
        Ok(())
    }

    /// Removes the file at `path`.
    pub fn remove_file(&mut self, path: &str) -> Result<(), TreeError> {
        self.guarded(|tree| tree.remove_file_at(path))
    }

    fn remove_file_at(&mut self, path: &str) -> Result<(), TreeError> {
        let (segments, location) = self.resolve(path)?;
        let len = segments.len();
        ensure!(!location.is_directory(len), NotAFileSnafu { path });

        let file = match location.file {
            Some(file) if location.depth + 1 == len => file,
            _ => return NoSuchPathSnafu { path }.fail(),
        };
        self.count -= entity::destroy_file(file);
        debug!("Removed file '{}'", path);
        Ok(())
    }

    /// Looks up the file at `path`, if the tree holds one.
    fn find_file(&self, path: &str) -> Option<FileRef> {
        let (segments, location) = self.resolve(path).ok()?;
        location
            .file
            .filter(|_| location.depth + 1 == segments.len())
    }

    pub fn contains_directory(&self, path: &str) -> bool {
        self.assert_valid();
        self.resolve(path)
            .is_ok_and(|(segments, location)| location.is_directory(segments.len()))
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.assert_valid();
        self.find_file(path).is_some()
    }

    pub fn stat(&self, path: &str) -> Result<EntryInfo, TreeError> {
        self.assert_valid();
        let (segments, location) = self.resolve(path)?;
        let len = segments.len();
        if location.is_directory(len) {
            return Ok(EntryInfo::Directory);
        }
        let is_file = location.is_file(len);
        match location.file {
            Some(file) if is_file => Ok(EntryInfo::File {
                length: file.borrow().len(),
            }),
            _ => NoSuchPathSnafu { path }.fail(),
        }
    }

    /// Returns a copy of the contents of the file at `path`.
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        self.assert_valid();
        self.find_file(path)
            .map(|file| file.borrow().contents().to_vec())
    }

    /// Installs `contents` as the file's new contents and hands back the old
    /// buffer. Returns `None`, dropping `contents`, if there is no such file.
    pub fn replace_file_contents(&mut self, path: &str, contents: Vec<u8>) -> Option<Vec<u8>> {
        self.guarded(|tree| {
            let file = tree.find_file(path)?;
            let previous = file.borrow_mut().replace_contents(contents);
            debug!("Replaced contents of '{}'", path);
            Some(previous)
        })
    }

    /// Lists every path in the tree, one per line, in pre-order: a directory,
    /// then its files, then each of its subdirectories. `None` while the tree
    /// is uninitialized.
    pub fn serialize(&self) -> Option<String> {
        self.assert_valid();
        if !self.initialized {
            return None;
        }

        let mut listing = String::new();
        let mut pending = self.root.iter().cloned().collect::<Vec<_>>();
        while let Some(dir) = pending.pop() {
            let node = dir.borrow();
            listing.push_str(node.path());
            listing.push('\n');
            for file in node.files() {
                listing.push_str(file.borrow().path());
                listing.push('\n');
            }
            pending.extend(node.dirs().iter().rev().cloned());
        }
        Some(listing)
    }
}

impl<A: PathAllocator> Drop for FileTree<A> {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            entity::destroy_directory(root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::allocator::testing::FailAfter;
    use rstest::*;

    fn checked() -> TreeConfig {
        TreeConfig {
            check_invariants: true,
        }
    }

    #[fixture]
    fn tree() -> FileTree {
        let mut tree = FileTree::with_config(checked());
        tree.init().unwrap();
        tree
    }

    fn snapshot(tree: &FileTree<impl PathAllocator>) -> (usize, Option<String>) {
        (tree.len(), tree.serialize())
    }

    #[test]
    fn new_tree_is_uninitialized() {
        let tree = FileTree::new();
        assert!(!tree.is_initialized());
        assert!(tree.is_empty());
        assert_eq!(tree.serialize(), None);
        assert_eq!(tree.check(), Ok(0));
    }

    #[test]
    fn operations_fail_before_init() {
        let mut tree = FileTree::with_config(checked());
        let uninitialized = |result: Result<(), TreeError>| {
            matches!(result, Err(TreeError::InitializationError { .. }))
        };

        assert!(uninitialized(tree.insert_directory("a")));
        assert!(uninitialized(tree.insert_file("a/f", b"x".to_vec())));
        assert!(uninitialized(tree.remove_directory("a")));
        assert!(uninitialized(tree.remove_file("a/f")));
        assert!(uninitialized(tree.teardown()));
        assert!(uninitialized(tree.stat("a").map(|_| ())));
        assert!(!tree.contains_directory("a"));
        assert!(!tree.contains_file("a/f"));
        assert_eq!(tree.file_contents("a/f"), None);
        assert_eq!(tree.replace_file_contents("a/f", Vec::new()), None);
    }

    #[test]
    fn init_twice_fails() {
        let mut tree = FileTree::with_config(checked());
        tree.init().unwrap();
        assert!(matches!(
            tree.init(),
            Err(TreeError::InitializationError { .. })
        ));
        assert!(tree.is_initialized());
    }

    #[rstest]
    fn initialized_empty_tree_serializes_to_empty_string(tree: FileTree) {
        assert_eq!(tree.serialize(), Some(String::new()));
        assert_eq!(tree.len(), 0);
    }

    #[rstest]
    #[case("a")]
    #[case("a/b")]
    #[case("a/b/c/d/e")]
    fn inserted_directory_is_contained(mut tree: FileTree, #[case] path: &str) {
        tree.insert_directory(path).unwrap();
        assert!(tree.contains_directory(path));
        assert!(!tree.contains_file(path));
        assert_eq!(tree.stat(path), Ok(EntryInfo::Directory));
        assert_eq!(tree.stat(path).unwrap().kind(), EntryKind::Directory);
        assert_eq!(tree.len(), path.split('/').count());
    }

    #[rstest]
    fn concrete_scenario(mut tree: FileTree) {
        tree.insert_directory("a").unwrap();
        tree.insert_directory("a/b").unwrap();
        tree.insert_file("a/f.txt", b"hi".to_vec()).unwrap();
        assert_eq!(tree.serialize().unwrap(), "a\na/f.txt\na/b\n");
        assert_eq!(tree.len(), 3);

        tree.remove_directory("a/b").unwrap();
        assert!(!tree.contains_directory("a/b"));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.serialize().unwrap(), "a\na/f.txt\n");
    }

    #[rstest]
    fn duplicate_directory_insert_leaves_tree_unchanged(mut tree: FileTree) {
        tree.insert_directory("a/b").unwrap();
        tree.insert_file("a/b/f", b"x".to_vec()).unwrap();
        let before = snapshot(&tree);

        assert!(matches!(
            tree.insert_directory("a/b"),
            Err(TreeError::AlreadyInTree { .. })
        ));
        assert!(matches!(
            tree.insert_directory("a"),
            Err(TreeError::AlreadyInTree { .. })
        ));
        assert_eq!(snapshot(&tree), before);
    }

    #[rstest]
    fn insert_over_existing_file_is_rejected(mut tree: FileTree) {
        tree.insert_file("a/f", b"x".to_vec()).unwrap();
        let before = snapshot(&tree);

        assert!(matches!(
            tree.insert_directory("a/f"),
            Err(TreeError::AlreadyInTree { .. })
        ));
        assert!(matches!(
            tree.insert_file("a/f", b"y".to_vec()),
            Err(TreeError::AlreadyInTree { .. })
        ));
        assert!(matches!(
            tree.insert_directory("a/f/g"),
            Err(TreeError::NotADirectory { .. })
        ));
        assert!(matches!(
            tree.insert_file("a/f/g/h", b"y".to_vec()),
            Err(TreeError::NotADirectory { .. })
        ));
        assert_eq!(snapshot(&tree), before);
        assert_eq!(tree.file_contents("a/f"), Some(b"x".to_vec()));
    }

    #[rstest]
    fn file_over_existing_directory_is_rejected(mut tree: FileTree) {
        tree.insert_directory("a/b").unwrap();
        assert!(matches!(
            tree.insert_file("a/b", b"x".to_vec()),
            Err(TreeError::AlreadyInTree { .. })
        ));
    }

    #[rstest]
    fn second_root_conflicts(mut tree: FileTree) {
        tree.insert_directory("a").unwrap();
        assert!(matches!(
            tree.insert_directory("b"),
            Err(TreeError::ConflictingPath { .. })
        ));
        assert!(matches!(
            tree.insert_directory("b/c"),
            Err(TreeError::ConflictingPath { .. })
        ));
        assert!(matches!(
            tree.insert_file("b/f", Vec::new()),
            Err(TreeError::ConflictingPath { .. })
        ));
        assert_eq!(tree.len(), 1);
    }

    #[rstest]
    fn file_cannot_be_root(mut tree: FileTree) {
        assert!(matches!(
            tree.insert_file("f", b"x".to_vec()),
            Err(TreeError::ConflictingPath { .. })
        ));
        assert!(tree.is_empty());
    }

    #[rstest]
    fn file_over_root_directory_is_already_in_tree(mut tree: FileTree) {
        tree.insert_directory("a").unwrap();
        let before = snapshot(&tree);

        assert!(matches!(
            tree.insert_file("a", b"x".to_vec()),
            Err(TreeError::AlreadyInTree { ref path }) if path == "a"
        ));
        assert_eq!(snapshot(&tree), before);
    }

    #[rstest]
    fn single_segment_file_beside_root_conflicts(mut tree: FileTree) {
        tree.insert_directory("a").unwrap();
        assert!(matches!(
            tree.insert_file("b", b"x".to_vec()),
            Err(TreeError::ConflictingPath { .. })
        ));
        assert_eq!(tree.len(), 1);
    }

    #[rstest]
    #[case("")]
    #[case("/a")]
    #[case("a/")]
    #[case("a//b")]
    fn malformed_paths_are_rejected(mut tree: FileTree, #[case] path: &str) {
        assert!(matches!(
            tree.insert_directory(path),
            Err(TreeError::InvalidPath { .. })
        ));
        assert!(matches!(tree.stat(path), Err(TreeError::InvalidPath { .. })));
        assert!(!tree.contains_directory(path));
    }

    #[rstest]
    fn file_contents_round_trip(mut tree: FileTree) {
        let contents = vec![0u8, 1, 2, 255, b'\n'];
        tree.insert_file("a/b/data.bin", contents.clone()).unwrap();

        assert_eq!(tree.file_contents("a/b/data.bin"), Some(contents.clone()));
        assert_eq!(tree.stat("a/b/data.bin"), Ok(EntryInfo::File { length: 5 }));
        assert!(tree.contains_file("a/b/data.bin"));
        assert!(!tree.contains_directory("a/b/data.bin"));
        assert_eq!(tree.file_contents("a/b"), None);
    }

    #[rstest]
    fn empty_file_contents_are_kept(mut tree: FileTree) {
        tree.insert_file("a/empty", Vec::new()).unwrap();
        assert_eq!(tree.file_contents("a/empty"), Some(Vec::new()));
        assert_eq!(tree.stat("a/empty"), Ok(EntryInfo::File { length: 0 }));
    }

    #[rstest]
    fn replace_returns_previous_contents(mut tree: FileTree) {
        tree.insert_file("a/f", b"first".to_vec()).unwrap();

        let previous = tree.replace_file_contents("a/f", b"second!".to_vec());
        assert_eq!(previous, Some(b"first".to_vec()));
        assert_eq!(tree.file_contents("a/f"), Some(b"second!".to_vec()));
        assert_eq!(tree.stat("a/f"), Ok(EntryInfo::File { length: 7 }));

        assert_eq!(tree.replace_file_contents("a", Vec::new()), None);
        assert_eq!(tree.replace_file_contents("a/missing", Vec::new()), None);
    }

    #[rstest]
    fn insert_file_creates_missing_ancestors(mut tree: FileTree) {
        tree.insert_file("missing/parent/file", b"x".to_vec()).unwrap();
        assert!(tree.contains_directory("missing"));
        assert!(tree.contains_directory("missing/parent"));
        assert!(tree.contains_file("missing/parent/file"));
        assert_eq!(tree.len(), 3);
        assert_eq!(
            tree.serialize().unwrap(),
            "missing\nmissing/parent\nmissing/parent/file\n"
        );
    }

    #[rstest]
    fn removing_directory_drops_its_subtree(mut tree: FileTree) {
        tree.insert_directory("a/b/c").unwrap();
        tree.insert_file("a/b/f1", b"1".to_vec()).unwrap();
        tree.insert_file("a/b/c/f2", b"2".to_vec()).unwrap();
        tree.insert_file("a/keep", b"k".to_vec()).unwrap();
        assert_eq!(tree.len(), 6);

        tree.remove_directory("a/b").unwrap();
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains_file("a/b/c/f2"));
        assert!(tree.contains_file("a/keep"));
        assert_eq!(tree.check(), Ok(2));
    }

    #[rstest]
    fn removing_root_empties_tree(mut tree: FileTree) {
        tree.insert_file("a/b/f", b"x".to_vec()).unwrap();
        tree.remove_directory("a").unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.serialize(), Some(String::new()));

        tree.insert_directory("z").unwrap();
        assert_eq!(tree.serialize().unwrap(), "z\n");
    }

    #[rstest]
    fn remove_reports_kind_mismatch_and_missing_paths(mut tree: FileTree) {
        tree.insert_file("a/f", b"x".to_vec()).unwrap();
        let before = snapshot(&tree);

        assert!(matches!(
            tree.remove_directory("a/f"),
            Err(TreeError::NotADirectory { .. })
        ));
        assert!(matches!(
            tree.remove_file("a"),
            Err(TreeError::NotAFile { .. })
        ));
        assert!(matches!(
            tree.remove_directory("a/x"),
            Err(TreeError::NoSuchPath { .. })
        ));
        assert!(matches!(
            tree.remove_file("a/x"),
            Err(TreeError::NoSuchPath { .. })
        ));
        assert!(matches!(
            tree.remove_file("a/f/deeper"),
            Err(TreeError::NoSuchPath { .. })
        ));
        assert!(matches!(
            tree.remove_directory("other"),
            Err(TreeError::NoSuchPath { .. })
        ));
        assert_eq!(snapshot(&tree), before);

        tree.remove_file("a/f").unwrap();
        assert_eq!(tree.len(), 1);
        assert!(!tree.contains_file("a/f"));
    }

    #[rstest]
    fn stat_of_missing_path_fails(mut tree: FileTree) {
        assert!(matches!(tree.stat("a"), Err(TreeError::NoSuchPath { .. })));
        tree.insert_directory("a").unwrap();
        assert!(matches!(
            tree.stat("a/b"),
            Err(TreeError::NoSuchPath { .. })
        ));
    }

    #[rstest]
    fn children_are_listed_in_sorted_order(mut tree: FileTree) {
        for dir in ["r/m", "r/c", "r/x", "r/c/z", "r/c/a"] {
            tree.insert_directory(dir).unwrap();
        }
        for file in ["r/q.txt", "r/b.txt", "r/c/k"] {
            tree.insert_file(file, Vec::new()).unwrap();
        }

        assert_eq!(
            tree.serialize().unwrap(),
            "r\nr/b.txt\nr/q.txt\nr/c\nr/c/k\nr/c/a\nr/c/z\nr/m\nr/x\n"
        );
        assert_eq!(tree.check(), Ok(tree.len()));
    }

    #[rstest]
    fn teardown_destroys_everything(mut tree: FileTree) {
        tree.insert_file("a/b/c", b"x".to_vec()).unwrap();
        tree.teardown().unwrap();
        assert!(!tree.is_initialized());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.serialize(), None);

        tree.init().unwrap();
        assert!(!tree.contains_file("a/b/c"));
        assert_eq!(tree.serialize(), Some(String::new()));
    }

    #[test]
    fn independent_trees_do_not_share_state() {
        let mut first = FileTree::with_config(checked());
        let mut second = FileTree::with_config(checked());
        first.init().unwrap();
        second.init().unwrap();

        first.insert_directory("a").unwrap();
        second.insert_directory("b").unwrap();

        assert!(first.contains_directory("a"));
        assert!(!first.contains_directory("b"));
        assert!(second.contains_directory("b"));
    }

    #[test]
    fn failed_allocation_rolls_back_every_new_ancestor() {
        let mut tree = FileTree::with_allocator(checked(), FailAfter::new(1));
        tree.init().unwrap();
        tree.insert_directory("root").unwrap();
        let before = snapshot(&tree);

        // Room for one more path only: "root/x" is built, "root/x/y" is not.
        tree.allocator.remaining = 1;
        let result = tree.insert_directory("root/x/y");
        assert!(matches!(result, Err(TreeError::MemoryError { ref path }) if path == "root/x/y"));
        assert_eq!(snapshot(&tree), before);
        assert!(!tree.contains_directory("root/x"));
    }

    #[test]
    fn failed_allocation_on_last_ancestor_of_new_root_rolls_back() {
        let mut tree = FileTree::with_allocator(checked(), FailAfter::new(1));
        tree.init().unwrap();

        let result = tree.insert_file("missing/parent/file", b"x".to_vec());
        assert!(matches!(result, Err(TreeError::MemoryError { ref path }) if path == "missing/parent"));
        assert!(tree.is_empty());
        assert_eq!(tree.serialize(), Some(String::new()));

        tree.allocator.remaining = 3;
        tree.insert_file("missing/parent/file", b"x".to_vec()).unwrap();
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn failed_allocation_for_the_file_discards_new_ancestors() {
        let mut tree = FileTree::with_allocator(checked(), FailAfter::new(2));
        tree.init().unwrap();

        let result = tree.insert_file("missing/parent/file", b"x".to_vec());
        assert!(matches!(result, Err(TreeError::MemoryError { ref path }) if path == "missing/parent/file"));
        assert!(tree.is_empty());
        assert!(!tree.contains_directory("missing"));
    }

    #[test]
    fn failed_allocation_for_file_keeps_existing_tree() {
        let mut tree = FileTree::with_allocator(checked(), FailAfter::new(3));
        tree.init().unwrap();
        tree.insert_directory("a/b").unwrap();
        tree.insert_file("a/f", Vec::new()).unwrap();
        let before = snapshot(&tree);

        assert!(matches!(
            tree.insert_file("a/b/c/g", Vec::new()),
            Err(TreeError::MemoryError { .. })
        ));
        assert_eq!(snapshot(&tree), before);
    }

    #[rstest]
    fn count_matches_checker_after_mixed_operations(mut tree: FileTree) {
        tree.insert_directory("a/b/c").unwrap();
        tree.insert_file("a/b/c/one", b"1".to_vec()).unwrap();
        tree.insert_file("a/two", b"2".to_vec()).unwrap();
        tree.insert_directory("a/d").unwrap();
        let _ = tree.insert_directory("a/two/x");
        tree.remove_file("a/b/c/one").unwrap();
        tree.insert_file("a/d/three", b"3".to_vec()).unwrap();
        tree.remove_directory("a/b").unwrap();

        assert_eq!(tree.check(), Ok(tree.len()));
        assert_eq!(tree.serialize().unwrap(), "a\na/two\na/d\na/d/three\n");
    }

    #[test]
    #[should_panic(expected = "file tree invariants violated")]
    fn corrupted_tree_trips_the_guard() {
        let mut tree = FileTree::with_config(checked());
        tree.init().unwrap();
        tree.insert_directory("a").unwrap();
        tree.count = 7;
        let _ = tree.insert_directory("a/b");
    }
}
