use snafu::Snafu;

/// Failures returned by the tree operations.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TreeError {
    #[snafu(display("File tree is {}", state))]
    InitializationError { state: &'static str },
    #[snafu(display("Path '{}' is already in the tree", path))]
    AlreadyInTree { path: String },
    #[snafu(display("No entity at path '{}'", path))]
    NoSuchPath { path: String },
    #[snafu(display("Path '{}' passes through or names a file", path))]
    NotADirectory { path: String },
    #[snafu(display("Path '{}' names a directory", path))]
    NotAFile { path: String },
    #[snafu(display("'{}' cannot be linked as a child of '{}'", child, parent))]
    ParentChildError { parent: String, child: String },
    #[snafu(display("Path '{}' conflicts with the tree root: {}", path, reason))]
    ConflictingPath { path: String, reason: &'static str },
    #[snafu(display("Failed to allocate storage for '{}'", path))]
    MemoryError { path: String },
    #[snafu(display("Invalid path '{}': {}", path, reason))]
    InvalidPath { path: String, reason: &'static str },
}
