use std::borrow::Cow;

use derive_more::Display;
use hashlink::LinkedHashMap;
use saphyr::{Scalar, Yaml};
use tracing::debug;

use crate::tree::{FileTree, PathAllocator, TreeError};

const CONTENTS_KEY: &str = "contents";

/// A single step of a script.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Operation {
    #[display("mkdir {path}")]
    MakeDirectory { path: String },
    #[display("file {path} ({} bytes)", contents.len())]
    InsertFile { path: String, contents: Vec<u8> },
    #[display("replace {path} ({} bytes)", contents.len())]
    ReplaceContents { path: String, contents: Vec<u8> },
    #[display("rmdir {path}")]
    RemoveDirectory { path: String },
    #[display("rm {path}")]
    RemoveFile { path: String },
}

pub(super) fn string_key(name: &'static str) -> Yaml<'static> {
    Yaml::Value(Scalar::String(Cow::Borrowed(name)))
}

impl Operation {
    /// Builds an operation from one entry of the `operations` sequence, e.g.
    /// `{ file: a/b.txt, contents: "hi" }`. Returns `None` for entries that
    /// name no known operation.
    pub fn from_yaml(entry: &LinkedHashMap<Yaml, Yaml>) -> Option<Self> {
        let path_of = |name| {
            entry
                .get(&string_key(name))
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };
        // Absent contents mean an empty file; contents that are not a string
        // make the whole entry invalid.
        let contents = || match entry.get(&string_key(CONTENTS_KEY)) {
            None => Some(Vec::new()),
            Some(value) => value.as_str().map(|text| text.as_bytes().to_vec()),
        };

        let operation = if let Some(path) = path_of("mkdir") {
            Operation::MakeDirectory { path }
        } else if let Some(path) = path_of("file") {
            Operation::InsertFile {
                path,
                contents: contents()?,
            }
        } else if let Some(path) = path_of("replace") {
            Operation::ReplaceContents {
                path,
                contents: contents()?,
            }
        } else if let Some(path) = path_of("rmdir") {
            Operation::RemoveDirectory { path }
        } else if let Some(path) = path_of("rm") {
            Operation::RemoveFile { path }
        } else {
            return None;
        };

        debug!("Parsed operation '{}'", operation);
        Some(operation)
    }

    pub fn path(&self) -> &str {
        match self {
            Operation::MakeDirectory { path }
            | Operation::InsertFile { path, .. }
            | Operation::ReplaceContents { path, .. }
            | Operation::RemoveDirectory { path }
            | Operation::RemoveFile { path } => path,
        }
    }

    /// Applies the operation to `tree`.
    pub fn apply(self, tree: &mut FileTree<impl PathAllocator>) -> Result<(), TreeError> {
        match self {
            Operation::MakeDirectory { path } => tree.insert_directory(&path),
            Operation::InsertFile { path, contents } => tree.insert_file(&path, contents),
            Operation::ReplaceContents { path, contents } => tree
                .replace_file_contents(&path, contents)
                .map(drop)
                .ok_or(TreeError::NoSuchPath { path }),
            Operation::RemoveDirectory { path } => tree.remove_directory(&path),
            Operation::RemoveFile { path } => tree.remove_file(&path),
        }
    }
}
