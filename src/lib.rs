#![allow(clippy::enum_variant_names)]

pub mod application;
pub mod cli;
pub mod script;
pub mod tree;

pub use tree::{EntryInfo, EntryKind, FileTree, TreeConfig, TreeError};
