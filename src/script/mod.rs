//! YAML scripts of tree operations replayed by the command-line driver.

mod operation;
mod script;

pub use operation::Operation;
pub use script::{Script, ScriptError, ScriptSettings};
