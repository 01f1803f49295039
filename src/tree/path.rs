use snafu::ensure;

use super::error::{InvalidPathSnafu, TreeError};

pub const SEPARATOR: char = '/';

/// Splits a tree path into its segments.
///
/// Paths are `/`-separated, non-empty and carry no leading, trailing or
/// doubled separators.
pub fn segments(path: &str) -> Result<Vec<&str>, TreeError> {
    ensure!(
        !path.is_empty(),
        InvalidPathSnafu {
            path,
            reason: "path is empty",
        }
    );

    let segments = path.split(SEPARATOR).collect::<Vec<_>>();
    ensure!(
        segments.iter().all(|segment| !segment.is_empty()),
        InvalidPathSnafu {
            path,
            reason: "path contains an empty segment",
        }
    );

    Ok(segments)
}

/// Joins the first `depth` segments back into a path.
pub fn join(segments: &[&str], depth: usize) -> String {
    segments[..depth].join("/")
}

/// Returns true if `child` is exactly `parent` followed by one separator
/// and a single non-empty segment.
pub fn is_direct_child(parent: &str, child: &str) -> bool {
    child
        .strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .is_some_and(|segment| !segment.is_empty() && !segment.contains(SEPARATOR))
}
