use std::fmt::Write as _;

use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::application::RuntimeConfig;
use crate::script::{Script, ScriptError};
use crate::tree::{FileTree, TreeConfig, TreeError};

pub struct Application;

impl Application {
    pub async fn run(runtime_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let runtime_config: RuntimeConfig = runtime_config.into();
        let script = Script::read(&runtime_config.script)
            .await
            .context(ScriptReadSnafu)?;
        info!(
            "Loaded script {} with {} operations",
            runtime_config.script.display(),
            script.operations.len()
        );

        let output = Self::execute(script, &runtime_config.stats)?;
        print!("{output}");

        Ok(())
    }

    /// Replays `script` against a fresh tree and renders the serialized tree
    /// followed by one `path: description` line per entry of `stats`.
    pub fn execute(script: Script, stats: &[String]) -> Result<String, ApplicationError> {
        let settings = script.settings;
        let mut config = TreeConfig::default();
        if let Some(check_invariants) = settings.check_invariants {
            config.check_invariants = check_invariants;
        }

        let mut tree = FileTree::with_config(config);
        tree.init().context(LifecycleSnafu)?;

        let mut failures = 0;
        for (index, operation) in script.operations.into_iter().enumerate() {
            let description = operation.to_string();
            match operation.apply(&mut tree) {
                Ok(()) => debug!("Operation #{} '{}' succeeded", index, description),
                Err(error) if settings.stop_on_error => {
                    return Err(error).context(OperationSnafu { index, description });
                }
                Err(error) => {
                    failures += 1;
                    warn!("Operation #{} '{}' failed: {}", index, description, error);
                }
            }
        }
        info!("Tree holds {} entities, {} operations failed", tree.len(), failures);

        let mut output = tree.serialize().unwrap_or_default();
        for path in stats {
            match tree.stat(path) {
                Ok(entry) => writeln!(output, "{path}: {entry}"),
                Err(error) => writeln!(output, "{path}: {error}"),
            }
            .ok();
        }

        tree.teardown().context(LifecycleSnafu)?;
        Ok(output)
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while loading the script"))]
    ScriptReadError { source: ScriptError },
    #[snafu(display("Critical failure encountered while setting up or tearing down the tree"))]
    LifecycleError { source: TreeError },
    #[snafu(display("Operation #{} '{}' failed", index, description))]
    OperationError {
        index: usize,
        description: String,
        source: TreeError,
    },
}
