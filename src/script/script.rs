use std::path::Path;
use std::string::FromUtf8Error;

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Yaml};
use snafu::prelude::*;
use tracing::{debug, warn};

use super::Operation;
use super::operation::string_key;

/// Options read from the `settings` block of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptSettings {
    /// Overrides the tree's invariant checking when present.
    pub check_invariants: Option<bool>,
    /// Abort on the first failing operation instead of logging it.
    pub stop_on_error: bool,
}

/// An ordered list of tree operations plus the settings to run them with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    pub settings: ScriptSettings,
    pub operations: Vec<Operation>,
}

impl Script {
    pub async fn read(path: &Path) -> Result<Self, ScriptError> {
        debug!("Reading script file: {}", path.display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.display().to_string(),
        })?;
        debug!("Successfully read script file: {} bytes", bytes.len());

        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.display().to_string(),
        })?;
        contents.as_str().try_into()
    }

    fn parse_settings(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<ScriptSettings, ScriptError> {
        let Some(settings) = top_level.get(&string_key("settings")) else {
            return Ok(ScriptSettings::default());
        };
        let settings = settings.as_mapping().context(SettingsNotMapSnafu)?;
        let flag = |name| {
            settings
                .get(&string_key(name))
                .and_then(|value| value.as_bool())
        };

        Ok(ScriptSettings {
            check_invariants: flag("check_invariants"),
            stop_on_error: flag("stop_on_error").unwrap_or(false),
        })
    }

    fn parse_operations(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Vec<Operation>, ScriptError> {
        let Some(operations) = top_level.get(&string_key("operations")) else {
            return Ok(Vec::new());
        };

        let operations = operations
            .as_sequence()
            .context(OperationsNotSequenceSnafu)?
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let operation = entry.as_mapping().and_then(Operation::from_yaml);
                if operation.is_none() {
                    warn!("Skipping invalid operation #{}: {:?}", index, entry);
                }
                operation
            })
            .collect::<Vec<_>>();

        Ok(operations)
    }
}

impl TryFrom<&str> for Script {
    type Error = ScriptError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().context(MalformedScriptSnafu)?;
        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;

        let settings = Self::parse_settings(top_level)?;
        let operations = Self::parse_operations(top_level)?;
        debug!(
            "Parsed script with {} operations and {:?}",
            operations.len(),
            settings
        );

        Ok(Script {
            settings,
            operations,
        })
    }
}

#[derive(Debug, Snafu)]
pub enum ScriptError {
    #[snafu(display("Failed to read the script file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Script file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: FromUtf8Error,
    },
    #[snafu(display("Failed to parse the script file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted script file"))]
    MalformedScript,
    #[snafu(display("Top level of the script should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Settings section should be a map"))]
    SettingsNotMap,
    #[snafu(display("Operations section should be a list"))]
    OperationsNotSequence,
}
