use std::path::PathBuf;

use thiserror::Error;

use crate::component::Archetype;

// ---------------------------------------------------------------------------
// Configuration errors – fatal, abort Scheme construction
// ---------------------------------------------------------------------------

/// Errors raised while turning a configuration into a [`Scheme`](crate::config::Scheme).
///
/// Every variant is fatal: the run halts before any computation starts.
/// Tolerable conditions (unknown component, missing optional dependency)
/// are reported as [`SkipReason`](crate::registry::SkipReason) instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "{archetype} {class} configuration '{scheme}' under module '{module}' \
         is missing the arguments: {}",
        missing.join(", ")
    )]
    MissingArguments {
        archetype: Archetype,
        class: String,
        scheme: String,
        module: String,
        missing: Vec<String>,
    },

    #[error(
        "{archetype} {class} configuration '{scheme}' under module '{module}' \
         received unknown arguments: {}",
        unknown.join(", ")
    )]
    UnknownArguments {
        archetype: Archetype,
        class: String,
        scheme: String,
        module: String,
        unknown: Vec<String>,
    },

    #[error("{archetype} {name} already exists")]
    DuplicateComponent { archetype: Archetype, name: String },

    #[error("Incorrect format for {context}: expected {expected}")]
    InvalidSection {
        context: String,
        expected: &'static str,
    },

    #[error("{archetype} {class} under module '{module}' is missing 'schemes' definition")]
    MissingSchemes {
        archetype: Archetype,
        class: String,
        module: String,
    },

    #[error("Parameter '{param}': expected {expected}, found {found}")]
    InvalidParameter {
        param: String,
        expected: &'static str,
        found: String,
    },

    #[error("Failed to instantiate {archetype} {class} scheme '{scheme}': {source}")]
    Instantiation {
        archetype: Archetype,
        class: String,
        scheme: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("Incompatible configuration: {0}")]
    IncompatibleConfiguration(String),

    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error(
        "Configuration must define at least one Statistic and one Reducer, or a ReducedStatistic"
    )]
    NoComponents,

    #[error("Failed to load module file {path}: {reason}")]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Unwrap [`ConfigError::Instantiation`] layers down to the originating error.
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::Instantiation { source, .. } => source.root(),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Computation errors – recorded and skipped by the calculator
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error(transparent)]
    Layout(#[from] ndarray::ShapeError),

    #[error("Numeric failure: {0}")]
    Numeric(String),

    #[error("Statistic result for '{0}' is not available")]
    MissingStatistic(String),

    #[error("Computation panicked: {0}")]
    Panicked(String),
}

pub type ComputeResult<T> = Result<T, ComputeError>;
