use std::path::PathBuf;

use playhost::{FocusError, PreferenceError, StartupError};
use thiserror::Error;

pub(crate) mod bootstrap;
pub(crate) mod runner;
pub(crate) mod scenario;

#[derive(Debug, Error)]
pub(crate) enum SimError {
    #[error("usage: playhost-sim <scenario.json> [--data-dir <dir>] ({0})")]
    Usage(String),
    #[error("failed to read scenario {path}: {source}")]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {message}")]
    ParseScenario { path: PathBuf, message: String },
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
    #[error("step {step} mounts unknown game {game}")]
    UnknownGame { step: usize, game: String },
    #[error("step {step} refers to unknown control {control}")]
    UnknownControl { step: usize, control: String },
    #[error("step {step} failed: {source}")]
    Focus {
        step: usize,
        #[source]
        source: FocusError,
    },
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Preference(#[from] PreferenceError),
}
