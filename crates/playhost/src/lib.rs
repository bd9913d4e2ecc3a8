use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod bridge;
pub mod comments;
pub mod config;
pub mod descriptor;
pub mod focus;
pub mod host;
pub mod notify;
pub mod platform;
pub mod prefs;
pub mod remote;
pub mod session;
pub mod sim;
pub mod upload;

pub use bridge::{BridgeError, EmbeddedRuntime, InputSignal, RuntimeLink, RuntimeRef, SignalOutcome};
pub use comments::{Comment, CommentThread};
pub use config::{HostConfig, FRAME_SETTLE_ENV_VAR, RELOAD_DELAY_ENV_VAR};
pub use descriptor::{
    BuildFileRole, BuildFiles, DescriptorError, GameDescriptor, GameId, PlayableSource,
    ResolvedBuildFiles,
};
pub use focus::{
    ClickTarget, ControlId, ControlKind, FocusArbiter, FocusError, FocusState, FormId, KeyEvent,
    KeyPhase, Propagation,
};
pub use host::{EventDisposition, LoadError, RuntimeHost, RELOAD_NOTICE};
pub use notify::{Notice, NoticeLevel, NoticeQueue, Notifier};
pub use platform::{
    FrameSpec, FullscreenEventKind, HostEvent, HostPlatform, LoadTicket, PlatformError,
    RuntimeConfig, SurfaceNode, TimerKind,
};
pub use prefs::{
    JsonFilePreferenceStore, MemoryPreferenceStore, PreferenceError, PreferenceStore,
    ThemePreference,
};
pub use remote::{
    guard_remote, AuthService, Collection, DataStore, Filter, ObjectStorage, RemoteError, Row,
    Session, SubscriptionId, UserId,
};
pub use session::{HostPhase, RuntimeSession, SessionView};
pub use upload::{upload_build, BuildUpload, UploadFile, GAME_FILES_BUCKET};

pub const DATA_DIR_ENV_VAR: &str = "PLAYHOST_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".playhost";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Clone)]
pub struct HostPaths {
    pub data_dir: PathBuf,
    pub preferences_file: PathBuf,
}

impl HostPaths {
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let preferences_file = data_dir.join(PREFERENCES_FILE);
        Self {
            data_dir,
            preferences_file,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to create data directory at {path}: {source}")]
    CreateDataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves the data directory from `PLAYHOST_DATA_DIR`, falling back to
/// `./.playhost`, and makes sure it exists.
pub fn resolve_host_paths() -> Result<HostPaths, StartupError> {
    let data_dir = match env::var(DATA_DIR_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        Ok(_) | Err(env::VarError::NotPresent) => PathBuf::from(DEFAULT_DATA_DIR),
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: DATA_DIR_ENV_VAR,
                source,
            })
        }
    };
    prepare_host_paths(&data_dir)
}

pub fn prepare_host_paths(data_dir: &Path) -> Result<HostPaths, StartupError> {
    fs::create_dir_all(data_dir).map_err(|source| StartupError::CreateDataDir {
        path: data_dir.to_path_buf(),
        source,
    })?;
    Ok(HostPaths::under(normalize_path(data_dir)))
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prepare_creates_nested_data_dir() {
        let temp = TempDir::new().expect("temp dir");
        let target = temp.path().join("a").join("b");
        let paths = prepare_host_paths(&target).expect("paths");
        assert!(paths.data_dir.is_dir());
        assert_eq!(
            paths.preferences_file.file_name().and_then(|n| n.to_str()),
            Some("preferences.json")
        );
    }
}
