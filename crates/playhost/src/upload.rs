use tracing::info;

use crate::descriptor::{BuildFileRole, BuildFiles, GameDescriptor};
use crate::notify::{Notice, Notifier};
use crate::remote::{guard_remote, ObjectStorage, RemoteError};

pub const GAME_FILES_BUCKET: &str = "game-files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUpload {
    pub loader: UploadFile,
    pub framework: UploadFile,
    pub code: UploadFile,
    pub data: UploadFile,
}

impl BuildUpload {
    fn file(&self, role: BuildFileRole) -> &UploadFile {
        match role {
            BuildFileRole::Loader => &self.loader,
            BuildFileRole::Framework => &self.framework,
            BuildFileRole::Code => &self.code,
            BuildFileRole::Data => &self.data,
        }
    }
}

pub fn object_path(game_id: &str, file_name: &str) -> String {
    format!("{game_id}/Build/{file_name}")
}

/// Stops at the first failed file.
pub fn upload_build(
    storage: &mut dyn ObjectStorage,
    notices: &mut dyn Notifier,
    game_id: &str,
    title: &str,
    build: &BuildUpload,
) -> Result<GameDescriptor, RemoteError> {
    let mut files = BuildFiles::default();
    for role in BuildFileRole::ALL {
        let file = build.file(role);
        let path = object_path(game_id, &file.file_name);
        let url = guard_remote(notices, "upload_build_file", || {
            if file.file_name.trim().is_empty() {
                return Err(RemoteError::Rejected {
                    message: format!("Missing {} file", role.label()),
                });
            }
            storage.upload(GAME_FILES_BUCKET, &path, &file.bytes)
        })?;
        info!(game_id, role = role.label(), path = %path, bytes = file.bytes.len(), "build_file_uploaded");
        match role {
            BuildFileRole::Loader => files.loader_url = Some(url),
            BuildFileRole::Framework => files.framework_url = Some(url),
            BuildFileRole::Code => files.code_url = Some(url),
            BuildFileRole::Data => files.data_url = Some(url),
        }
    }

    notices.notify(Notice::success("Game uploaded successfully!"));
    Ok(GameDescriptor::with_build_files(game_id, title, files))
}
