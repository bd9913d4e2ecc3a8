use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFiles {
    #[serde(default)]
    pub loader_url: Option<String>,
    #[serde(default)]
    pub framework_url: Option<String>,
    #[serde(default)]
    pub code_url: Option<String>,
    #[serde(default)]
    pub data_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDescriptor {
    pub id: GameId,
    pub title: String,
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub build_files: Option<BuildFiles>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBuildFiles {
    pub loader_url: String,
    pub framework_url: String,
    pub code_url: String,
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayableSource {
    BuildFiles(ResolvedBuildFiles),
    DirectUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFileRole {
    Loader,
    Framework,
    Code,
    Data,
}

impl BuildFileRole {
    pub const ALL: [BuildFileRole; 4] = [
        BuildFileRole::Loader,
        BuildFileRole::Framework,
        BuildFileRole::Code,
        BuildFileRole::Data,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BuildFileRole::Loader => "loader",
            BuildFileRole::Framework => "framework",
            BuildFileRole::Code => "code",
            BuildFileRole::Data => "data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("game {game_id} has neither a complete build file set nor a direct URL")]
    NoPlayableSource { game_id: GameId },
    #[error("game {game_id} has an incomplete build file set (missing: {})", join_roles(.missing))]
    IncompleteBuildFiles {
        game_id: GameId,
        missing: Vec<BuildFileRole>,
    },
}

fn join_roles(roles: &[BuildFileRole]) -> String {
    roles
        .iter()
        .map(|role| role.label())
        .collect::<Vec<_>>()
        .join(", ")
}

impl BuildFiles {
    pub fn url_for(&self, role: BuildFileRole) -> Option<&str> {
        let raw = match role {
            BuildFileRole::Loader => self.loader_url.as_deref(),
            BuildFileRole::Framework => self.framework_url.as_deref(),
            BuildFileRole::Code => self.code_url.as_deref(),
            BuildFileRole::Data => self.data_url.as_deref(),
        };
        non_blank(raw)
    }

    pub fn missing_roles(&self) -> Vec<BuildFileRole> {
        BuildFileRole::ALL
            .into_iter()
            .filter(|role| self.url_for(*role).is_none())
            .collect()
    }

    fn resolve(&self) -> Option<ResolvedBuildFiles> {
        Some(ResolvedBuildFiles {
            loader_url: self.url_for(BuildFileRole::Loader)?.to_string(),
            framework_url: self.url_for(BuildFileRole::Framework)?.to_string(),
            code_url: self.url_for(BuildFileRole::Code)?.to_string(),
            data_url: self.url_for(BuildFileRole::Data)?.to_string(),
        })
    }
}

impl GameDescriptor {
    pub fn with_direct_url(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: GameId(id.into()),
            title: title.into(),
            direct_url: Some(url.into()),
            build_files: None,
        }
    }

    pub fn with_build_files(
        id: impl Into<String>,
        title: impl Into<String>,
        files: BuildFiles,
    ) -> Self {
        Self {
            id: GameId(id.into()),
            title: title.into(),
            direct_url: None,
            build_files: Some(files),
        }
    }

    pub fn playable_source(&self) -> Result<PlayableSource, DescriptorError> {
        if let Some(resolved) = self.build_files.as_ref().and_then(BuildFiles::resolve) {
            return Ok(PlayableSource::BuildFiles(resolved));
        }

        if let Some(url) = non_blank(self.direct_url.as_deref()) {
            return Ok(PlayableSource::DirectUrl(url.to_string()));
        }

        match &self.build_files {
            Some(files) if files.missing_roles().len() < BuildFileRole::ALL.len() => {
                Err(DescriptorError::IncompleteBuildFiles {
                    game_id: self.id.clone(),
                    missing: files.missing_roles(),
                })
            }
            _ => Err(DescriptorError::NoPlayableSource {
                game_id: self.id.clone(),
            }),
        }
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.0.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.direct_url.as_deref().unwrap_or_default().as_bytes());
        for role in BuildFileRole::ALL {
            hasher.update([0u8]);
            let url = self
                .build_files
                .as_ref()
                .and_then(|files| files.url_for(role))
                .unwrap_or_default();
            hasher.update(url.as_bytes());
        }
        to_hex_lower(&hasher.finalize())
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn to_hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
