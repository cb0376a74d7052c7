//! Diagnostic artifact capture.
//!
//! # Responsibility
//! - Persist one diagnostic document per failed run and hand back an id
//!   that lets the failure be examined offline.
//!
//! # Invariants
//! - Artifact ids are unique per capture.
//! - Tags are restricted to `[A-Za-z0-9_-]` so they are safe in file names.

use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Directory name used under the system temp dir when none is configured.
pub const ARTIFACT_DIR_NAME: &str = "unload-verifier";

static ARTIFACT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid artifact tag regex"));

/// Reference to a captured artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ArtifactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Captures a diagnostic artifact on request.
pub trait ArtifactStore: Send + Sync {
    fn capture_artifact(&self, tag: &str) -> Result<ArtifactId, ArtifactError>;
}

/// Artifact capture errors.
#[derive(Debug)]
pub enum ArtifactError {
    InvalidTag(String),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Encode(serde_json::Error),
}

impl Display for ArtifactError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTag(tag) => write!(f, "artifact tag is invalid: `{tag}`"),
            Self::Io { path, source } => {
                write!(f, "failed to write artifact `{}`: {source}", path.display())
            }
            Self::Encode(err) => write!(f, "failed to encode artifact: {err}"),
        }
    }
}

impl Error for ArtifactError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTag(_) => None,
            Self::Io { source, .. } => Some(source),
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ArtifactError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

/// Document written for every captured artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDocument {
    pub tag: String,
    pub capture_id: String,
    pub captured_at_ms: u64,
    pub pid: u32,
    pub platform: String,
    /// Process memory status where the platform exposes it.
    pub memory_status: Option<String>,
}

/// Writes artifacts as JSON files into one directory.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    dir: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for DirectoryArtifactStore {
    fn capture_artifact(&self, tag: &str) -> Result<ArtifactId, ArtifactError> {
        if !ARTIFACT_TAG_RE.is_match(tag) {
            return Err(ArtifactError::InvalidTag(tag.to_string()));
        }

        let capture_id = Uuid::new_v4().to_string();
        let document = ArtifactDocument {
            tag: tag.to_string(),
            capture_id: capture_id.clone(),
            captured_at_ms: now_ms(),
            pid: std::process::id(),
            platform: std::env::consts::OS.to_string(),
            memory_status: read_memory_status(),
        };
        let path = self.dir.join(format!("{tag}-{capture_id}.json"));
        let encoded = serde_json::to_vec_pretty(&document)?;

        let written = std::fs::create_dir_all(&self.dir)
            .and_then(|()| std::fs::write(&path, encoded));
        if let Err(source) = written {
            error!(
                "event=artifact_capture module=artifact status=error tag={} path={} error={}",
                tag,
                path.display(),
                source
            );
            return Err(ArtifactError::Io { path, source });
        }

        info!(
            "event=artifact_capture module=artifact status=ok tag={} path={}",
            tag,
            path.display()
        );
        Ok(ArtifactId::new(path.display().to_string()))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(target_os = "linux")]
fn read_memory_status() -> Option<String> {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .map(|status| {
            status
                .lines()
                .filter(|line| line.starts_with("Vm") || line.starts_with("Rss"))
                .collect::<Vec<_>>()
                .join("\n")
        })
}

#[cfg(not(target_os = "linux"))]
fn read_memory_status() -> Option<String> {
    None
}
