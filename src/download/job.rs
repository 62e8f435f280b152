//! Download job validation.
//!
//! # Responsibilities
//! - Define the fixed allow-list of model subdirectories
//! - Turn a loosely-typed request into a validated `DownloadJob`
//!
//! # Design Decisions
//! - Validation is pure: no filesystem or network access happens here
//! - Filenames are restricted to a single path component so a job can never
//!   escape its subdirectory

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Subdirectory used when a request does not name one.
pub const DEFAULT_SUBDIR: &str = "text_encoders";

/// Model subdirectories a download may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelDir {
    Unet,
    Lora,
    Loras,
    Checkpoints,
    TextEncoders,
    Vae,
    DiffusionModels,
}

impl ModelDir {
    /// Every allowed subdirectory.
    pub const ALL: [ModelDir; 7] = [
        ModelDir::Unet,
        ModelDir::Lora,
        ModelDir::Loras,
        ModelDir::Checkpoints,
        ModelDir::TextEncoders,
        ModelDir::Vae,
        ModelDir::DiffusionModels,
    ];

    /// Directory name on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelDir::Unet => "unet",
            ModelDir::Lora => "lora",
            ModelDir::Loras => "loras",
            ModelDir::Checkpoints => "checkpoints",
            ModelDir::TextEncoders => "text_encoders",
            ModelDir::Vae => "vae",
            ModelDir::DiffusionModels => "diffusion_models",
        }
    }

    fn allowed_list() -> String {
        Self::ALL.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for ModelDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelDir {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ValidationError::SubdirNotAllowed {
                subdir: s.to_string(),
                allowed: Self::allowed_list(),
            })
    }
}

/// Rejection of a download request before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid filename '{0}': must be a single path component")]
    InvalidFilename(String),

    #[error("invalid subdir '{subdir}'. Must be one of [{allowed}]")]
    SubdirNotAllowed { subdir: String, allowed: String },
}

/// A download request as received over the wire.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub subdir: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, filename: impl Into<String>, subdir: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            subdir: Some(subdir.into()),
        }
    }
}

/// A validated download: where to fetch from and which file it becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    url: Url,
    filename: String,
    subdir: ModelDir,
}

impl DownloadJob {
    /// Validate raw inputs into a job.
    pub fn new(url: &str, filename: &str, subdir: &str) -> Result<Self, ValidationError> {
        if url.trim().is_empty() {
            return Err(ValidationError::MissingField("url"));
        }
        if filename.is_empty() {
            return Err(ValidationError::MissingField("filename"));
        }

        let subdir = subdir.parse::<ModelDir>()?;

        let parsed = Url::parse(url).map_err(|e| ValidationError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if !is_plain_filename(filename) {
            return Err(ValidationError::InvalidFilename(filename.to_string()));
        }

        Ok(Self {
            url: parsed,
            filename: filename.to_string(),
            subdir,
        })
    }

    /// Validate a wire request, applying the default subdirectory.
    pub fn from_request(request: &DownloadRequest) -> Result<Self, ValidationError> {
        let subdir = request.subdir.as_deref().unwrap_or(DEFAULT_SUBDIR);
        Self::new(&request.url, &request.filename, subdir)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn subdir(&self) -> ModelDir {
        self.subdir
    }

    /// Destination path of this job below a models directory.
    pub fn destination_in(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(self.subdir.as_str()).join(&self.filename)
    }
}

fn is_plain_filename(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_allowed_subdir() {
        for dir in ModelDir::ALL {
            assert_eq!(dir.as_str().parse::<ModelDir>().unwrap(), dir);
        }
    }

    #[test]
    fn rejects_unknown_subdir_naming_it() {
        let err = DownloadJob::new("http://host/a.bin", "a.bin", "../etc").unwrap_err();
        match &err {
            ValidationError::SubdirNotAllowed { subdir, allowed } => {
                assert_eq!(subdir, "../etc");
                assert!(allowed.contains("diffusion_models"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("../etc"));
    }

    #[test]
    fn requires_url_and_filename() {
        assert_eq!(
            DownloadJob::new("", "a.bin", "vae").unwrap_err(),
            ValidationError::MissingField("url")
        );
        assert_eq!(
            DownloadJob::new("http://host/a", "", "vae").unwrap_err(),
            ValidationError::MissingField("filename")
        );
    }

    #[test]
    fn rejects_path_traversal_in_filename() {
        for name in ["../x.bin", "a/b.bin", "..", "a\\b"] {
            assert!(matches!(
                DownloadJob::new("http://host/a", name, "vae"),
                Err(ValidationError::InvalidFilename(_))
            ));
        }
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            DownloadJob::new("file:///etc/passwd", "passwd", "vae"),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn request_without_subdir_uses_default() {
        let request = DownloadRequest {
            url: "https://host/model.safetensors".into(),
            filename: "model.safetensors".into(),
            subdir: None,
        };
        let job = DownloadJob::from_request(&request).unwrap();
        assert_eq!(job.subdir(), ModelDir::TextEncoders);
        assert_eq!(
            job.destination_in(Path::new("/storage/models")),
            PathBuf::from("/storage/models/text_encoders/model.safetensors")
        );
    }
}
