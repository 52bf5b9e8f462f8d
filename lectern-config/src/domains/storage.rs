//! Upload storage configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where uploaded inputs live and which of them may be converted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `<file_id>.<ext>` uploads
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Accepted extensions, with the leading dot
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            supported_extensions: default_supported_extensions(),
        }
    }
}

impl StorageConfig {
    /// Whether `path` carries one of the supported extensions
    pub fn is_supported(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.supported_extensions
            .iter()
            .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

impl Validatable for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(self.validation_error("upload_dir cannot be empty"));
        }

        if self.supported_extensions.is_empty() {
            return Err(self.validation_error("supported_extensions cannot be empty"));
        }

        for ext in &self.supported_extensions {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(self.validation_error(format!(
                    "extension '{}' must look like '.ext'",
                    ext
                )));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "storage"
    }
}

fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("lectern").join("uploads")
}

fn default_supported_extensions() -> Vec<String> {
    [
        ".pdf", ".docx", ".doc", ".odt", ".xlsx", ".xls", ".ods", ".pptx", ".ppt", ".odp",
        ".html", ".epub", ".png", ".jpg", ".jpeg", ".webp", ".gif", ".tiff", ".txt", ".md",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
