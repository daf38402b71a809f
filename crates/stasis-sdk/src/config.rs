use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Configuration for dehydrating and resuming documents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Check every pointer of a resumed table before any store is rebuilt.
    /// When off, corruption surfaces lazily on first read.
    pub validate_on_resume: bool,
    /// Reject resumed tables whose digest does not match their body.
    pub verify_digest: bool,
    /// Upper bound on table entries, for both dehydrate and resume.
    pub max_entries: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validate_on_resume: true,
            verify_digest: true,
            max_entries: None,
        }
    }
}

impl RuntimeConfig {
    /// Configuration that trusts its input and checks lazily.
    pub fn lenient() -> Self {
        Self {
            validate_on_resume: false,
            verify_digest: false,
            max_entries: None,
        }
    }

    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SdkError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    fn check(&self) -> SdkResult<()> {
        if self.max_entries == Some(0) {
            return Err(SdkError::Config("max_entries must be at least 1".into()));
        }
        Ok(())
    }
}
