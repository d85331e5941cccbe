//! Lowering options loaded from TOML
//!
//! ```toml
//! intrinsics = true
//! verify_reservations = true
//! max_locals = 1024
//! source_name = "main.tes"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading options.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize options: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for '{0}': {1}")]
    Invalid(&'static str, &'static str),
}

/// Options shared by every function lowered in one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CodegenOptions {
    /// Lower primitive operator calls to arithmetic instructions.
    pub intrinsics: bool,

    /// Fail when a function is finished with unpatched jump reservations.
    pub verify_reservations: bool,

    /// Upper bound on local slots per function, hidden temporaries included.
    pub max_locals: u16,

    /// Recorded in every emitted chunk for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            intrinsics: true,
            verify_reservations: true,
            max_locals: u16::MAX,
            source_name: None,
        }
    }
}

impl CodegenOptions {
    /// Load options from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse options from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Render the options back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_locals == 0 {
            return Err(ConfigError::Invalid("max_locals", "must be at least 1"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_intrinsics(mut self, enabled: bool) -> Self {
        self.intrinsics = enabled;
        self
    }

    #[must_use]
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let options = CodegenOptions::parse("").unwrap();
        assert_eq!(options, CodegenOptions::default());
        assert!(options.intrinsics);
        assert_eq!(options.max_locals, u16::MAX);
    }

    #[test]
    fn parse_all_fields() {
        let toml = r#"
intrinsics = false
verify_reservations = false
max_locals = 16
source_name = "main.tes"
"#;
        let options = CodegenOptions::parse(toml).unwrap();
        assert!(!options.intrinsics);
        assert!(!options.verify_reservations);
        assert_eq!(options.max_locals, 16);
        assert_eq!(options.source_name.as_deref(), Some("main.tes"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = CodegenOptions::parse("inline = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_locals_is_rejected() {
        let err = CodegenOptions::parse("max_locals = 0").unwrap_err();
        assert_eq!(err.to_string(), "invalid value for 'max_locals': must be at least 1");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "intrinsics = false").unwrap();
        let options = CodegenOptions::from_path(file.path()).unwrap();
        assert!(!options.intrinsics);

        let missing = CodegenOptions::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn toml_roundtrip() {
        let options = CodegenOptions::default()
            .with_intrinsics(false)
            .with_source_name("lib.tes");
        let text = options.to_toml().unwrap();
        assert_eq!(CodegenOptions::parse(&text).unwrap(), options);
    }
}
