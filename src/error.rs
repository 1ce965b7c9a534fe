use thiserror::Error;

// ── Library errors ─────────────────────────────────────────────────────────

/// Every failure the core can report to a host. None of them is fatal: the
/// host shows a notice and the live document stays as it was.
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Persisted data could not be used. `reconcile::load` never returns
    /// this: it falls back to defaults and logs. Hosts use it to report a
    /// settings file their own store rejected.
    #[error("Malformed persisted data: {0}")]
    MalformedPersistedData(String),

    /// Clipboard or file text was not valid JSON of the expected shape.
    #[error("Invalid JSON: {0}")]
    InvalidImportJson(String),

    /// Imported or entered data lacks a required key (e.g. a theme title).
    #[error("Missing required field '{0}'")]
    MissingRequiredField(&'static str),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// The name is already taken; retry with `overwrite = true` after the
    /// user confirms.
    #[error("{kind} already exists: {}", names.join(", "))]
    DuplicateNameConflict {
        kind: &'static str,
        names: Vec<String>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Nothing to export")]
    NothingToExport,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LibraryError {
    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        LibraryError::DuplicateNameConflict {
            kind,
            names: vec![name.into()],
        }
    }

    /// True when the host should ask the user before retrying with
    /// `overwrite = true`.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, LibraryError::DuplicateNameConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;

// ── Translation errors ─────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("Nothing to translate")]
    EmptyInput,

    #[error("Translation service is not configured: {0}")]
    NotConfigured(&'static str),

    /// The local inference endpoint refused the connection (not running).
    #[error("Could not connect to {url}; make sure the service is running")]
    ConnectionRefused { url: String },

    #[error("Translation service returned HTTP {0}")]
    Status(u16),

    #[error("Translation result was empty")]
    EmptyResult,

    /// A newer request was issued while this one was in flight.
    #[error("Translation superseded by a newer request")]
    Superseded,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl TranslationError {
    /// Superseded results are dropped silently; everything else is shown.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, TranslationError::Superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_lists_names() {
        let err = LibraryError::DuplicateNameConflict {
            kind: "Theme",
            names: vec!["Glass".to_string(), "Neon".to_string()],
        };
        assert_eq!(err.to_string(), "Theme already exists: Glass, Neon");
        assert!(err.needs_confirmation());
    }

    #[test]
    fn test_malformed_data_is_not_a_conflict() {
        let err = LibraryError::MalformedPersistedData("root is an array".to_string());
        assert_eq!(err.to_string(), "Malformed persisted data: root is an array");
        assert!(!err.needs_confirmation());
    }

    #[test]
    fn test_translation_error_converts() {
        let err: LibraryError = TranslationError::EmptyResult.into();
        assert!(matches!(err, LibraryError::Translation(TranslationError::EmptyResult)));
        assert!(!err.needs_confirmation());
        assert!(!TranslationError::Superseded.is_user_visible());
        assert!(TranslationError::Status(500).is_user_visible());
    }
}
