use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for forecasting, artifacts and edge computation
#[derive(Error, Debug)]
pub enum HooplineError {
    // Feature schema errors
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    // Artifact errors
    #[error("Artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Architecture mismatch: {0}")]
    ArchitectureMismatch(String),

    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    // Market data errors (non-fatal, edge fields are nulled)
    #[error("Missing market data: {0}")]
    MissingMarketData(String),

    // Should never surface; indicates a bug in a clamp or transform
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Tensor backend failures (readback of parameter data)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for HooplineError
pub type Result<T> = std::result::Result<T, HooplineError>;

/// Coarse error classification used for per-kind batch summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaMismatch,
    ArtifactNotFound,
    ArchitectureMismatch,
    MissingArtifact,
    MissingMarketData,
    NumericDegeneracy,
    Config,
    Io,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::ArtifactNotFound => "artifact_not_found",
            ErrorKind::ArchitectureMismatch => "architecture_mismatch",
            ErrorKind::MissingArtifact => "missing_artifact",
            ErrorKind::MissingMarketData => "missing_market_data",
            ErrorKind::NumericDegeneracy => "numeric_degeneracy",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HooplineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HooplineError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            HooplineError::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            HooplineError::ArchitectureMismatch(_) => ErrorKind::ArchitectureMismatch,
            HooplineError::MissingArtifact(_) => ErrorKind::MissingArtifact,
            HooplineError::MissingMarketData(_) => ErrorKind::MissingMarketData,
            HooplineError::NumericDegeneracy(_) => ErrorKind::NumericDegeneracy,
            HooplineError::Config(_) | HooplineError::Validation(_) => ErrorKind::Config,
            HooplineError::Io(_) | HooplineError::Json(_) => ErrorKind::Io,
            HooplineError::Internal(_) => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_domain_variants() {
        let err = HooplineError::SchemaMismatch("len 3 != 4".into());
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let err = HooplineError::ArtifactNotFound(PathBuf::from("/tmp/missing.json"));
        assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
        assert!(err.to_string().contains("/tmp/missing.json"));
    }

    #[test]
    fn validation_counts_as_config() {
        let err = HooplineError::Validation("dropout".into());
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.kind().to_string(), "config");
    }

    #[test]
    fn internal_is_other() {
        let err = HooplineError::Internal("tensor readback failed".into());
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.kind().as_str(), "other");
    }
}
