//! Error types for the scene compiler.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scene compilation and serialization.
#[derive(Error, Debug)]
pub enum Error {
    /// Material expression text could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Material expression is well-formed but semantically invalid
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A resource (texture, scene file) could not be resolved or opened
    #[error("Resource error for {path}: {reason}")]
    Resource { path: PathBuf, reason: String },

    /// A texture exists but could not be decoded
    #[error("Texture error for {path}: {reason}")]
    Texture { path: PathBuf, reason: String },

    /// Failure while compiling a named material
    #[error("Material `{name}`: {source}")]
    Material {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// Scene has no mesh instances to partition
    #[error("Scene has no mesh instances")]
    EmptyScene,

    /// BVH builder invoked without items
    #[error("Cannot build a BVH over zero items")]
    EmptyBuild,

    /// Scene data violates a structural invariant
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// Compiled scene container is malformed
    #[error("Corrupt scene container: {0}")]
    CorruptContainer(String),

    /// Decompressed payload length disagrees with the header
    #[error("Size mismatch: header says {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Payload ended before a section was complete
    #[error("Unexpected end of data at position {0}")]
    UnexpectedEof(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (scene description or config) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid scene error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidScene(msg.into())
    }

    /// Create a corrupt container error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptContainer(msg.into())
    }

    /// Wrap this error with the name of the material being compiled.
    pub fn in_material(self, name: impl Into<String>) -> Self {
        Self::Material {
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Validation error carried by this error, looking through material context.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Material { source, .. } => source.validation(),
            _ => None,
        }
    }
}

/// Syntax error in a material expression.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}\nin col {column}:\n\n    {source_text}\n    {caret}")]
pub struct ParseError {
    pub message: String,
    /// 1-based column of the offending token.
    pub column: usize,
    pub source_text: String,
    caret: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, source_text: &str, column: usize, len: usize) -> Self {
        let column = column.max(1);
        let caret = format!("{}{}", " ".repeat(column - 1), "^".repeat(len.max(1)));
        Self {
            message: message.into(),
            column,
            source_text: source_text.to_string(),
            caret,
        }
    }
}

/// Semantic errors raised while validating or lowering a material expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{param} component {value} violates energy conservation (must be < 1.0)")]
    EnergyConservation { param: &'static str, value: f32 },

    #[error("{what} {value} is out of range [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },

    #[error("parameter `{param}` is not allowed for {bxdf} bxdf")]
    DisallowedParameter {
        bxdf: &'static str,
        param: &'static str,
    },

    #[error("parameter `{param}` expects {expected}")]
    InvalidParamValue {
        param: &'static str,
        expected: &'static str,
    },

    #[error("parameter `{param}` specified more than once")]
    DuplicateParameter { param: &'static str },

    #[error("detected circular dependency loop while processing {}; {}", chain_head(.chain), .chain.join(" => "))]
    CircularReference { chain: Vec<String> },

    #[error("undefined reference to `{name}`")]
    UnknownMaterial { name: String },

    #[error("unknown IOR material `{name}`")]
    UnknownIor { name: String },

    #[error("material nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("disperse requires a non-zero intIOR or extIOR")]
    DegenerateDisperse,
}

fn chain_head(chain: &[String]) -> &str {
    chain.first().map(String::as_str).unwrap_or("")
}

/// Result type alias for scene compiler operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::SizeMismatch { expected: 5, actual: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));

        let e = Error::from(ValidationError::UnknownMaterial { name: "gold".into() });
        assert!(e.to_string().contains("`gold`"));
    }

    #[test]
    fn test_circular_message_lists_chain() {
        let e = ValidationError::CircularReference {
            chain: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(
            e.to_string(),
            "detected circular dependency loop while processing A; A => B => A"
        );
    }

    #[test]
    fn test_material_context_keeps_validation() {
        let e = Error::from(ValidationError::DegenerateDisperse).in_material("prism");
        assert!(e.to_string().starts_with("Material `prism`"));
        assert_eq!(e.validation(), Some(&ValidationError::DegenerateDisperse));
    }

    #[test]
    fn test_parse_error_caret() {
        let e = ParseError::new("unexpected token", "mix(a, b)", 5, 1);
        let text = e.to_string();
        assert!(text.contains("in col 5"));
        assert!(text.ends_with("    mix(a, b)\n        ^"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
