//! Error types for definition loading, link resolution, evaluation and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading an API definition document.
#[derive(Debug, Error)]
pub enum DefinitionError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid definition at {path}: {message}")]
    InvalidDocument { path: String, message: String },

    #[error("unknown schema '{name}' referenced at {path}")]
    UnknownSchema { name: String, path: String },

    #[error("recursive schema reference: {chain}")]
    RecursiveSchema { chain: String },

    #[error("unsupported $ref \"{reference}\" at {path}: expected #/schemas/<name>")]
    InvalidReference { path: String, reference: String },

    #[error("unknown field type \"{value}\" at {path}")]
    UnknownType { path: String, value: String },

    #[error("array field at {path} has no items schema")]
    MissingItems { path: String },

    #[error("invalid annotation at {path}: expected object, got {actual}")]
    InvalidAnnotationType { path: String, actual: String },

    #[error("invalid link at {path}: {message}")]
    InvalidLink { path: String, message: String },

    #[error("plugin link kind \"{kind}\" at {path} is not registered")]
    UnknownPlugin { path: String, kind: String },

    #[error("plugin link \"{kind}\" at {path} rejected its parameters: {message}")]
    PluginParams {
        path: String,
        kind: String,
        message: String,
    },

    #[error("unknown HTTP method \"{value}\" at {path}")]
    UnknownMethod { path: String, value: String },

    #[error(transparent)]
    Output(#[from] ResolveError),
}

impl DefinitionError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DefinitionError::FileNotFound { .. } | DefinitionError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            DefinitionError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors during link resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid output type {annotation}: {reason}")]
    InvalidOutputType { annotation: String, reason: String },
}

impl ResolveError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors while turning an override map into concrete values.
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("computed fields of '{schema}' form a cycle: {cycle}")]
    ComputedCycle { schema: String, cycle: String },

    #[error("computed field '{field}' of '{schema}' depends on unknown field '{dependency}'")]
    UnknownDependency {
        schema: String,
        field: String,
        dependency: String,
    },
}

impl EvaluateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors during payload validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}

/// Single validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported config format: {path} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat { path: PathBuf },
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::NotFound { .. } | ConfigError::Read { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors when serving a mock request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no {method} endpoint registered for {path}")]
    NotFound { method: String, path: String },

    #[error("invalid endpoint definitions:\n{}", errors.join("\n"))]
    InvalidEndpoints { errors: Vec<String> },

    #[error("request input rejected: {source}")]
    InvalidInput {
        #[source]
        source: ValidateError,
    },

    #[error("generated response does not match its schema: {source}")]
    InvalidResponse {
        #[source]
        source: ValidateError,
    },

    #[error(transparent)]
    Evaluate(#[from] EvaluateError),
}

impl ApiError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ApiError::InvalidEndpoints { .. } => 1,
            ApiError::InvalidInput { source } | ApiError::InvalidResponse { source } => {
                source.exit_code()
            }
            ApiError::NotFound { .. } => 2,
            ApiError::Evaluate(e) => e.exit_code(),
        }
    }

    /// Validation errors carried by this error, if any.
    pub fn schema_errors(&self) -> &[SchemaError] {
        match self {
            ApiError::InvalidInput {
                source: ValidateError::Invalid { errors },
            }
            | ApiError::InvalidResponse {
                source: ValidateError::Invalid { errors },
            } => errors,
            _ => &[],
        }
    }
}
