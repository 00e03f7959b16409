use bolt_utils::error::PathError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(bolt_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(bolt_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Invalid source mirror URL: {0}")]
    #[diagnostic(
        code(bolt_config::invalid_mirror),
        help("The mirror must be an http:// or https:// URL")
    )]
    InvalidMirror(String),

    #[error("Fetch timeout must be greater than zero")]
    #[diagnostic(code(bolt_config::invalid_timeout))]
    InvalidTimeout,

    #[error("IO error: {0}")]
    #[diagnostic(code(bolt_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    PathError(#[from] PathError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
