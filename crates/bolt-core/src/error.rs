//! Error types for bolt-core.

use std::path::PathBuf;

use bolt_config::error::ConfigError;
use bolt_dl::DownloadError;
use bolt_package::PackageError;
use bolt_utils::error::{FileSystemError, HashError, LockError, PathError};
use miette::Diagnostic;
use thiserror::Error;

/// Core error type for build and repository operations.
#[derive(Error, Diagnostic, Debug)]
pub enum BoltError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystemError(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    HashError(#[from] HashError),

    #[error("Error while {action}")]
    #[diagnostic(code(bolt::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    PackageError(#[from] PackageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    LockError(#[from] LockError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    PathError(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Download(#[from] DownloadError),

    #[error("Invalid package descriptor: {0}")]
    #[diagnostic(
        code(bolt::invalid_descriptor),
        help("Check the package descriptor against the expected <source> layout")
    )]
    InvalidDescriptor(String),

    #[error("invalid package action '{0}'.")]
    #[diagnostic(
        code(bolt::invalid_action),
        help("Valid actions are: prepare, build, install, clean")
    )]
    InvalidAction(String),

    #[error("source archive for '{0}' not found.")]
    #[diagnostic(
        code(bolt::missing_source),
        help("Place the archive in the source cache or configure a source mirror")
    )]
    MissingSource(String),

    #[error("executable '{0}' not found")]
    #[diagnostic(
        code(bolt::missing_executable),
        help("Install it or make sure it is on your PATH")
    )]
    MissingExecutable(String),

    #[error("couldn't apply patch \"{patch}\"")]
    #[diagnostic(code(bolt::patch_failed))]
    PatchFailed { patch: String },

    #[error("failed to {action} the source package.")]
    #[diagnostic(code(bolt::action_failed))]
    ActionFailed { action: String },

    #[error("Malformed package `{}`: {reason}", path.display())]
    #[diagnostic(code(bolt::malformed_package), severity(warning))]
    MalformedPackage { path: PathBuf, reason: String },

    #[error("{0}")]
    #[diagnostic(code(bolt::error))]
    Custom(String),
}

impl BoltError {
    /// Returns true for errors that only invalidate a single pool entry.
    ///
    /// The repository scan skips such entries and carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedPackage { .. })
    }
}

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, BoltError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, BoltError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            BoltError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
