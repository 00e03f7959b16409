//! Error types for the package crate.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while reading package formats.
#[derive(Error, Diagnostic, Debug)]
pub enum PackageError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(bolt_package::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error("Archive member `{}` escapes the destination directory", path.display())]
    #[diagnostic(
        code(bolt_package::unsafe_path),
        help("Archive members must not contain `..` components")
    )]
    UnsafePath { path: PathBuf },

    #[error("Malformed control data: {0}")]
    #[diagnostic(code(bolt_package::control))]
    Control(String),

    #[error("Failed to parse descriptor: {0}")]
    #[diagnostic(code(bolt_package::xml))]
    Xml(#[from] xml::reader::Error),

    #[error("Invalid descriptor: {0}")]
    #[diagnostic(code(bolt_package::descriptor))]
    Descriptor(String),
}

/// A specialized Result type for package operations.
pub type Result<T> = std::result::Result<T, PackageError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            PackageError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
