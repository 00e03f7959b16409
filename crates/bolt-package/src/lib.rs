//! Package primitives for the bolt packaging toolchain.
//!
//! This crate holds the formats shared by the build orchestrator and the
//! repository indexer:
//!
//! - **archive**: compression sniffing, tar extraction and member lookup in
//!   `ar` and tar containers
//! - **control**: the `Field: value` control block format
//! - **version**: ordering of package version strings
//! - **descriptor**: the XML package descriptor tree
//! - **relations**: build dependency specifications
//!
//! # Example
//!
//! ```
//! use std::cmp::Ordering;
//! use bolt_package::compare_versions;
//!
//! assert_eq!(compare_versions("1.2~rc1", "1.2"), Ordering::Less);
//! ```

pub mod archive;
pub mod control;
pub mod descriptor;
pub mod error;
pub mod relations;
pub mod version;

pub use control::ControlMetadata;
pub use descriptor::DescriptorNode;
pub use error::{ErrorContext, PackageError, Result};
pub use relations::{Dependency, DependencySpecification, PackageSet};
pub use version::compare_versions;
