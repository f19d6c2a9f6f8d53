//! Library interface for formulary
//!
//! Formula records are plain data ([`formula`], [`catalog`]); the
//! [`installer`] drives one record end to end: resolve the artifact for the
//! host architecture, fetch and verify it, run the record's install strategy
//! into a fresh keg, then run the record's test procedure.

pub mod bottle;
pub mod catalog;
pub mod cellar;
pub mod colors;
pub mod config;
pub mod download;
pub mod error;
pub mod formula;
pub mod installer;
pub mod layout;
pub mod livecheck;
pub mod platform;
pub mod process;
pub mod receipt;
pub mod resolver;
pub mod strategy;
pub mod symlink;
pub mod verify;
pub mod wrapper;

// Re-export commonly used types
pub use catalog::Catalog;
pub use config::Config;
pub use error::{FormulaError, Result};
pub use formula::Formula;
pub use installer::{InstallRequest, Installer};
pub use platform::{Arch, HostConfig};
pub use symlink::normalize_path;
