//! Command implementations for the formulary CLI
//!
//! - **install**: fetch, install, test, uninstall
//! - **list**: installed kegs
//! - **paths**: configuration report
//! - **query**: formula info, artifact resolution, caveats
//! - **utilities**: livecheck, shell completions

pub mod install;
pub mod list;
pub mod paths;
pub mod query;
pub mod utilities;

pub use install::{InstallOptions, fetch, install, test, uninstall};
pub use list::list;
pub use paths::config;
pub use query::{caveats, info, resolve};
pub use utilities::{completions, livecheck};
