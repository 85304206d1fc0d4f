//! Run configuration for the job handler.
//!
//! Split into focused submodules:
//! - `types`: serde structs and their defaults
//! - `loading`: TOML parsing, env overrides and startup logging
//! - `validation`: sanity checks applied after loading

mod helpers;
mod loading;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use types::{ParallelConfig, RunConfig};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}
