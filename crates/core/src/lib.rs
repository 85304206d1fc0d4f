pub mod config;
pub mod error;
pub mod metadata;

pub use config::{load_dotenv, ParallelConfig, RunConfig};
pub use error::*;
pub use metadata::{metadata_from, Metadata};
