pub mod config;
pub mod directory;
pub mod error;
pub mod generation;
pub mod types;

pub use config::UnibotConfig;
pub use directory::{MemoryDirectory, StudentDirectory};
pub use error::{Result, UnibotError};
pub use generation::{FailingGenerator, MockGenerator, TextGenerator};
pub use types::*;
