pub mod config;
pub mod error;
pub mod grid;
pub mod model;
pub mod optimizer;
pub mod process;
pub mod rng;

// Re-export commonly used types for convenience
pub use error::{OptionExt, Result, VaxError};
