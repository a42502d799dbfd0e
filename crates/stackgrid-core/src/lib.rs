pub mod config;
pub mod delta;
pub mod error;
pub mod triple;
pub mod types;
pub mod vocab;

pub use config::StackConfig;
pub use delta::{DeltaBatch, SubjectGroup};
pub use error::{ConfigError, DeltaError, DeltaResult};
pub use triple::{Term, Triple};
pub use types::*;
