//! stackgrid-store — typed access to resource records in the graph store.
//!
//! All durable state lives in the external graph database. This crate
//! turns the engine's reads and writes into query text, escapes every
//! interpolated value, and decodes result sets into typed records.
//!
//! # Architecture
//!
//! ```text
//! ResourceStore (trait)
//!   ├── SparqlStore  → SparqlClient → POST query=/update= over HTTP/1
//!   └── MemoryStore  → triple list (tests)
//! ```

pub mod accessor;
pub mod client;
pub mod error;
pub mod escape;
pub mod memory;
pub mod ready;
pub mod sparql;
pub mod types;

pub use accessor::ResourceStore;
pub use client::SparqlClient;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use ready::wait_until_ready;
pub use sparql::SparqlStore;
pub use types::{NewService, RepositorySource, RunningService, ScalingBound, ServiceRecord};
