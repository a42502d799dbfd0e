//! stackgrid-compose — external commands run on behalf of pipelines.
//!
//! Pipelines are compose projects checked out under a projects root. This
//! crate owns everything that touches them from the outside: the bounded
//! process runner, the compose and git command sets, the project directory
//! layout, and reading service names from the descriptor files.

pub mod compose;
pub mod descriptor;
pub mod error;
pub mod git;
pub mod projects;
pub mod runner;

pub use compose::Compose;
pub use descriptor::ServiceDef;
pub use error::{ComposeError, ComposeResult};
pub use git::Git;
pub use projects::Projects;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
