//! Safe execution layer: validate command strings against a static policy and run them
//! as argument vectors. No shell is used; arguments are passed as a list to avoid injection.

mod policy;
mod result;
mod runner;
mod validate;
mod workdir;

pub use policy::{CommandCategory, CommandPolicy, DANGEROUS_PATTERNS};
pub use result::ExecutionResult;
pub use runner::Executor;
pub(crate) use runner::{build_command, Capture};
pub use validate::{base_command, validate, PolicyRejection, ValidatedCommand};
pub use workdir::WorkDirs;
