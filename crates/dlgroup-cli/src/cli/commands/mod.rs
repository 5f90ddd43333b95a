//! CLI command handlers, one per file.

mod completions;
mod config;
mod discard;
mod inspect;
mod man;
mod plan;

pub use completions::run_completions;
pub use config::run_config;
pub use discard::run_discard;
pub use inspect::run_inspect;
pub use man::run_man;
pub use plan::{run_plan, PlanArgs};
