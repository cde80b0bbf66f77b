pub mod args;
pub mod commands;
pub mod prompt;

pub use args::{Cli, Commands};
pub use commands::{init_logging, run};
pub use prompt::ConsoleDecision;
