//! CLI domain: parse, route, output and presentation only.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{format_run_json, format_run_text, RunReport};
pub use route::RunContext;
