pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod schema;

pub use orchestrator::{ConsultRequest, Consultant, render_solution};
pub use parse::{Solution, parse_solution};
