//! Shared CLI presentation utilities.
//!
//! Keep this module format-only: handlers decide what to print, these
//! functions decide how it looks.

pub mod output;
pub mod progress;

pub use output::{format_models, print_json};
pub use progress::TransferBar;
