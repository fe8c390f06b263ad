//! CLI command implementations
//!
//! The default command flashes a batch of boards; `list-ports` only shows
//! what discovery would pick up.

pub mod flash;
mod list;
mod progress;

pub use list::list_ports;
pub use progress::SpinnerObserver;
