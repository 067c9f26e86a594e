//! CLI command implementations
//!
//! Every command except `list-interfaces` runs against a [`Dispatcher`]
//! built from the loaded control documents and the opened interfaces.
//!
//! [`Dispatcher`]: rservo_core::Dispatcher

pub mod control;
mod list;
pub mod shell;

pub use list::list_interfaces;
