//! Wayfinder CLI library.
//!
//! Terminal styling and output rendering shared by the `wayfinder-cli`
//! subcommands.

pub mod output;
pub mod terminal;
