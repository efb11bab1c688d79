//! Coderun command-line client library.
//!
//! Configuration, logging, and the terminal front end live here, separate
//! from main.rs, so they can be tested without a terminal.

pub mod config;
pub mod logging;
pub mod terminal;
