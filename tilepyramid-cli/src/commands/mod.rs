//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`generate`] - Render a tile pyramid (main command)
//! - [`init`] - Write the default configuration file
//! - [`bboxes`] - List the named bounding boxes
//! - [`worker`] - Child process entry point of the process pool

pub mod bboxes;
pub mod common;
pub mod generate;
pub mod init;
pub mod worker;
