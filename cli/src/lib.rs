//! fwpipe command line: exposed as a library so the subcommands can be unit tested.

pub mod app;
pub mod commands;
pub mod signals;
pub mod worker;
