//! Command-line handlers

pub mod commands;
