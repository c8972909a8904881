#![forbid(unsafe_code)]

//! Shared building blocks for the tubegrab server and CLI.

pub mod config;
pub mod extractor;
pub mod formats;
pub mod logging;
pub mod page;
pub mod security;
