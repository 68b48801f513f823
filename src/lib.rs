#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod manifest;
pub mod reconcile;
pub mod registry;
pub mod schema;
pub mod utils;
pub mod version;
