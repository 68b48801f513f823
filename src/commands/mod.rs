pub mod add;
pub mod cache;
pub mod config;
pub mod helpers;
pub mod resolve;
pub mod secrets;
pub mod sync;
pub mod validate;
pub mod version;
