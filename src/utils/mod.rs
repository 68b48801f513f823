pub mod env;
pub mod git;
pub mod path;
