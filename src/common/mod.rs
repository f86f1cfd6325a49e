pub mod build;
pub mod config;
pub mod error;
pub mod job;
pub mod partner;
pub mod project;
pub mod secret;
pub mod utils;
