#![allow(clippy::async_fn_in_trait)]
pub mod common;
pub mod fleet;
pub mod remote;
pub mod rest;
pub mod server;
pub mod storage;
pub mod traits;

pub use server::server::server_start;
