pub mod context;
pub mod loader;
pub mod rest_server;
pub mod server;
