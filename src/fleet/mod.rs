pub mod aggregator;
pub mod connection;
pub mod credential;
pub mod dispatcher;
pub mod fleet_directory;
pub mod projects;
pub mod registry;
pub mod sync;
