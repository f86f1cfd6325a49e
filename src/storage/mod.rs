pub mod file {
    pub mod file_fleet_store;
}
pub mod memory {
    pub mod memory_directory;
    pub mod memory_fleet_store;
}
pub mod redis {
    pub mod redis_client;
    pub mod redis_directory;
}
pub mod directory_impl;
pub mod fleet_snapshot;
pub mod fleet_store_impl;
