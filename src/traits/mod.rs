pub mod agent;
pub mod directory;
pub mod fleet_store;
pub mod job_queue;
