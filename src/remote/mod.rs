pub mod gearman;
pub mod jenkins;
