pub mod config;
pub mod paths;

pub use config::{GlobalConfig, MemorySection, SchedulerSection};
