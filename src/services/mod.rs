//! Background services

pub mod resolver;
pub mod scheduler;

pub use resolver::{generate_config, select_reachable, Resolution, Resolver};
pub use scheduler::{ReloadRequest, ReloadScheduler, SchedulerChannels, SchedulerHandle};
