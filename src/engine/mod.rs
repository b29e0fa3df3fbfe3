//! Proxy engine integration
//!
//! The engine is an external process. `config_builder` renders the JSON
//! document it reads from stdin; `supervisor` owns the child process.

pub mod config_builder;
pub mod supervisor;

pub use config_builder::ConfigBuilder;
pub use supervisor::{EngineControl, ProcessInfo, ProcessSupervisor, SupervisedProcess};
