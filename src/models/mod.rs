pub mod candidate;
pub mod engine_config;
pub mod status;

pub use candidate::*;
pub use engine_config::*;
pub use status::*;
