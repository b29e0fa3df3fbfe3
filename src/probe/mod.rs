//! Candidate probing
//!
//! ```text
//! reachability.rs: TCP connect to every candidate, one shared deadline
//!     → reachable subset, subscription order kept (or first winner only)
//!
//! functional.rs: HTTP GET through the engine's local inbound
//!     → bounded retries with a fixed backoff
//! ```

pub mod functional;
pub mod reachability;

pub use functional::{FunctionalCheck, HttpFunctionalProber};
pub use reachability::{ReachabilityProber, SelectionPolicy};
