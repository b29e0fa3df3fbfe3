//! Subscription feed handling
//!
//! ```text
//! HTTP GET ─▶ base64 decode (whole body) ─▶ split lines ─▶ parse_candidate per line
//!                                                            │
//!                                        malformed lines ◀───┘ logged and skipped
//! ```

pub mod fetcher;
pub mod parser;

pub use fetcher::{decode_subscription, HttpSubscriptionFetcher, SubscriptionSource};
pub use parser::parse_candidate;
