//! Session controller tests.
//!
//! - `harness.rs`       - Fake provider, repository, surface and storage
//! - `restoration.rs`   - Deriving the state from persisted data
//! - `sign_in_out.rs`   - Sign-in, sign-out, onboarding and state callbacks
//! - `flow.rs`          - OAuth flows: cancellation, concurrency, exactly-once results
//! - `error_channel.rs` - Publishing and clearing user-facing errors

mod error_channel;
mod flow;
mod sign_in_out;
