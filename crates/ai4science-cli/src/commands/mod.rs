//! CLI command implementations.

mod auth;

pub use auth::{handle_url, login, logout, status};
