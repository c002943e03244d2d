//! Data models for the City Fix backend.
//!
//! Field names on the wire are camelCase to match the web client.

mod issue;
mod staff;
mod user;

pub use issue::*;
pub use staff::*;
pub use user::*;
