//! Shared type definitions for `peerchat` conversations.

pub mod message;
pub mod presence;
