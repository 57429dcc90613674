//! `peerchat`: per-contact conversation message store.

pub mod config;
pub mod contact;
pub mod conversation;
pub mod dispatch;
