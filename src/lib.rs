//! Pixiv retrieval core for chat bots.
//!
//! Fetches rankings, searches, bookmarks and details from the Pixiv app API,
//! caches them with per-kind lifetimes, picks random items by weight and runs
//! user commands through admission checks before handing results to a chat
//! adapter.

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod handler;
pub mod interceptor;
pub mod model;
pub mod postman;
pub mod random;
pub mod remote;
pub mod repo;
pub mod service;
