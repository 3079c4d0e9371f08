//! Quill - static site deploys from a content repository
//!
//! Keeps an in-memory, background-refreshed index of a site's content,
//! and runs tracked sync → build → publish jobs behind an access gate.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod service;
pub mod transport;
pub mod ui;

pub use error::{QuillError, QuillResult};
