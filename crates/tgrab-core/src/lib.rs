//! Core domain + application logic for the tgrab media downloader.
//!
//! This crate is intentionally framework-agnostic. The Telegram client lives
//! behind the provider port (trait) implemented in the adapter crate, so the
//! whole pipeline runs against scripted fakes in tests.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod downloader;
pub mod errors;
pub mod links;
pub mod logging;
pub mod provider;
pub mod resolver;

pub use errors::{Error, Result};
