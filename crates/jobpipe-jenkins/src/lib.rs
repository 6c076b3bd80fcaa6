//! Jenkins backend for jobpipe: configuration, CSRF crumb caching, and the HTTP client
//! that implements [`jobpipe_core::JenkinsApi`].

pub mod client;
pub mod config;
pub mod crumb;
pub mod models;

pub use client::{CallOptions, JenkinsClient, Target};
pub use config::JenkinsConfig;
pub use crumb::CrumbCache;
