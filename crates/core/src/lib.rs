//! Core crate for the morphlyca console: API client, job workflow and the
//! media gateway.

pub mod api;
pub mod config;
pub mod credentials;
pub mod explore;
pub mod logging;
pub mod poller;
pub mod quota;
pub mod server;
pub mod service;
pub mod storage;
pub mod submission;
pub mod types;
