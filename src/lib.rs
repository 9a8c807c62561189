pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod output;
pub mod query;
pub mod store;
pub mod sync;
