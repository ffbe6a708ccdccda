pub mod app;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod fragment;
pub mod globe;
pub mod model;
pub mod normalize;
pub mod prefs;
pub mod roster;
pub mod runtime;
pub mod telemetry;
pub mod timeline;
pub mod viewer;
