pub mod addons;
pub mod cli;
pub mod core;
pub mod debrid;
pub mod http;
pub mod i18n;

pub use crate::core::engine::{Engine, EngineOptions};
