pub mod config;
pub mod db;
pub mod error;
pub mod explanations;
pub mod interfaces;
pub mod knowledge;
pub mod logging;
pub mod planner;
pub mod plans;
pub mod providers;
pub mod ratelimit;
pub mod runtime_paths;
pub mod services;
pub mod session;
pub mod tutor;
pub mod usage;

pub use error::{LearningOsError, Result};
