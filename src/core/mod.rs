// Core types
pub mod types;
pub use types::*;

pub mod error;
pub use error::{EngineError, EngineResult};

// Shadow locks and their registries
pub mod locks;

// Admission control
pub mod delivery;
pub mod ordering;

// Deadlock detection
pub mod concurrency;
pub mod detector;
pub mod graph;
pub mod stage;

// Collaborators outside the analysis
pub mod commands;
pub mod metadata;

// Logging functionality
pub mod logger;
pub use logger::init_logger;

// Hosting
pub mod actor;
pub mod config;
pub mod host;
