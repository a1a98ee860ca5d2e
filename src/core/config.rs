//! Run configuration and the `Analyzer` builder

use crate::core::commands::CommandSender;
use crate::core::detector::DetectorConfig;
use crate::core::host::Pipeline;
use crate::core::logger;
use crate::core::metadata::MetadataResolver;
use crate::core::stage::AnalysisStage;
use crate::core::types::DeadlockInfo;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn default_capture_stack_traces() -> bool {
    true
}

/// Settings of one analysis run, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Structured replay log; `{timestamp}` in the name is expanded
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Ask the agent for stack traces of deadlocked threads
    #[serde(default = "default_capture_stack_traces")]
    pub capture_stack_traces: bool,
    /// Where the CLI writes the final report
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            log_path: None,
            capture_stack_traces: default_capture_stack_traces(),
            report_path: None,
        }
    }
}

impl AnalysisConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Builder for an analysis [`Pipeline`]
///
/// # Example
///
/// ```no_run
/// use hbtrace::Analyzer;
///
/// let pipeline = Analyzer::new()
///     .with_log("replay_{timestamp}.log")
///     .callback(|info| eprintln!("deadlock in process {}", info.process_id))
///     .start()
///     .expect("failed to start analysis");
/// ```
pub struct Analyzer {
    config: AnalysisConfig,
    callback: Option<Arc<dyn Fn(&DeadlockInfo) + Send + Sync>>,
    command_sender: Option<Arc<dyn CommandSender>>,
    resolver: Option<Arc<dyn MetadataResolver>>,
    stages: Vec<Box<dyn AnalysisStage>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// Create a builder with default settings
    ///
    /// By default:
    /// - Logging is disabled
    /// - No callback is registered; deadlocks are still collected for the summary
    /// - Stack traces are requested only once a command sender is set
    pub fn new() -> Self {
        Analyzer {
            config: AnalysisConfig::default(),
            callback: None,
            command_sender: None,
            resolver: None,
            stages: Vec::new(),
        }
    }

    /// Activate logger and set the path for the log file
    pub fn with_log<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Replace all file-backed settings at once
    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a callback to be invoked once per newly detected deadlock
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DeadlockInfo) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn command_sender(mut self, sender: Arc<dyn CommandSender>) -> Self {
        self.command_sender = Some(sender);
        self
    }

    pub fn metadata_resolver(mut self, resolver: Arc<dyn MetadataResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Add an analysis stage after the deadlock detector
    pub fn stage(mut self, stage: Box<dyn AnalysisStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Build the pipeline with the configured settings
    ///
    /// # Errors
    /// Returns an error if logger initialization fails
    pub fn start(self) -> Result<Pipeline> {
        if let Some(log_path) = &self.config.log_path {
            logger::init_logger(Some(log_path)).context("Failed to initialize logger")?;
        }

        let mut pipeline = Pipeline::new(DetectorConfig {
            callback: self.callback,
            command_sender: self.command_sender,
            capture_stack_traces: self.config.capture_stack_traces,
        });
        if let Some(resolver) = self.resolver {
            pipeline = pipeline.with_resolver(resolver);
        }
        for stage in self.stages {
            pipeline.add_stage(stage);
        }
        Ok(pipeline)
    }
}
