//! Logging sink
//!
//! The engine reports through a [`LogSink`]: `(module, message, level)`.
//! The default [`LogManager`] forwards to `tracing` and keeps a bounded,
//! per-module history whose size and threshold depend on the [`LogMode`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

/// Log severity, 0 (most severe) to 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Crit = 0,
    Error = 1,
    Warn = 2,
    Lib = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_number(level: u8) -> Self {
        match level {
            0 => Self::Crit,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Lib,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::Crit => "CRIT ",
            Self::Error => "Error",
            Self::Warn => "Warn ",
            Self::Lib => "Lib. ",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        };
        f.write_str(code)
    }
}

/// Preset emit/store thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    #[default]
    Prod,
    Dev,
    Lib,
    Run,
    Test,
}

impl LogMode {
    /// Most verbose level forwarded to `tracing`
    pub fn emit_level(&self) -> Option<LogLevel> {
        match self {
            Self::Prod => Some(LogLevel::Crit),
            Self::Dev | Self::Test => Some(LogLevel::Trace),
            Self::Lib => Some(LogLevel::Lib),
            Self::Run => Some(LogLevel::Error),
        }
    }

    /// Most verbose level kept in the history
    pub fn store_level(&self) -> Option<LogLevel> {
        match self {
            Self::Prod => None,
            Self::Dev | Self::Test => Some(LogLevel::Trace),
            Self::Lib => Some(LogLevel::Lib),
            Self::Run => Some(LogLevel::Debug),
        }
    }

    /// History size per module; `None` is unbounded
    pub fn max_logs(&self) -> Option<usize> {
        match self {
            Self::Prod => Some(0),
            Self::Dev => None,
            Self::Lib => Some(10),
            Self::Run => Some(20),
            Self::Test => Some(5),
        }
    }
}

/// Logging sink consumed by every engine component
pub trait LogSink: Send + Sync {
    fn log(&self, module: &str, message: &str, level: LogLevel);
}

/// A stored log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDetail {
    pub module: String,
    pub message: String,
    pub level: LogLevel,
    /// Milliseconds since the manager was created
    pub elapsed_ms: u128,
}

impl fmt::Display for LogDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:06}| {} [{}]:{}",
            self.elapsed_ms, self.level, self.module, self.message
        )
    }
}

/// Default sink: forwards to `tracing` and keeps a per-module history
#[derive(Debug)]
pub struct LogManager {
    mode: LogMode,
    max_logs: Option<usize>,
    started: Instant,
    store: Mutex<HashMap<String, VecDeque<LogDetail>>>,
}

impl LogManager {
    pub fn new(mode: LogMode) -> Self {
        Self {
            mode,
            max_logs: mode.max_logs(),
            started: Instant::now(),
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the mode's history size
    pub fn with_max_logs(mut self, max_logs: Option<usize>) -> Self {
        self.max_logs = max_logs;
        self
    }

    pub fn mode(&self) -> LogMode {
        self.mode
    }

    /// Stored history for one module, oldest first
    pub fn history(&self, module: &str) -> Vec<LogDetail> {
        self.store
            .lock()
            .map(|store| {
                store
                    .get(module)
                    .map(|entries| entries.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn emit(module: &str, message: &str, level: LogLevel) {
        match level {
            LogLevel::Crit | LogLevel::Error => tracing::error!(module = module, "{}", message),
            LogLevel::Warn => tracing::warn!(module = module, "{}", message),
            LogLevel::Lib => tracing::info!(module = module, "{}", message),
            LogLevel::Debug => tracing::debug!(module = module, "{}", message),
            LogLevel::Trace => tracing::trace!(module = module, "{}", message),
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(LogMode::default())
    }
}

impl LogSink for LogManager {
    fn log(&self, module: &str, message: &str, level: LogLevel) {
        if message.is_empty() {
            return;
        }
        if self.mode.emit_level().is_some_and(|max| level <= max) {
            Self::emit(module, message, level);
        }

        let Some(store_level) = self.mode.store_level() else {
            return;
        };
        if level > store_level || self.max_logs == Some(0) {
            return;
        }
        let Ok(mut store) = self.store.lock() else {
            return;
        };
        let entries = store.entry(module.to_string()).or_default();
        entries.push_back(LogDetail {
            module: module.to_string(),
            message: message.to_string(),
            level,
            elapsed_ms: self.started.elapsed().as_millis(),
        });
        if let Some(max) = self.max_logs {
            while entries.len() > max {
                entries.pop_front();
            }
        }
    }
}
