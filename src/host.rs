//! Host context
//!
//! A [`Host`] owns everything shared between descriptions: the lexicon
//! manager (and with it the validator registry), the logging sink, the
//! id/time stamp, the description registry and the library hook. It is
//! passed by reference into every constructor.
//!
//! Processes that want a single global host use [`HostCell`], which refuses a
//! second initialization.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::config::SdjConfig;
use crate::description::{Description, DescriptionDoc};
use crate::error::{Result, SdjError};
use crate::info::{Info, InfoStamp, SystemStamp};
use crate::lexicon::{Lexicon, LexiconManager};
use crate::log::{LogLevel, LogManager, LogMode, LogSink};

const LOG_MODULE: &str = "host";

// =============================================================================
// Library hook
// =============================================================================

/// Persistence hook for built descriptions. The engine never performs I/O
/// itself; it only hands descriptions to the library.
pub trait DescriptionLibrary: Send + Sync {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn get_by_name(&self, name: &str) -> Option<DescriptionDoc>;

    fn store(&self, doc: &DescriptionDoc) -> Result<()>;

    fn remove(&self, name: &str) -> bool;

    fn list(&self) -> Vec<String>;
}

/// Library that keeps nothing
#[derive(Debug, Default)]
pub struct NoLibrary;

impl DescriptionLibrary for NoLibrary {
    fn get_by_name(&self, _name: &str) -> Option<DescriptionDoc> {
        None
    }

    fn store(&self, _doc: &DescriptionDoc) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _name: &str) -> bool {
        false
    }

    fn list(&self) -> Vec<String> {
        Vec::new()
    }
}

/// In-process library keyed by description name
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    docs: Mutex<BTreeMap<String, DescriptionDoc>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DescriptionLibrary for MemoryLibrary {
    fn get_by_name(&self, name: &str) -> Option<DescriptionDoc> {
        self.docs.lock().ok()?.get(name).cloned()
    }

    fn store(&self, doc: &DescriptionDoc) -> Result<()> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| SdjError::malformed("library", "store lock poisoned"))?;
        docs.insert(doc.info.name.clone(), doc.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> bool {
        self.docs
            .lock()
            .map(|mut docs| docs.remove(name).is_some())
            .unwrap_or(false)
    }

    fn list(&self) -> Vec<String> {
        self.docs
            .lock()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Options
// =============================================================================

/// Everything a host is built from
#[derive(Default)]
pub struct HostOptions {
    pub config: SdjConfig,
    pub logs: Option<Arc<dyn LogSink>>,
    pub stamp: Option<Arc<dyn InfoStamp>>,
    pub library: Option<Box<dyn DescriptionLibrary>>,
    pub lexicons: Vec<Lexicon>,
}

impl HostOptions {
    pub fn with_config(mut self, config: SdjConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_log_mode(mut self, mode: LogMode) -> Self {
        self.config.logging.mode = mode;
        self
    }

    /// Replaces the default [`LogManager`]
    pub fn with_logs(mut self, logs: Arc<dyn LogSink>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn with_stamp(mut self, stamp: Arc<dyn InfoStamp>) -> Self {
        self.stamp = Some(stamp);
        self
    }

    pub fn with_library(mut self, library: Box<dyn DescriptionLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Lexicons are added in order
    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicons.push(lexicon);
        self
    }
}

// =============================================================================
// Host
// =============================================================================

pub struct Host {
    config: SdjConfig,
    logs: Arc<dyn LogSink>,
    stamp: Arc<dyn InfoStamp>,
    lexicons: LexiconManager,
    library: Box<dyn DescriptionLibrary>,
    descriptions: Mutex<Vec<Info>>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("lexicons", &self.lexicons.names().collect::<Vec<_>>())
            .field("descriptions", &self.descriptions())
            .finish()
    }
}

impl Host {
    pub fn new(options: HostOptions) -> Result<Self> {
        let HostOptions {
            config,
            logs,
            stamp,
            library,
            lexicons,
        } = options;

        let logs = logs.unwrap_or_else(|| {
            Arc::new(LogManager::new(config.logging.mode).with_max_logs(config.max_logs()))
        });
        let mut host = Self {
            lexicons: LexiconManager::new(logs.clone()),
            logs,
            stamp: stamp.unwrap_or_else(|| Arc::new(SystemStamp)),
            library: library.unwrap_or_else(|| Box::new(NoLibrary)),
            descriptions: Mutex::new(Vec::new()),
            config,
        };

        if host.config.logging.mode != LogMode::Prod {
            host.logs.log(
                LOG_MODULE,
                &format!("log mode: {:?}", host.config.logging.mode),
                LogLevel::Lib,
            );
        }
        for lexicon in lexicons {
            host.add_lexicon(lexicon)?;
        }
        host.library.init()?;
        Ok(host)
    }

    pub fn config(&self) -> &SdjConfig {
        &self.config
    }

    pub fn logs(&self) -> &Arc<dyn LogSink> {
        &self.logs
    }

    pub fn stamp(&self) -> &dyn InfoStamp {
        self.stamp.as_ref()
    }

    pub fn lexicons(&self) -> &LexiconManager {
        &self.lexicons
    }

    pub fn add_lexicon(&mut self, lexicon: Lexicon) -> Result<()> {
        self.lexicons.add_lexicon(lexicon)
    }

    /// Default validation mode for documents
    pub fn strict(&self) -> bool {
        self.config.validation.strict
    }

    pub fn library(&self) -> &dyn DescriptionLibrary {
        self.library.as_ref()
    }

    /// Infos of every registered description, in build order
    pub fn descriptions(&self) -> Vec<Info> {
        self.descriptions
            .lock()
            .map(|registered| registered.clone())
            .unwrap_or_default()
    }

    pub fn description_by_name(&self, name: &str) -> Option<Info> {
        let found = self
            .descriptions()
            .into_iter()
            .find(|info| info.name == name);
        if found.is_none() {
            self.logs.log(
                LOG_MODULE,
                &format!("description {} not found", name),
                LogLevel::Error,
            );
        }
        found
    }

    /// Checks a new description against the registry.
    ///
    /// Same name and id is a duplicate; same name with another id is renamed
    /// `<name>_alt` and restamped.
    pub(crate) fn admit_description(&self, info: &Info) -> Result<Info> {
        let registered = self.descriptions();
        let Some(existing) = registered.iter().find(|known| known.name == info.name) else {
            return Ok(info.clone());
        };
        if existing.uniq_id == info.uniq_id {
            return Err(SdjError::DescriptionExists {
                name: info.name.clone(),
                uniq_id: info.uniq_id.clone(),
            });
        }

        let renamed = Info::new(format!("{}_alt", info.name), self.stamp());
        self.logs.log(
            LOG_MODULE,
            &format!(
                "description '{}' exists with another uniqId; renamed '{}'",
                info.name, renamed.name
            ),
            LogLevel::Warn,
        );
        if registered.iter().any(|known| known.name == renamed.name) {
            return Err(SdjError::DescriptionExists {
                name: renamed.name,
                uniq_id: renamed.uniq_id,
            });
        }
        Ok(renamed)
    }

    pub(crate) fn register_description(&self, description: &Description) -> Result<()> {
        self.library.store(&description.to_doc())?;
        let mut registered = self
            .descriptions
            .lock()
            .map_err(|_| SdjError::malformed("host", "description registry lock poisoned"))?;
        registered.push(description.info().clone());
        Ok(())
    }
}

// =============================================================================
// Process-wide host
// =============================================================================

/// Initialize-once slot for a process-wide host.
///
/// ```ignore
/// static HOST: HostCell = HostCell::new();
/// let host = HOST.init(HostOptions::default())?;
/// ```
pub struct HostCell(OnceLock<Host>);

impl HostCell {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Builds the host; a second call fails
    pub fn init(&self, options: HostOptions) -> Result<&Host> {
        if self.0.get().is_some() {
            return Err(SdjError::AlreadyInitialized);
        }
        let host = Host::new(options)?;
        self.0.set(host).map_err(|_| SdjError::AlreadyInitialized)?;
        self.0.get().ok_or(SdjError::AlreadyInitialized)
    }

    /// The host, locked to defaults when nothing initialized it first
    pub fn get(&self) -> Result<&Host> {
        if let Some(host) = self.0.get() {
            return Ok(host);
        }
        let host = Host::new(HostOptions::default())?;
        // A racing initializer wins; its host is returned below.
        let _ = self.0.set(host);
        self.0.get().ok_or(SdjError::AlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.0.get().is_some()
    }
}

impl Default for HostCell {
    fn default() -> Self {
        Self::new()
    }
}
