//! SDJ Schema Engine
//!
//! Self-describing JSON: a document embeds its own structural description (a
//! typed entity graph plus item definitions) next to the data that conforms
//! to it.
//!
//! ## Features
//!
//! - **Graph Assembly**: Dense, inheritance-resolved entity/item graphs merged
//!   from a local description and ordered lexicon modules
//! - **Cycle Detection**: `extendIds` cycles rejected via strongly connected components
//! - **Cardinality Limiters**: Required, hidden, one-or-none and sequential-index rules
//! - **Dual-Mode Validation**: Strict fails on the first violation, advisory logs them all
//! - **Path Queries**: `home.page1` / `home/page1` addressing and single-criterion search
//!
//! ## Architecture
//!
//! ```text
//! DocumentDoc (JSON)
//! ├── description ──► LexiconManager::assemble ──► Description { items[], entities[] }
//! │                    (validators, lexicons,         dense by id, refs resolved
//! │                     extend cycles, props)
//! └── data ─────────► DataTree (arena) ──► validate::{data,struct}_violations
//!                                     └──► search::{resolve_by_path, data_by_entity}
//! ```
//!
//! Everything hangs off a [`Host`], which owns the validator registry,
//! lexicons, logging sink, id/time stamp and the description library hook.

pub mod config;
pub mod data;
pub mod description;
pub mod document;
pub mod entity;
pub mod error;
pub mod fingerprint;
pub mod host;
pub mod info;
pub mod item;
pub mod lexicon;
pub mod limiter;
pub mod log;
pub mod patterns;
pub mod search;
pub mod validate;
pub mod validators;

/// Numeric id of an item or entity; also its index in the description
pub type SdId = u32;

pub use config::SdjConfig;
pub use data::{ChildRef, DataDoc, DataNode, DataTree, NodeId};
pub use description::{Description, DescriptionBuilder, DescriptionDoc};
pub use document::{Document, DocumentDoc};
pub use entity::{Entity, EntityDoc, GraphNode, PropValue, SdProps};
pub use error::{Result, SdjError};
pub use fingerprint::Fingerprint;
pub use host::{DescriptionLibrary, Host, HostCell, HostOptions, MemoryLibrary, NoLibrary};
pub use info::{Info, InfoStamp, SystemStamp};
pub use item::{Item, ItemDoc, ItemNode, Origin};
pub use lexicon::{Lexicon, LexiconDoc, LexiconManager};
pub use limiter::Limiter;
pub use log::{LogLevel, LogManager, LogMode, LogSink};
pub use search::{EntitySearch, ItemSearch};
pub use validate::{Violation, ViolationKind, Violations};
pub use validators::{Validator, ValidatorRegistry};
