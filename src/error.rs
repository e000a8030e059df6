//! Error types for the SDJ engine

use thiserror::Error;

use crate::validate::Violation;

/// Result type for SDJ operations
pub type Result<T> = std::result::Result<T, SdjError>;

/// SDJ engine errors
#[derive(Error, Debug)]
pub enum SdjError {
    // === Malformed input ===
    #[error("Malformed {subject}: {reason}")]
    Malformed { subject: String, reason: String },

    #[error("{subject} value '{value}' does not match the {pattern} pattern")]
    Pattern {
        subject: String,
        pattern: &'static str,
        value: String,
    },

    #[error("Unknown schema id: {0}")]
    UnknownSchema(String),

    // === Graph consistency ===
    #[error("{subject}: duplicate key '{key}'")]
    DuplicateKey { subject: String, key: String },

    #[error("{subject}: duplicate id {id}")]
    DuplicateId { subject: String, id: u32 },

    #[error("{subject}: ids are not sequential, expected {expected} found {found}")]
    IdGap {
        subject: String,
        expected: u32,
        found: u32,
    },

    #[error("{subject} references undefined {kind} {id}")]
    DanglingReference {
        subject: String,
        kind: &'static str,
        id: u32,
    },

    #[error("Circular extend reference on entity '{key}'")]
    CircularReference { key: String },

    #[error("Entity '{key}' has no items, no extends and no children")]
    EmptyEntity { key: String },

    // === Validators and lexicons ===
    #[error("Validator '{0}' is already registered")]
    DuplicateValidator(String),

    #[error("Validator '{name}' is too similar to built-in type '{builtin}'")]
    SimilarValidator { name: String, builtin: String },

    #[error("Item '{item}' has no validator for type '{type_name}'")]
    UnknownValidator { item: String, type_name: String },

    #[error("Lexicon '{0}' is not registered")]
    LexiconNotFound(String),

    #[error("Lexicon '{0}' is already registered")]
    DuplicateLexicon(String),

    #[error("Lexicon '{lexicon}' requires '{required}' at position {index}")]
    LexiconOrder {
        lexicon: String,
        required: String,
        index: usize,
    },

    #[error("Lexicon '{0}' graph verification failed")]
    GraphVerify(String),

    #[error("Lexicon '{0}' data verification failed")]
    DataVerify(String),

    // === Data ===
    #[error("Description '{description}' has no entity with sdId {id}")]
    UnknownEntity { description: String, id: u32 },

    #[error("Entity '{entity}' has no item '{key}'")]
    UnknownItem { entity: String, key: String },

    #[error("Item '{0}' is required and cannot be unset")]
    RequiredItem(String),

    #[error("Item '{0}' does not validate on input")]
    InvalidValue(String),

    #[error("Unable to add child with duplicate sdKey '{0}'")]
    DuplicateChild(String),

    #[error("{0}")]
    Validation(Violation),

    // === Lifecycle ===
    #[error("Lock failed: {0}")]
    Lock(String),

    #[error("Description '{name}' with uniqId {uniq_id} is already registered")]
    DescriptionExists { name: String, uniq_id: String },

    #[error("Host is already initialized")]
    AlreadyInitialized,

    // === Ambient ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl SdjError {
    pub(crate) fn malformed(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}
