//! Naming patterns, reserved words and fixed identifiers
//!
//! Every `sdKey`, type name, lexicon name and `uniqId` in an SDJ document is
//! checked against one of the patterns below.

use regex::Regex;
use std::sync::LazyLock;

/// Known `$id` values for an SDJ document. The first is emitted on output.
pub const SCHEMA_IDS: [&str; 5] = [
    "http://willrudolph.com/schemas/sdj-schema.json",
    "../node_modules/sdj/json/sdj-schema",
    "./node_modules/sdj/json/sdj-schema",
    "../src/schemas/sdj-schema.json",
    "./src/schemas/sdj-schema.json",
];

/// Key of the synthetic root entity
pub const GRAPH_ID: &str = "sdGraphZero";

/// Key prefix for children of a sequentially indexed entity
pub const SD_INDEX: &str = "sdIndex";

/// Names that can never be used as item keys or data field keys
pub const RESERVED_WORDS: [&str; 6] = ["sdId", "sdKey", "sdChildren", "sdInfo", "$id", "sdItems"];

pub const DEFAULT_LANG: &str = "en";

pub const EMPTY_UUID: &str = "000000-00000-0000-0000000";
pub const EMPTY_COMPACT_UUID: &str = "00000-0000";

/// Info names must be longer than this
pub const MIN_NAME_CHARS: usize = 3;

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9\-_$]{2,30}[A-Za-z0-9_$]$").expect("key pattern")
});

static TYPE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]{2,22}[a-z0-9]$").expect("type name pattern"));

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]{6}-[a-zA-Z0-9]{5}-[a-zA-Z0-9]{4}-[a-zA-Z0-9]{7}$")
        .expect("uuid pattern")
});

static COMPACT_UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]{5}-[a-zA-Z0-9]{4}$").expect("compact uuid pattern")
});

/// `sdKey` pattern: 4-32 chars of letters, digits, `_`, `$` and inner `-`
pub fn is_key(value: &str) -> bool {
    KEY_RE.is_match(value)
}

/// Type and lexicon name pattern: lowercase, 4-24 chars
pub fn is_type_name(value: &str) -> bool {
    TYPE_NAME_RE.is_match(value)
}

pub fn is_uuid(value: &str) -> bool {
    UUID_RE.is_match(value)
}

pub fn is_compact_uuid(value: &str) -> bool {
    COMPACT_UUID_RE.is_match(value)
}

pub fn is_reserved(value: &str) -> bool {
    RESERVED_WORDS.contains(&value)
}

pub fn is_schema_id(value: &str) -> bool {
    SCHEMA_IDS.contains(&value)
}

/// Key expected at `index` under a sequentially indexed entity
pub fn index_key(index: usize) -> String {
    format!("{}{}", SD_INDEX, index)
}
