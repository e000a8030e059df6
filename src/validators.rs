//! Validator Registry
//!
//! Maps an item type name to an `{input, valid, output}` triple. The registry
//! is seeded with the built-in primitive, array and object types plus the two
//! system types (`sdid`, `sdkey`). Lexicons may add their own.
//!
//! Built-in names are protected: a type name that is a near miss of a
//! built-in (see [`canonical_name`]) is rewritten to the built-in on items
//! and refused outright when registered as a new validator.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SdjError};
use crate::log::{LogLevel, LogSink};
use crate::patterns::{is_key, is_type_name};

const LOG_MODULE: &str = "validators";

pub const DEF_MAX_STR_LEN: usize = 64;
pub const STR_LEN_LONG: usize = 300;
pub const STR_LEN_SHORT: usize = 32;
/// Arrays and objects must hold fewer entries than this
pub const MAX_OBJ_ARY_LEN: usize = 1000;

/// Transform applied to a value before it is validated and stored.
/// `None` means "unset".
pub type InputFn = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;
pub type ValidFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
/// Transform applied to a stored value when it is read back
pub type OutputFn = Arc<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

/// A named validation triple
#[derive(Clone)]
pub struct Validator {
    type_name: String,
    input: Option<InputFn>,
    valid: ValidFn,
    output: Option<OutputFn>,
}

impl Validator {
    pub fn new(
        type_name: impl Into<String>,
        valid: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            input: None,
            valid: Arc::new(valid),
            output: None,
        }
    }

    pub fn with_input(
        mut self,
        input: impl Fn(Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.input = Some(Arc::new(input));
        self
    }

    pub fn with_output(
        mut self,
        output: impl Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.output = Some(Arc::new(output));
        self
    }

    /// Validator that rejects everything; returned for unknown type names
    pub fn always_fail(type_name: impl Into<String>) -> Self {
        Self::new(type_name, |_| false)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Runs the input transform. Without one, `null` unsets and anything else passes through.
    pub fn input(&self, value: Value) -> Option<Value> {
        match &self.input {
            Some(input) => input(value),
            None if value.is_null() => None,
            None => Some(value),
        }
    }

    pub fn valid(&self, value: &Value) -> bool {
        (self.valid)(value)
    }

    pub fn output(&self, value: Option<&Value>) -> Option<Value> {
        match &self.output {
            Some(output) => output(value),
            None => value.cloned(),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("type_name", &self.type_name)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .finish()
    }
}

// =============================================================================
// Built-in Types
// =============================================================================

struct BuiltinType {
    name: &'static str,
    similar: &'static [&'static str],
    valid: fn(&Value) -> bool,
}

const BUILTIN_TYPES: [BuiltinType; 18] = [
    BuiltinType {
        name: "sdkey",
        similar: &["sd-k", "sd--key", "sd_-key", "sd-_key", "s-d-k", "s-d-key", "sd-ke"],
        valid: valid_sd_key,
    },
    BuiltinType {
        name: "sdid",
        similar: &["sd-id", "sd--id", "sd-_id", "sd_-id", "sd-i", "s-d-id", "s-d_id", "s_d-id"],
        valid: valid_id,
    },
    BuiltinType {
        name: "numb",
        similar: &["number", "num-b", "num-ber"],
        valid: valid_number,
    },
    BuiltinType {
        name: "intg",
        similar: &[
            "intr", "integr", "integ", "integer", "num-int", "int-num", "intnum", "numint",
            "numbint", "intnumb",
        ],
        valid: valid_integer,
    },
    BuiltinType {
        name: "flpt",
        similar: &["flop", "float", "fltpt", "num-flt", "num-float", "floatnum", "fltnum"],
        valid: valid_float,
    },
    BuiltinType {
        name: "bool",
        similar: &["boolean", "bolean", "boolea", "boole", "b-oo", "bo-l"],
        valid: valid_bool,
    },
    BuiltinType {
        name: "strd",
        similar: &["string", "stringdef", "str-def", "string-def"],
        valid: valid_str_default,
    },
    BuiltinType {
        name: "strl",
        similar: &["str-lg", "st-lg", "str-l", "string-lg", "string-l"],
        valid: valid_str_long,
    },
    BuiltinType {
        name: "strs",
        similar: &["str-sh", "st-sm", "str-sm", "str-s", "string-sm", "string-s", "string-sh"],
        valid: valid_str_short,
    },
    BuiltinType {
        name: "date",
        similar: &["date-utc", "dateutc", "utcdate", "utc-date", "u-date", "date-u"],
        valid: valid_number,
    },
    BuiltinType {
        name: "arybool",
        similar: &["ary-bol", "arraybol", "array-bol"],
        valid: |value| valid_array(value, valid_bool),
    },
    BuiltinType {
        name: "arynum",
        similar: &["ary-num", "arraynum", "array-num"],
        valid: |value| valid_array(value, valid_number),
    },
    BuiltinType {
        name: "arystrs",
        similar: &["arystrsht", "arraystr", "array-str", "ary-str-s", "array-str-s"],
        valid: |value| valid_array(value, valid_str_default),
    },
    BuiltinType {
        name: "arystrd",
        similar: &["arystr", "ary-str", "array-def", "arystrdef", "array-str-d"],
        valid: |value| valid_array(value, valid_str_default),
    },
    BuiltinType {
        name: "objstr",
        similar: &["obj-str", "object-str", "objectstr"],
        valid: |value| valid_object(value, valid_str_default),
    },
    BuiltinType {
        name: "objbool",
        similar: &["obj-bool", "object-bool", "objectbool"],
        valid: |value| valid_object(value, valid_bool),
    },
    BuiltinType {
        name: "objnum",
        similar: &["obj-num", "object-num", "objectnum", "obj-number"],
        valid: |value| valid_object(value, valid_number),
    },
    BuiltinType {
        name: "sdindex",
        similar: &["sdjidx", "sd-idx", "sdj-idx", "sd--idx", "sdinx", "sdjindx", "sdjindex"],
        valid: valid_integer,
    },
];

fn valid_sd_key(value: &Value) -> bool {
    value.as_str().is_some_and(is_key)
}

fn valid_number(value: &Value) -> bool {
    value.is_number()
}

fn valid_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => true,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0),
        _ => false,
    }
}

fn valid_float(value: &Value) -> bool {
    value.as_f64().is_some_and(f64::is_finite)
}

/// Booleans only; `"true"` as a string is rejected
fn valid_bool(value: &Value) -> bool {
    value.is_boolean()
}

fn valid_str_len(value: &Value, max: usize) -> bool {
    value.as_str().is_some_and(|s| s.chars().count() < max)
}

fn valid_str_default(value: &Value) -> bool {
    valid_str_len(value, DEF_MAX_STR_LEN)
}

fn valid_str_long(value: &Value) -> bool {
    valid_str_len(value, STR_LEN_LONG)
}

fn valid_str_short(value: &Value) -> bool {
    valid_str_len(value, STR_LEN_SHORT)
}

fn valid_array(value: &Value, element: fn(&Value) -> bool) -> bool {
    let Some(values) = value.as_array() else {
        return false;
    };
    !values.is_empty() && values.len() < MAX_OBJ_ARY_LEN && values.iter().all(element)
}

fn valid_object(value: &Value, element: fn(&Value) -> bool) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    !map.is_empty()
        && map.len() < MAX_OBJ_ARY_LEN
        && map
            .iter()
            .all(|(key, value)| key.chars().count() <= DEF_MAX_STR_LEN && element(value))
}

/// Non-negative integer ids
fn valid_id(value: &Value) -> bool {
    value.as_u64().is_some()
}

/// Names of every built-in type, in registration order
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_TYPES.iter().map(|builtin| builtin.name)
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_TYPES.iter().any(|builtin| builtin.name == name)
}

/// The built-in type `name` is a near miss of, if any.
///
/// Each similar name is also checked with its first `-` turned into `_`.
/// A built-in name maps to nothing.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    if is_builtin(name) {
        return None;
    }
    BUILTIN_TYPES
        .iter()
        .find(|builtin| {
            builtin
                .similar
                .iter()
                .any(|similar| *similar == name || similar.replacen('-', "_", 1) == name)
        })
        .map(|builtin| builtin.name)
}

// =============================================================================
// Registry
// =============================================================================

/// Type name to validator lookup
pub struct ValidatorRegistry {
    validators: HashMap<String, Validator>,
    logs: Arc<dyn LogSink>,
}

impl ValidatorRegistry {
    /// Registry seeded with the built-in types
    pub fn new(logs: Arc<dyn LogSink>) -> Self {
        let validators = BUILTIN_TYPES
            .iter()
            .map(|builtin| {
                let valid = builtin.valid;
                (builtin.name.to_string(), Validator::new(builtin.name, valid))
            })
            .collect();
        Self { validators, logs }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.validators.contains_key(type_name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Checks that `type_name` could be registered without registering it
    pub fn check_new(&self, type_name: &str) -> Result<()> {
        if !is_type_name(type_name) {
            return Err(SdjError::Pattern {
                subject: "validator".to_string(),
                pattern: "type name",
                value: type_name.to_string(),
            });
        }
        if self.contains(type_name) {
            return Err(SdjError::DuplicateValidator(type_name.to_string()));
        }
        if let Some(builtin) = canonical_name(type_name) {
            return Err(SdjError::SimilarValidator {
                name: type_name.to_string(),
                builtin: builtin.to_string(),
            });
        }
        Ok(())
    }

    /// Adds a validator under `type_name`
    pub fn register(&mut self, type_name: &str, validator: Validator) -> Result<()> {
        self.check_new(type_name)?;
        let validator = Validator {
            type_name: type_name.to_string(),
            ..validator
        };
        self.validators.insert(type_name.to_string(), validator);
        self.logs
            .log(LOG_MODULE, &format!("registered validator '{}'", type_name), LogLevel::Debug);
        Ok(())
    }

    /// Rewrites a near-miss type name to its built-in, logging a warning
    pub fn canonicalize(&self, type_name: &str) -> String {
        match canonical_name(type_name) {
            Some(builtin) => {
                self.logs.log(
                    LOG_MODULE,
                    &format!("type '{}' is too similar to '{}', using '{}'", type_name, builtin, builtin),
                    LogLevel::Warn,
                );
                builtin.to_string()
            }
            None => type_name.to_string(),
        }
    }

    /// Looks up a validator; unknown names get an always-fail validator and a warning
    pub fn resolve(&self, type_name: &str) -> Validator {
        if let Some(validator) = self.validators.get(type_name) {
            return validator.clone();
        }

        let message = match self.suggest(type_name) {
            Some(suggestion) => format!(
                "unknown validator '{}' (did you mean '{}'?)",
                type_name, suggestion
            ),
            None => format!("unknown validator '{}'", type_name),
        };
        self.logs.log(LOG_MODULE, &message, LogLevel::Warn);
        Validator::always_fail(type_name)
    }

    /// Closest registered name by fuzzy score
    pub fn suggest(&self, type_name: &str) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        self.validators
            .keys()
            .filter_map(|name| {
                matcher
                    .fuzzy_match(name, type_name)
                    .map(|score| (score, name))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, name)| name.clone())
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.names())
            .finish()
    }
}
