//! Items: typed field definitions attached to entities

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdjError};
use crate::limiter::Limiter;
use crate::patterns::{is_key, is_reserved, is_type_name};
use crate::validators::{Validator, ValidatorRegistry};
use crate::SdId;

/// Where a built entity or item came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Base items and graph zero
    System,
    /// Merged in from the named lexicon
    Lexicon(String),
    /// Declared by the description itself
    Local,
}

impl Origin {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Item as it appears in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemDoc {
    #[serde(rename = "sdId")]
    pub id: SdId,
    #[serde(rename = "sdKey")]
    pub key: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<Limiter>,
}

impl ItemDoc {
    pub fn new(id: SdId, key: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            type_name: type_name.into(),
            limiter: None,
        }
    }

    pub fn with_limiter(mut self, limiter: Limiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// The two system items every entity owns: `sdId` (0) and `sdKey` (1)
    pub fn base_items() -> Vec<ItemDoc> {
        vec![
            ItemDoc::new(0, "sdId", "sdid").with_limiter(Limiter::SystemRequired),
            ItemDoc::new(1, "sdKey", "sdkey").with_limiter(Limiter::SystemRequired),
        ]
    }

    pub fn is_system(&self) -> bool {
        self.id <= 1 || self.key == "sdId" || self.key == "sdKey"
    }

    /// Checks key and type patterns and the system item slots
    pub fn verify(&self) -> Result<()> {
        let subject = format!("item '{}'", self.key);
        if !is_key(&self.key) {
            return Err(SdjError::Pattern {
                subject,
                pattern: "key",
                value: self.key.clone(),
            });
        }
        if self.id > 1 && is_reserved(&self.key) {
            return Err(SdjError::malformed(subject, "key is reserved"));
        }
        if !is_type_name(&self.type_name) {
            return Err(SdjError::Pattern {
                subject,
                pattern: "type name",
                value: self.type_name.clone(),
            });
        }
        let system_slot = match self.id {
            0 => Some(("sdId", "sdid")),
            1 => Some(("sdKey", "sdkey")),
            _ => None,
        };
        if let Some((key, type_name)) = system_slot {
            if self.key != key || self.type_name != type_name {
                return Err(SdjError::malformed(
                    subject,
                    format!("sdId {} is reserved for '{}' of type '{}'", self.id, key, type_name),
                ));
            }
        }
        Ok(())
    }
}

/// Built item bound to its validator
#[derive(Debug, Clone)]
pub struct Item {
    id: SdId,
    key: String,
    type_name: String,
    limiter: Option<Limiter>,
    origin: Origin,
    validator: Validator,
}

impl Item {
    pub(crate) fn build(doc: ItemDoc, origin: Origin, registry: &ValidatorRegistry) -> Self {
        let validator = registry.resolve(&doc.type_name);
        Self {
            id: doc.id,
            key: doc.key,
            type_name: doc.type_name,
            limiter: doc.limiter,
            origin,
            validator,
        }
    }

    pub fn id(&self) -> SdId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn limiter(&self) -> Limiter {
        self.limiter.unwrap_or_default()
    }

    pub fn is_required(&self) -> bool {
        self.limiter().is_required()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn to_doc(&self) -> ItemDoc {
        ItemDoc {
            id: self.id,
            key: self.key.clone(),
            type_name: self.type_name.clone(),
            limiter: self.limiter,
        }
    }
}

/// Item slot in an unlocked description: either carried over from a build or newly added
#[derive(Debug, Clone)]
pub enum ItemNode {
    Built(Item),
    Raw(ItemDoc),
}

impl ItemNode {
    pub fn id(&self) -> SdId {
        match self {
            Self::Built(item) => item.id(),
            Self::Raw(doc) => doc.id,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Built(item) => item.key(),
            Self::Raw(doc) => &doc.key,
        }
    }

    pub fn to_doc(&self) -> ItemDoc {
        match self {
            Self::Built(item) => item.to_doc(),
            Self::Raw(doc) => doc.clone(),
        }
    }
}

impl From<ItemDoc> for ItemNode {
    fn from(doc: ItemDoc) -> Self {
        Self::Raw(doc)
    }
}
