//! SDJ documents
//!
//! A document is the top-level wire object: a schema `$id`, its own
//! `sdInfo`, the embedded description, and the data tree built against it.
//! [`Document`] also carries the description's lock lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::{check_unique_keys, DataDoc, DataTree, NodeId};
use crate::description::{Description, DescriptionBuilder, DescriptionDoc};
use crate::entity::Entity;
use crate::error::{Result, SdjError};
use crate::host::Host;
use crate::info::Info;
use crate::item::Item;
use crate::log::LogLevel;
use crate::patterns::is_schema_id;
use crate::search::{self, EntitySearch, ItemSearch};

const LOG_MODULE: &str = "document";

/// Document as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentDoc {
    #[serde(rename = "$id")]
    pub schema_id: String,
    pub description: DescriptionDoc,
    #[serde(rename = "sdInfo")]
    pub info: Info,
    #[serde(default)]
    pub data: Vec<DataDoc>,
}

impl DocumentDoc {
    pub fn verify(&self) -> Result<()> {
        if !is_schema_id(&self.schema_id) {
            return Err(SdjError::UnknownSchema(self.schema_id.clone()));
        }
        if !self.info.is_blank() {
            self.info.verify("document", false)?;
        }
        check_unique_keys(self.data.iter().map(|doc| doc.key.as_str()))
    }

    /// Wraps a bare description with a blank info and no data
    pub fn wrap(description: DescriptionDoc, host: &Host) -> Self {
        let name = format!(
            "{}-{}",
            description.info.name,
            host.stamp().unique_id(true)
        );
        Self {
            schema_id: host.config().validation.schema_id.clone(),
            description,
            info: Info::blank(name, false),
            data: Vec::new(),
        }
    }

    /// Full documents carry `data`; anything with `items` or `graph` and no
    /// `data` is taken as a bare description.
    pub fn from_json(value: Value, host: &Host) -> Result<Self> {
        let Value::Object(map) = &value else {
            return Err(SdjError::malformed("document", "input JSON is not an object"));
        };
        let bare = !map.contains_key("data")
            && (map.contains_key("items") || map.contains_key("graph"));
        if bare {
            let description: DescriptionDoc = serde_json::from_value(value)?;
            return Ok(Self::wrap(description, host));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// A built document bound to its host
pub struct Document<'h> {
    host: &'h Host,
    info: Info,
    description: Description,
    editing: Option<DescriptionBuilder>,
    tree: DataTree,
    strict: bool,
}

impl<'h> Document<'h> {
    /// Builds the description and then the data tree, in the host's
    /// validation mode. Every listed lexicon's `dataVerify` must accept the
    /// result; advisory hosts open a rejected or invalid document unlocked.
    pub fn from_doc(doc: DocumentDoc, host: &'h Host) -> Result<Self> {
        doc.verify()?;
        let DocumentDoc {
            description, info, data, ..
        } = doc;
        let info = if info.is_blank() {
            info.restamp(host.stamp())
        } else {
            info
        };

        let strict = host.strict();
        let description = Description::build(description, host)?;
        let tree = DataTree::build(host, &description, data, strict)?;
        let verified = match host.lexicons().data_verify(&description, &tree) {
            Err(err) if strict => return Err(err),
            verified => verified,
        };

        let mut document = Self {
            host,
            info,
            description,
            editing: None,
            tree,
            strict,
        };
        document.log(
            &format!("built {} data nodes", document.tree.len()),
            LogLevel::Debug,
        );
        // Advisory documents that fail validation open unlocked
        if !strict {
            if let Err(err) = &verified {
                document.log(&err.to_string(), LogLevel::Warn);
            }
            if verified.is_err() || !document.is_valid() {
                document.editing = Some(document.description.unlock());
                document.log("data failed validation; opened unlocked", LogLevel::Warn);
            }
        }
        Ok(document)
    }

    pub fn from_json(value: Value, host: &'h Host) -> Result<Self> {
        Self::from_doc(DocumentDoc::from_json(value, host)?, host)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str, host: &'h Host) -> Result<Self> {
        Self::from_json(serde_json::from_str(json)?, host)
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    /// The last locked description
    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn tree(&self) -> &DataTree {
        &self.tree
    }

    pub fn is_locked(&self) -> bool {
        self.editing.is_none()
    }

    /// Editable copy while unlocked
    pub fn builder_mut(&mut self) -> Option<&mut DescriptionBuilder> {
        self.editing.as_mut()
    }

    /// `lock(false)` hands out an editable copy; `lock(true)` rebuilds from
    /// it and revalidates all data. Returns whether the state changed.
    pub fn lock(&mut self, locked: bool) -> Result<bool> {
        if locked == self.is_locked() {
            self.log(
                &format!("lock({}) matches current state; nothing changed", locked),
                LogLevel::Lib,
            );
            return Ok(false);
        }
        if !locked {
            self.editing = Some(self.description.unlock());
            self.log("description unlocked", LogLevel::Debug);
            return Ok(true);
        }

        let Some(editing) = self.editing.as_ref() else {
            return Ok(false);
        };
        let (description, tree) = self
            .relock(editing)
            .map_err(|err| SdjError::Lock(err.to_string()))?;
        self.description = description;
        self.tree = tree;
        self.editing = None;
        self.log("description locked", LogLevel::Debug);
        Ok(true)
    }

    fn relock(&self, editing: &DescriptionBuilder) -> Result<(Description, DataTree)> {
        let mut builder = editing.clone();
        builder.info.touch(self.host.stamp().now());
        let description = builder.build(self.host)?;

        // Strict rebuild: every node is rechecked against the new description
        let tree = DataTree::build(self.host, &description, self.tree.to_docs(), true)?;
        self.host.lexicons().data_verify(&description, &tree)?;
        Ok((description, tree))
    }

    /// Value and structure check of the whole tree; logs every violation
    pub fn is_valid(&self) -> bool {
        self.tree
            .roots()
            .iter()
            .all(|root| self.tree.is_valid(&self.description, *root))
    }

    pub fn data_by_path(&self, path: &str) -> Option<NodeId> {
        search::resolve_by_path(&self.description, &self.tree, path)
    }

    pub fn data_by_entity(&self, query: &EntitySearch, path: Option<&str>) -> Vec<NodeId> {
        search::data_by_entity(&self.description, &self.tree, query, path)
    }

    pub fn data_by_item(&self, query: &ItemSearch, path: Option<&str>) -> Vec<NodeId> {
        search::data_by_item(&self.description, &self.tree, query, path)
    }

    pub fn entities(&self, query: &EntitySearch) -> Vec<&Entity> {
        self.description.search_entities(query)
    }

    pub fn items(&self, query: &ItemSearch) -> Vec<&Item> {
        self.description.search_items(query)
    }

    pub fn field(&self, node: NodeId, key: &str) -> Option<Value> {
        self.tree.field(&self.description, node, key)
    }

    pub fn set_field(&mut self, node: NodeId, key: &str, value: Value) -> Result<()> {
        self.tree
            .set_field(self.host, &self.description, node, key, value)?;
        self.info.touch(self.host.stamp().now());
        Ok(())
    }

    pub fn add_root(&mut self, doc: DataDoc) -> Result<NodeId> {
        let id = self
            .tree
            .add_root(self.host, &self.description, doc, self.strict)?;
        self.info.touch(self.host.stamp().now());
        Ok(id)
    }

    pub fn add_child(&mut self, parent: NodeId, doc: DataDoc) -> Result<NodeId> {
        let id = self
            .tree
            .add_child(self.host, &self.description, parent, doc, self.strict)?;
        self.info.touch(self.host.stamp().now());
        Ok(id)
    }

    pub fn to_doc(&self) -> DocumentDoc {
        DocumentDoc {
            schema_id: self.host.config().validation.schema_id.clone(),
            description: self.description.to_doc(),
            info: self.info.clone(),
            data: self.tree.to_docs(),
        }
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.to_doc())?)
    }

    fn log(&self, message: &str, level: LogLevel) {
        self.host
            .logs()
            .log(LOG_MODULE, &format!("{}: {}", self.info.name, message), level);
    }
}
