//! Data Tree
//!
//! Instance data bound to description entities. Nodes live in an arena and
//! refer to each other by [`NodeId`]; a node's owner entity is referenced by
//! `sdId` and resolved against the [`Description`] passed to each operation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::description::Description;
use crate::error::{Result, SdjError};
use crate::host::Host;
use crate::info::Info;
use crate::patterns::{is_key, is_reserved};
use crate::validate::{
    children_violations, data_violations, parent_violations, valid_data, valid_struct, Violation,
    Violations, CHILD_NOT_ALLOWED, UNKNOWN_CHILD,
};
use crate::SdId;

/// Data node as it appears in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDoc {
    #[serde(rename = "sdId")]
    pub id: SdId,
    #[serde(rename = "sdKey")]
    pub key: String,
    #[serde(rename = "sdInfo", default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(rename = "sdChildren", default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DataDoc>>,
}

impl DataDoc {
    pub fn new(id: SdId, key: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            info: None,
            fields: Map::new(),
            children: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: DataDoc) -> Self {
        self.children.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn with_info(mut self, info: Info) -> Self {
        self.info = Some(info);
        self
    }

    /// Checks this node's own keys, values and metadata, and that child keys are unique
    pub fn verify(&self) -> Result<()> {
        let subject = format!("data '{}'", self.key);
        if !is_key(&self.key) {
            return Err(SdjError::Pattern {
                subject,
                pattern: "key",
                value: self.key.clone(),
            });
        }
        for (key, value) in &self.fields {
            if is_reserved(key) {
                return Err(SdjError::malformed(subject, format!("field '{}' is reserved", key)));
            }
            if !is_key(key) {
                return Err(SdjError::Pattern {
                    subject,
                    pattern: "key",
                    value: key.clone(),
                });
            }
            if value.is_null() {
                return Err(SdjError::malformed(subject, format!("field '{}' is null", key)));
            }
        }
        if let Some(info) = &self.info {
            info.verify(&subject, true)?;
        }
        if let Some(children) = &self.children {
            check_unique_keys(children.iter().map(|child| child.key.as_str()))?;
        }
        Ok(())
    }
}

/// Fails on the first repeated key
pub(crate) fn check_unique_keys<'a>(keys: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(SdjError::DuplicateChild(key.to_string()));
        }
    }
    Ok(())
}

/// Arena index of a data node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Child selector: position or key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRef<'a> {
    Index(usize),
    Key(&'a str),
}

impl From<usize> for ChildRef<'_> {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl<'a> From<&'a str> for ChildRef<'a> {
    fn from(key: &'a str) -> Self {
        Self::Key(key)
    }
}

/// A node in the arena
#[derive(Debug, Clone, PartialEq)]
pub struct DataNode {
    entity_id: SdId,
    key: String,
    fields: Map<String, Value>,
    info: Option<Info>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    index: usize,
}

impl DataNode {
    pub fn entity_id(&self) -> SdId {
        self.entity_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stored values, without `output` transforms
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn info(&self) -> Option<&Info> {
        self.info.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Position among its siblings
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Instance data for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTree {
    nodes: Vec<DataNode>,
    roots: Vec<NodeId>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every top-level doc in order
    pub fn build(
        host: &Host,
        description: &Description,
        docs: Vec<DataDoc>,
        strict: bool,
    ) -> Result<Self> {
        let mut tree = Self::new();
        for doc in docs {
            tree.add_root(host, description, doc, strict)?;
        }
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&DataNode> {
        self.nodes.get(id.0)
    }

    fn node_or_err(&self, id: NodeId) -> Result<&DataNode> {
        self.node(id)
            .ok_or_else(|| SdjError::malformed("data", format!("no node at index {}", id.0)))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .into_iter()
            .flat_map(|node| node.children.iter().copied())
    }

    /// `id` and everything below it, pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.node(next) else {
                continue;
            };
            found.push(next);
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    /// Every node, pre-order from each root in turn
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().flat_map(|root| self.descendants(*root))
    }

    pub fn root(&self, key: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.node(*id).is_some_and(|node| node.key == key))
    }

    pub fn child<'a>(&self, parent: NodeId, child: impl Into<ChildRef<'a>>) -> Option<NodeId> {
        let node = self.node(parent)?;
        match child.into() {
            ChildRef::Index(index) => node.children.get(index).copied(),
            ChildRef::Key(key) => node
                .children
                .iter()
                .copied()
                .find(|id| self.node(*id).is_some_and(|child| child.key == key)),
        }
    }

    /// Ancestor keys joined with `/`
    pub fn path(&self, id: NodeId) -> String {
        let mut keys = Vec::new();
        let mut next = Some(id);
        while let Some(node) = next.and_then(|id| self.node(id)) {
            keys.push(node.key.as_str());
            next = node.parent;
        }
        keys.reverse();
        keys.join("/")
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.node(id).map(DataNode::depth)
    }

    pub fn add_root(
        &mut self,
        host: &Host,
        description: &Description,
        doc: DataDoc,
        strict: bool,
    ) -> Result<NodeId> {
        if self.root(&doc.key).is_some() {
            return Err(SdjError::DuplicateChild(doc.key));
        }
        self.insert_checked(host, description, None, doc, strict)
    }

    /// Adds `doc` and its subtree under `parent`
    pub fn add_child(
        &mut self,
        host: &Host,
        description: &Description,
        parent: NodeId,
        doc: DataDoc,
        strict: bool,
    ) -> Result<NodeId> {
        let parent_node = self.node_or_err(parent)?;
        if self.child(parent, doc.key.as_str()).is_some() {
            return Err(SdjError::DuplicateChild(doc.key));
        }
        let parent_entity = description.entity(parent_node.entity_id).ok_or_else(|| {
            SdjError::UnknownEntity {
                description: description.name().to_string(),
                id: parent_node.entity_id,
            }
        })?;
        if !parent_entity.allows_child(doc.id) {
            return Err(SdjError::Validation(Violation::structure(
                parent_entity.key(),
                &parent_node.key,
                CHILD_NOT_ALLOWED,
                doc.id.to_string(),
            )));
        }
        self.insert_checked(host, description, Some(parent), doc, strict)
    }

    /// Inserts a subtree, leaving the tree untouched when it fails
    fn insert_checked(
        &mut self,
        host: &Host,
        description: &Description,
        parent: Option<NodeId>,
        doc: DataDoc,
        strict: bool,
    ) -> Result<NodeId> {
        let mark = self.nodes.len();
        let inserted = self.insert(host, description, parent, doc, strict);
        if inserted.is_err() {
            self.nodes.truncate(mark);
            self.roots.retain(|id| id.0 < mark);
            for node in &mut self.nodes {
                node.children.retain(|id| id.0 < mark);
            }
        }
        inserted
    }

    fn insert(
        &mut self,
        host: &Host,
        description: &Description,
        parent: Option<NodeId>,
        doc: DataDoc,
        strict: bool,
    ) -> Result<NodeId> {
        // Advisory builds keep nodes of unknown entities
        let entity = description.entity(doc.id);
        if entity.is_none() && strict {
            return Err(SdjError::UnknownEntity {
                description: description.name().to_string(),
                id: doc.id,
            });
        }
        doc.verify()?;

        let parent_entity = parent
            .and_then(|id| self.node(id))
            .and_then(|node| description.entity(node.entity_id));
        match entity {
            Some(entity) => {
                parent_violations(entity, parent_entity).into_result(strict, description.logs())?;
            }
            None => {
                let mut unknown = Violations::new();
                unknown.push(Violation::structure(
                    parent_entity.map(|parent| parent.key()).unwrap_or_default(),
                    &doc.key,
                    UNKNOWN_CHILD,
                    doc.id.to_string(),
                ));
                unknown.into_result(false, description.logs())?;
            }
        }

        let info = match doc.info {
            Some(info) if info.is_blank() => Some(Info::compact(info.name, host.stamp())),
            Some(info) => Some(info),
            None if entity.is_some_and(|entity| entity.data_info()) || description.data_info() => {
                Some(Info::compact(doc.key.clone(), host.stamp()))
            }
            None => None,
        };
        let (depth, index) = match parent.and_then(|id| self.node(id)) {
            Some(parent) => (parent.depth + 1, parent.children.len()),
            None => (0, self.roots.len()),
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(DataNode {
            entity_id: doc.id,
            key: doc.key,
            fields: doc.fields,
            info,
            parent,
            children: Vec::new(),
            depth,
            index,
        });
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }

        for child in doc.children.unwrap_or_default() {
            self.insert(host, description, Some(id), child, strict)?;
        }

        let Some(entity) = entity else {
            return Ok(id);
        };
        let node = &self.nodes[id.0];
        data_violations(description, entity, &node.key, &node.fields)
            .into_result(strict, description.logs())?;
        let children: Vec<(SdId, &str)> = node
            .children
            .iter()
            .map(|child| &self.nodes[child.0])
            .map(|child| (child.entity_id, child.key.as_str()))
            .collect();
        children_violations(description, entity, &node.key, &children)
            .into_result(strict, description.logs())?;
        Ok(id)
    }

    /// Sets a field through its item's `input` and `valid`, then bumps metadata
    pub fn set_field(
        &mut self,
        host: &Host,
        description: &Description,
        id: NodeId,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let node = self.node_or_err(id)?;
        let entity = description.entity(node.entity_id).ok_or_else(|| SdjError::UnknownEntity {
            description: description.name().to_string(),
            id: node.entity_id,
        })?;
        let unknown = || SdjError::UnknownItem {
            entity: entity.key().to_string(),
            key: key.to_string(),
        };
        if is_reserved(key) {
            return Err(unknown());
        }
        let item = entity
            .item_ref(key)
            .and_then(|item_id| description.item(item_id))
            .ok_or_else(unknown)?;

        let fields = &mut self.nodes[id.0].fields;
        match item.validator().input(value) {
            None if item.is_required() => return Err(SdjError::RequiredItem(key.to_string())),
            None => {
                fields.remove(key);
            }
            Some(value) if item.validator().valid(&value) => {
                fields.insert(key.to_string(), value);
            }
            Some(_) => return Err(SdjError::InvalidValue(key.to_string())),
        }
        self.touch(id, host.stamp().now());
        Ok(())
    }

    /// Bumps `modified` on the nearest node, starting at `id`, that carries metadata
    fn touch(&mut self, id: NodeId, now: i64) {
        let mut next = Some(id);
        while let Some(current) = next {
            let node = &mut self.nodes[current.0];
            if let Some(info) = node.info.as_mut() {
                info.touch(now);
                return;
            }
            next = node.parent;
        }
    }

    /// Reads a field through its item's `output`
    pub fn field(&self, description: &Description, id: NodeId, key: &str) -> Option<Value> {
        let node = self.node(id)?;
        match key {
            "sdId" => return Some(Value::from(node.entity_id)),
            "sdKey" => return Some(Value::from(node.key.as_str())),
            _ => {}
        }
        let item = description
            .entity(node.entity_id)
            .and_then(|entity| entity.item_ref(key))
            .and_then(|item_id| description.item(item_id));
        match item {
            Some(item) => item.validator().output(node.fields.get(key)),
            None => node.fields.get(key).cloned(),
        }
    }

    /// Value and structure check of `id` and its subtree; logs every violation
    pub fn is_valid(&self, description: &Description, id: NodeId) -> bool {
        self.descendants(id).into_iter().fold(true, |valid, node| {
            let values = self
                .node(node)
                .and_then(|data| {
                    let entity = description.entity(data.entity_id)?;
                    Some(valid_data(description, entity, &data.key, &data.fields, false))
                })
                .unwrap_or(Ok(true));
            let structure = valid_struct(description, self, node, false);
            valid & matches!(values, Ok(true)) & matches!(structure, Ok(true))
        })
    }

    pub fn to_doc(&self, id: NodeId) -> Option<DataDoc> {
        let node = self.node(id)?;
        let children: Vec<DataDoc> = node
            .children
            .iter()
            .filter_map(|child| self.to_doc(*child))
            .collect();
        Some(DataDoc {
            id: node.entity_id,
            key: node.key.clone(),
            info: node.info.clone(),
            fields: node.fields.clone(),
            children: (!children.is_empty()).then_some(children),
        })
    }

    /// Every root, serialized
    pub fn to_docs(&self) -> Vec<DataDoc> {
        self.roots.iter().filter_map(|root| self.to_doc(*root)).collect()
    }
}
