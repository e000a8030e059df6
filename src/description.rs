//! Description: the schema container
//!
//! A [`Description`] is the built, read-only form: dense `items` and
//! `entities` arrays indexed by id, with every cross-reference resolved.
//! [`Description::unlock`] hands out an owned [`DescriptionBuilder`] holding
//! the description's own nodes for editing; [`DescriptionBuilder::build`]
//! assembles a fresh description from it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::entity::{Entity, EntityDoc, GraphNode, SdProps};
use crate::error::{Result, SdjError};
use crate::fingerprint::Fingerprint;
use crate::host::Host;
use crate::info::Info;
use crate::item::{Item, ItemDoc, ItemNode};
use crate::lexicon::{extend_closure, AssembledGraph};
use crate::log::{LogLevel, LogSink};
use crate::search::{query_entities, query_items, EntitySearch, ItemSearch};
use crate::SdId;

/// Description as it appears in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptionDoc {
    #[serde(rename = "sdInfo")]
    pub info: Info,
    #[serde(default)]
    pub items: Vec<ItemDoc>,
    #[serde(default)]
    pub graph: Vec<EntityDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lexicons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(rename = "dataInfo", default, skip_serializing_if = "Option::is_none")]
    pub data_info: Option<bool>,
}

impl DescriptionDoc {
    pub fn new(info: Info) -> Self {
        Self {
            info,
            items: Vec::new(),
            graph: Vec::new(),
            lexicons: Vec::new(),
            lang: None,
            data_info: None,
        }
    }

    /// Shape checks that do not need the host
    pub fn verify(&self) -> Result<()> {
        let subject = format!("description '{}'", self.info.name);
        self.info.verify(&subject, false)?;

        let mut lexicons = HashSet::new();
        if let Some(duplicate) = self.lexicons.iter().find(|name| !lexicons.insert(*name)) {
            return Err(SdjError::malformed(
                subject,
                format!("lexicon '{}' is listed twice", duplicate),
            ));
        }
        if self.items.is_empty() && self.lexicons.is_empty() {
            return Err(SdjError::malformed(subject, "items are required without lexicons"));
        }
        Ok(())
    }
}

// =============================================================================
// Description
// =============================================================================

/// Built, read-only description
#[derive(Clone)]
pub struct Description {
    info: Info,
    lang: String,
    lexicons: Vec<String>,
    data_info: bool,
    items: Vec<Item>,
    entities: Vec<Entity>,
    logs: Arc<dyn LogSink>,
}

impl Description {
    /// Builds a new description and records it with the host.
    ///
    /// A name already recorded under another `uniqId` is renamed `<name>_alt`.
    pub fn build(doc: DescriptionDoc, host: &Host) -> Result<Self> {
        let info = if doc.info.is_blank() {
            doc.info.restamp(host.stamp())
        } else {
            doc.info.clone()
        };
        let doc = DescriptionDoc { info, ..doc };
        doc.verify()?;

        let info = host.admit_description(&doc.info)?;
        let description = Self::assemble(DescriptionDoc { info, ..doc }, host)?;
        host.register_description(&description)?;
        Ok(description)
    }

    /// Merges lexicons, builds entities and items, and resolves references
    pub(crate) fn assemble(doc: DescriptionDoc, host: &Host) -> Result<Self> {
        doc.verify()?;
        let AssembledGraph { items, entities } = host.lexicons().assemble(&doc)?;
        let graph: Vec<EntityDoc> = entities.iter().map(|(entity, _)| entity.clone()).collect();

        let validators = host.lexicons().validators();
        let items: Vec<Item> = items
            .into_iter()
            .map(|(item, origin)| Item::build(item, origin, validators))
            .collect();
        let mut entities: Vec<Entity> = entities
            .into_iter()
            .map(|(entity, origin)| Entity::build(entity, origin))
            .collect();

        let count = entities.len() as SdId;
        for entity in entities.iter_mut() {
            if let Some(missing) = entity.child_ids.iter().find(|id| **id >= count) {
                return Err(SdjError::DanglingReference {
                    subject: format!("entity '{}'", entity.key),
                    kind: "entity",
                    id: *missing,
                });
            }
            entity.child_refs = entity.child_ids.clone();

            let inherited = extend_closure(&graph, entity.id)
                .into_iter()
                .flat_map(|ancestor| graph[ancestor as usize].items.iter().flatten().copied());
            let mut item_refs = BTreeMap::new();
            for item_id in entity.item_ids.iter().copied().chain(inherited) {
                let item = items.get(item_id as usize).ok_or_else(|| SdjError::DanglingReference {
                    subject: format!("entity '{}'", entity.key),
                    kind: "item",
                    id: item_id,
                })?;
                item_refs.insert(item.key().to_string(), item_id);
            }
            entity.item_refs = item_refs;
        }

        let lang = doc
            .lang
            .unwrap_or_else(|| host.config().description.default_language.clone());
        let data_info = doc
            .data_info
            .unwrap_or(host.config().description.data_info);

        host.logs().log(
            "description",
            &format!("built '{}'", doc.info.name),
            LogLevel::Lib,
        );
        Ok(Self {
            info: doc.info,
            lang,
            lexicons: doc.lexicons,
            data_info,
            items,
            entities,
            logs: host.logs().clone(),
        })
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn lexicons(&self) -> &[String] {
        &self.lexicons
    }

    pub fn data_info(&self) -> bool {
        self.data_info
    }

    /// Dense by id; `entities()[0]` is graph zero
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Dense by id; `items()[0..2]` are `sdId` and `sdKey`
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub(crate) fn logs(&self) -> &dyn LogSink {
        self.logs.as_ref()
    }

    fn miss(&self, what: &str) {
        self.logs.log(
            "description",
            &format!("'{}' has no {}", self.info.name, what),
            LogLevel::Debug,
        );
    }

    pub fn entity(&self, id: SdId) -> Option<&Entity> {
        let found = self.entities.get(id as usize);
        if found.is_none() {
            self.miss(&format!("entity {}", id));
        }
        found
    }

    pub fn entity_by_key(&self, key: &str) -> Option<&Entity> {
        let found = self.entities.iter().find(|entity| entity.key() == key);
        if found.is_none() {
            self.miss(&format!("entity '{}'", key));
        }
        found
    }

    pub fn item(&self, id: SdId) -> Option<&Item> {
        let found = self.items.get(id as usize);
        if found.is_none() {
            self.miss(&format!("item {}", id));
        }
        found
    }

    pub fn item_by_key(&self, key: &str) -> Option<&Item> {
        let found = self.items.iter().find(|item| item.key() == key);
        if found.is_none() {
            self.miss(&format!("item '{}'", key));
        }
        found
    }

    /// Merged effective props of the entities `id` extends, in `extendIds` order
    pub fn inherited_props(&self, id: SdId) -> SdProps {
        let mut props = SdProps::new();
        let Some(entity) = self.entities.get(id as usize) else {
            return props;
        };
        for ancestor in entity.extend_ids() {
            if let Some(ancestor) = self.entities.get(*ancestor as usize) {
                props.extend(ancestor.props().iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        props
    }

    pub fn search_entities(&self, search: &EntitySearch) -> Vec<&Entity> {
        query_entities(self, search)
    }

    pub fn search_items(&self, search: &ItemSearch) -> Vec<&Item> {
        query_items(self, search)
    }

    /// Wire form: only the description's own items and entities, props diffed
    pub fn to_doc(&self) -> DescriptionDoc {
        DescriptionDoc {
            info: self.info.clone(),
            items: self
                .items
                .iter()
                .filter(|item| item.origin().is_local())
                .map(Item::to_doc)
                .collect(),
            graph: self
                .entities
                .iter()
                .filter(|entity| entity.origin().is_local())
                .map(|entity| entity.to_doc(Some(&self.inherited_props(entity.id()))))
                .collect(),
            lexicons: self.lexicons.clone(),
            lang: Some(self.lang.clone()),
            data_info: self.data_info.then_some(true),
        }
    }

    /// Content hash of the wire form, ignoring `modified`
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_description(&self.to_doc())
    }

    /// Owned, editable copy of the description's own nodes
    pub fn unlock(&self) -> DescriptionBuilder {
        DescriptionBuilder {
            info: self.info.clone(),
            lang: self.lang.clone(),
            lexicons: self.lexicons.clone(),
            data_info: self.data_info,
            items: self
                .items
                .iter()
                .filter(|item| item.origin().is_local())
                .cloned()
                .map(ItemNode::Built)
                .collect(),
            graph: self
                .entities
                .iter()
                .filter(|entity| entity.origin().is_local())
                .cloned()
                .map(GraphNode::Built)
                .collect(),
        }
    }
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Description")
            .field("info", &self.info)
            .field("lang", &self.lang)
            .field("lexicons", &self.lexicons)
            .field("data_info", &self.data_info)
            .field("items", &self.items)
            .field("entities", &self.entities)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Unlocked description: the description's own items and entities, editable
#[derive(Debug, Clone)]
pub struct DescriptionBuilder {
    pub info: Info,
    pub lang: String,
    pub lexicons: Vec<String>,
    pub data_info: bool,
    items: Vec<ItemNode>,
    graph: Vec<GraphNode>,
}

impl DescriptionBuilder {
    pub fn items(&self) -> &[ItemNode] {
        &self.items
    }

    pub fn graph(&self) -> &[GraphNode] {
        &self.graph
    }

    pub fn add_item(&mut self, item: ItemDoc) -> &mut Self {
        self.items.push(item.into());
        self
    }

    pub fn add_entity(&mut self, entity: EntityDoc) -> &mut Self {
        self.graph.push(entity.into());
        self
    }

    /// Swaps the entity with the same id, or adds it when there is none
    pub fn replace_entity(&mut self, entity: EntityDoc) -> &mut Self {
        match self.graph.iter_mut().find(|node| node.id() == entity.id) {
            Some(node) => *node = entity.into(),
            None => self.graph.push(entity.into()),
        }
        self
    }

    pub fn remove_entity(&mut self, id: SdId) -> Option<GraphNode> {
        let index = self.graph.iter().position(|node| node.id() == id)?;
        Some(self.graph.remove(index))
    }

    pub fn remove_item(&mut self, id: SdId) -> Option<ItemNode> {
        let index = self.items.iter().position(|node| node.id() == id)?;
        Some(self.items.remove(index))
    }

    pub fn to_doc(&self) -> DescriptionDoc {
        DescriptionDoc {
            info: self.info.clone(),
            items: self.items.iter().map(ItemNode::to_doc).collect(),
            graph: self.graph.iter().map(GraphNode::to_doc).collect(),
            lexicons: self.lexicons.clone(),
            lang: Some(self.lang.clone()),
            data_info: self.data_info.then_some(true),
        }
    }

    /// Assembles a description from the current nodes; the builder is kept
    pub fn build(&self, host: &Host) -> Result<Description> {
        Description::assemble(self.to_doc(), host)
    }
}
