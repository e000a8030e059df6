//! Entities: typed nodes of the description graph
//!
//! An [`EntityDoc`] is the wire form. An [`Entity`] is the built form held by
//! a [`Description`](crate::description::Description), with id sets
//! normalized, props flattened through `extendIds`, and the derived
//! `child_refs` / `item_refs` indices resolved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SdjError};
use crate::item::Origin;
use crate::limiter::Limiter;
use crate::patterns::{is_key, is_reserved, GRAPH_ID};
use crate::SdId;

/// Primitive property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// Entity property bag
pub type SdProps = BTreeMap<String, PropValue>;

/// Entity as it appears in a document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDoc {
    #[serde(rename = "sdId")]
    pub id: SdId,
    #[serde(rename = "sdKey")]
    pub key: String,
    #[serde(rename = "sdItems", default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<SdId>>,
    #[serde(rename = "extendIds", default, skip_serializing_if = "Option::is_none")]
    pub extend_ids: Option<Vec<SdId>>,
    #[serde(rename = "parentIds", default, skip_serializing_if = "Option::is_none")]
    pub parent_ids: Option<Vec<SdId>>,
    #[serde(rename = "childIds", default, skip_serializing_if = "Option::is_none")]
    pub child_ids: Option<Vec<SdId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<Limiter>,
    #[serde(rename = "sdProps", default, skip_serializing_if = "Option::is_none")]
    pub props: Option<SdProps>,
    #[serde(rename = "dataInfo", default, skip_serializing_if = "Option::is_none")]
    pub data_info: Option<bool>,
}

fn non_empty(ids: &Option<Vec<SdId>>) -> Option<&[SdId]> {
    ids.as_deref().filter(|ids| !ids.is_empty())
}

impl EntityDoc {
    pub fn new(id: SdId, key: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_items(mut self, items: impl Into<Vec<SdId>>) -> Self {
        self.items = Some(items.into());
        self
    }

    pub fn with_extends(mut self, extend_ids: impl Into<Vec<SdId>>) -> Self {
        self.extend_ids = Some(extend_ids.into());
        self
    }

    pub fn with_parents(mut self, parent_ids: impl Into<Vec<SdId>>) -> Self {
        self.parent_ids = Some(parent_ids.into());
        self
    }

    pub fn with_children(mut self, child_ids: impl Into<Vec<SdId>>) -> Self {
        self.child_ids = Some(child_ids.into());
        self
    }

    pub fn with_limiter(mut self, limiter: Limiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props
            .get_or_insert_with(SdProps::new)
            .insert(key.into(), value.into());
        self
    }

    /// The synthetic root entity present in every graph
    pub fn graph_zero() -> Self {
        Self {
            id: 0,
            key: GRAPH_ID.to_string(),
            parent_ids: Some(Vec::new()),
            limiter: Some(Limiter::SystemRequired),
            ..Default::default()
        }
    }

    pub fn is_graph_zero(&self) -> bool {
        self.id == 0
    }

    /// Every id this entity mentions, tagged with what it refers to
    pub fn references(&self) -> impl Iterator<Item = (&'static str, SdId)> + '_ {
        let entities = [&self.parent_ids, &self.child_ids, &self.extend_ids]
            .into_iter()
            .flat_map(|ids| ids.iter().flatten())
            .map(|id| ("entity", *id));
        let items = self.items.iter().flatten().map(|id| ("item", *id));
        entities.chain(items)
    }

    /// Checks a single entity in isolation
    pub fn verify(&self) -> Result<()> {
        let subject = format!("entity '{}'", self.key);

        if !is_key(&self.key) {
            return Err(SdjError::Pattern {
                subject,
                pattern: "key",
                value: self.key.clone(),
            });
        }
        if (self.id == 0) != (self.key == GRAPH_ID) {
            return Err(SdjError::malformed(
                subject,
                format!("sdId 0 and key '{}' are reserved for graph zero", GRAPH_ID),
            ));
        }
        if self.is_graph_zero() {
            return Ok(());
        }

        if non_empty(&self.child_ids).is_some_and(|ids| ids.contains(&0)) {
            return Err(SdjError::malformed(subject, "childIds cannot contain 0"));
        }
        if non_empty(&self.extend_ids)
            .is_some_and(|ids| ids.contains(&0) || ids.contains(&self.id))
        {
            return Err(SdjError::malformed(
                subject,
                "extendIds cannot contain 0 or the entity itself",
            ));
        }
        if non_empty(&self.items).is_none()
            && non_empty(&self.extend_ids).is_none()
            && non_empty(&self.child_ids).is_none()
        {
            return Err(SdjError::EmptyEntity {
                key: self.key.clone(),
            });
        }
        if let Some(props) = &self.props {
            if let Some(bad) = props.keys().find(|key| !is_key(key) || is_reserved(key)) {
                return Err(SdjError::malformed(
                    subject,
                    format!("sdProps key '{}' is invalid or reserved", bad),
                ));
            }
        }
        if self.limiter == Some(Limiter::SequentialIndexed) {
            let top_level = self
                .parent_ids
                .as_deref()
                .map_or(true, |ids| ids.is_empty() || ids == [0]);
            if !top_level || non_empty(&self.child_ids).is_none() {
                return Err(SdjError::malformed(
                    subject,
                    "sdj_index entities must be top level and declare childIds",
                ));
            }
        }
        Ok(())
    }
}

/// Built entity
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) id: SdId,
    pub(crate) key: String,
    pub(crate) parent_ids: Vec<SdId>,
    pub(crate) child_ids: Vec<SdId>,
    pub(crate) extend_ids: Vec<SdId>,
    /// Owned items, always starting with 0 and 1
    pub(crate) item_ids: Vec<SdId>,
    pub(crate) limiter: Limiter,
    /// Effective props: inherited through `extendIds`, then overridden
    pub(crate) props: SdProps,
    pub(crate) data_info: bool,
    pub(crate) origin: Origin,
    pub(crate) child_refs: Vec<SdId>,
    pub(crate) item_refs: BTreeMap<String, SdId>,
}

impl Entity {
    /// Builds from a merged doc; references are resolved by the description
    pub(crate) fn build(doc: EntityDoc, origin: Origin) -> Self {
        let parent_ids = match doc.parent_ids {
            _ if doc.id == 0 => Vec::new(),
            Some(ids) if !ids.is_empty() => ids,
            _ => vec![0],
        };
        let mut item_ids = vec![0, 1];
        item_ids.extend(doc.items.unwrap_or_default().into_iter().filter(|id| *id > 1));
        item_ids.dedup();

        Self {
            id: doc.id,
            key: doc.key,
            parent_ids,
            child_ids: doc.child_ids.unwrap_or_default(),
            extend_ids: doc.extend_ids.unwrap_or_default(),
            item_ids,
            limiter: doc.limiter.unwrap_or_default(),
            props: doc.props.unwrap_or_default(),
            data_info: doc.data_info.unwrap_or(false),
            origin,
            child_refs: Vec::new(),
            item_refs: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> SdId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent_ids(&self) -> &[SdId] {
        &self.parent_ids
    }

    pub fn child_ids(&self) -> &[SdId] {
        &self.child_ids
    }

    pub fn extend_ids(&self) -> &[SdId] {
        &self.extend_ids
    }

    pub fn item_ids(&self) -> &[SdId] {
        &self.item_ids
    }

    pub fn limiter(&self) -> Limiter {
        self.limiter
    }

    pub fn props(&self) -> &SdProps {
        &self.props
    }

    pub fn data_info(&self) -> bool {
        self.data_info
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn is_graph_zero(&self) -> bool {
        self.id == 0
    }

    pub fn allows_parent(&self, parent_id: SdId) -> bool {
        self.parent_ids.contains(&parent_id)
    }

    pub fn allows_child(&self, child_id: SdId) -> bool {
        self.child_ids.contains(&child_id)
    }

    /// Resolved child entity ids
    pub fn child_refs(&self) -> &[SdId] {
        &self.child_refs
    }

    /// Effective items by key: owned plus everything reachable through `extendIds`
    pub fn item_refs(&self) -> &BTreeMap<String, SdId> {
        &self.item_refs
    }

    pub fn item_ref(&self, key: &str) -> Option<SdId> {
        self.item_refs.get(key).copied()
    }

    /// Wire form.
    ///
    /// With `inherited` props only keys whose value differs from the inherited
    /// value are emitted; without, all effective props are.
    pub fn to_doc(&self, inherited: Option<&SdProps>) -> EntityDoc {
        let props: SdProps = match inherited {
            Some(inherited) => self
                .props
                .iter()
                .filter(|(key, value)| inherited.get(*key) != Some(*value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            None => self.props.clone(),
        };
        let items: Vec<SdId> = self.item_ids.iter().copied().filter(|id| *id > 1).collect();
        let some_if = |ids: &Vec<SdId>| (!ids.is_empty()).then(|| ids.clone());

        EntityDoc {
            id: self.id,
            key: self.key.clone(),
            items: some_if(&items),
            extend_ids: some_if(&self.extend_ids),
            parent_ids: (self.parent_ids != [0]).then(|| self.parent_ids.clone()),
            child_ids: some_if(&self.child_ids),
            limiter: (self.limiter != Limiter::None).then_some(self.limiter),
            props: (!props.is_empty()).then_some(props),
            data_info: self.data_info.then_some(true),
        }
    }
}

/// Graph slot in an unlocked description: either carried over from a build or newly added
#[derive(Debug, Clone)]
pub enum GraphNode {
    Built(Entity),
    Raw(EntityDoc),
}

impl GraphNode {
    pub fn id(&self) -> SdId {
        match self {
            Self::Built(entity) => entity.id(),
            Self::Raw(doc) => doc.id,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Built(entity) => entity.key(),
            Self::Raw(doc) => &doc.key,
        }
    }

    /// Raw form fed back into assembly; built entities carry their effective props
    pub fn to_doc(&self) -> EntityDoc {
        match self {
            Self::Built(entity) => entity.to_doc(None),
            Self::Raw(doc) => doc.clone(),
        }
    }
}

impl From<EntityDoc> for GraphNode {
    fn from(doc: EntityDoc) -> Self {
        Self::Raw(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_doc_wire_format() {
        let doc: EntityDoc = serde_json::from_value(json!({
            "sdId": 2, "sdKey": "route-comp", "extendIds": [1],
            "sdProps": {"route": true, "weight": 2, "label": "nav"}, "childIds": [1, 2, 3]
        }))
        .unwrap();
        assert_eq!(doc.extend_ids, Some(vec![1]));
        let props = doc.props.as_ref().unwrap();
        assert_eq!(props["route"], PropValue::Bool(true));
        assert_eq!(props["label"], PropValue::Text("nav".into()));
        assert!(doc.verify().is_ok());
    }

    #[test]
    fn test_entity_doc_rejects_unknown_keys_and_nested_props() {
        assert!(serde_json::from_value::<EntityDoc>(json!({
            "sdId": 1, "sdKey": "comp", "sdItems": [3], "bogus": 1
        }))
        .is_err());
        assert!(serde_json::from_value::<EntityDoc>(json!({
            "sdId": 1, "sdKey": "comp", "sdItems": [3], "sdProps": {"nested": {"a": 1}}
        }))
        .is_err());
        assert!(serde_json::from_value::<EntityDoc>(json!({
            "sdId": 1, "sdKey": "comp", "childIds": [-2]
        }))
        .is_err());
    }

    #[test]
    fn test_verify_rules() {
        assert!(EntityDoc::new(1, "comp").with_items([3]).verify().is_ok());
        assert!(matches!(
            EntityDoc::new(1, "comp").verify(),
            Err(SdjError::EmptyEntity { .. })
        ));
        assert!(EntityDoc::new(0, "comp").with_items([3]).verify().is_err());
        assert!(EntityDoc::new(4, GRAPH_ID).with_items([3]).verify().is_err());
        assert!(EntityDoc::new(1, "comp").with_children([0]).verify().is_err());
        assert!(EntityDoc::new(1, "comp").with_extends([1]).verify().is_err());
        assert!(EntityDoc::new(1, "comp")
            .with_items([3])
            .with_prop("sdKey", true)
            .verify()
            .is_err());
        assert!(EntityDoc::graph_zero().verify().is_ok());
    }

    #[test]
    fn test_sequential_index_rules() {
        let indexed = EntityDoc::new(4, "pages").with_limiter(Limiter::SequentialIndexed);
        assert!(indexed.clone().with_children([5]).verify().is_ok());
        assert!(indexed.clone().with_items([2]).verify().is_err());
        assert!(indexed
            .with_children([5])
            .with_parents([1])
            .verify()
            .is_err());
    }

    #[test]
    fn test_build_normalizes() {
        let entity = Entity::build(EntityDoc::new(3, "data-obj").with_items([1, 4]), Origin::Local);
        assert_eq!(entity.parent_ids(), &[0]);
        assert_eq!(entity.item_ids(), &[0, 1, 4]);
        assert_eq!(entity.limiter(), Limiter::None);

        let zero = Entity::build(EntityDoc::graph_zero(), Origin::System);
        assert!(zero.parent_ids().is_empty());
        assert_eq!(zero.limiter(), Limiter::SystemRequired);
    }

    #[test]
    fn test_to_doc_omits_defaults_and_diffs_props() {
        let mut entity = Entity::build(
            EntityDoc::new(2, "route-comp").with_extends([1]).with_children([1, 2, 3]),
            Origin::Local,
        );
        entity.props.insert("route".into(), true.into());

        let mut inherited = SdProps::new();
        inherited.insert("route".into(), true.into());
        let doc = entity.to_doc(Some(&inherited));
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"sdId": 2, "sdKey": "route-comp", "extendIds": [1], "childIds": [1, 2, 3]})
        );

        inherited.insert("route".into(), false.into());
        let doc = entity.to_doc(Some(&inherited));
        assert_eq!(doc.props.unwrap()["route"], PropValue::Bool(true));
    }
}
