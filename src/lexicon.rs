//! Lexicon Manager
//!
//! Lexicons are named, orderable bundles of items, entities, validators and
//! verification callbacks. A description lists the lexicons it needs; at
//! build time their items and entities are merged ahead of the
//! description's own, in the declared order, and the combined graph is
//! checked as a whole:
//!
//! - keys and ids are unique, ids run `0..N` without gaps
//! - every mentioned entity and item id is defined
//! - `extendIds` form no cycles and no diamond
//! - inherited items are not re-owned, props are flattened down `extendIds`
//! - each lexicon's `graphVerify` accepts the result

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::data::DataTree;
use crate::description::{Description, DescriptionDoc};
use crate::entity::{EntityDoc, SdProps};
use crate::error::{Result, SdjError};
use crate::item::{ItemDoc, Origin};
use crate::log::{LogLevel, LogSink};
use crate::patterns::is_type_name;
use crate::validators::{Validator, ValidatorRegistry};
use crate::SdId;

const LOG_MODULE: &str = "lexicons";

/// Called with the merged, normalized graph; `false` aborts the build
pub type GraphVerifyFn = Arc<dyn Fn(&[EntityDoc]) -> bool + Send + Sync>;

/// Called before a description is locked; `false` refuses the lock
pub type DataVerifyFn = Arc<dyn Fn(&Description, &DataTree) -> bool + Send + Sync>;

// =============================================================================
// Lexicon
// =============================================================================

/// Serializable part of a lexicon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LexiconDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityDoc>,
}

/// A named extension bundle
#[derive(Clone, Default)]
pub struct Lexicon {
    doc: LexiconDoc,
    validators: Vec<(String, Validator)>,
    graph_verify: Option<GraphVerifyFn>,
    data_verify: Option<DataVerifyFn>,
}

impl Lexicon {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            doc: LexiconDoc {
                name: name.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn from_doc(doc: LexiconDoc) -> Self {
        Self {
            doc,
            ..Default::default()
        }
    }

    /// Lexicon carrying a description's own items and entities.
    ///
    /// Named `<name>_lexicon`, lowercased.
    pub fn from_description(description: &DescriptionDoc) -> Self {
        let name = description.info.name.to_lowercase();
        let name = if name.contains("_lexicon") {
            name
        } else {
            format!("{}_lexicon", name)
        };
        Self::from_doc(LexiconDoc {
            name,
            required: Vec::new(),
            items: description.items.clone(),
            entities: description.graph.clone(),
        })
    }

    /// Lexicons that must precede this one, in order
    pub fn with_required(mut self, required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.doc.required = required.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_item(mut self, item: ItemDoc) -> Self {
        self.doc.items.push(item);
        self
    }

    pub fn with_entity(mut self, entity: EntityDoc) -> Self {
        self.doc.entities.push(entity);
        self
    }

    pub fn with_validator(mut self, type_name: impl Into<String>, validator: Validator) -> Self {
        self.validators.push((type_name.into(), validator));
        self
    }

    pub fn with_graph_verify(
        mut self,
        verify: impl Fn(&[EntityDoc]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.graph_verify = Some(Arc::new(verify));
        self
    }

    pub fn with_data_verify(
        mut self,
        verify: impl Fn(&Description, &DataTree) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.data_verify = Some(Arc::new(verify));
        self
    }

    pub fn name(&self) -> &str {
        &self.doc.name
    }

    pub fn required(&self) -> &[String] {
        &self.doc.required
    }

    pub fn items(&self) -> &[ItemDoc] {
        &self.doc.items
    }

    pub fn entities(&self) -> &[EntityDoc] {
        &self.doc.entities
    }

    pub fn doc(&self) -> &LexiconDoc {
        &self.doc
    }

    fn is_empty(&self) -> bool {
        self.doc.items.is_empty()
            && self.doc.entities.is_empty()
            && self.validators.is_empty()
            && self.graph_verify.is_none()
            && self.data_verify.is_none()
    }

    fn graph_verify(&self, graph: &[EntityDoc]) -> bool {
        self.graph_verify.as_ref().map_or(true, |verify| verify(graph))
    }

    fn data_verify(&self, description: &Description, tree: &DataTree) -> bool {
        self.data_verify
            .as_ref()
            .map_or(true, |verify| verify(description, tree))
    }
}

impl fmt::Debug for Lexicon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexicon")
            .field("doc", &self.doc)
            .field(
                "validators",
                &self.validators.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("graph_verify", &self.graph_verify.is_some())
            .field("data_verify", &self.data_verify.is_some())
            .finish()
    }
}

// =============================================================================
// Assembled Graph
// =============================================================================

/// Merged, normalized and verified items and entities, ready to be built
#[derive(Debug, Clone)]
pub struct AssembledGraph {
    /// Dense by id, base items first
    pub items: Vec<(ItemDoc, Origin)>,
    /// Dense by id, graph zero first; props are effective props
    pub entities: Vec<(EntityDoc, Origin)>,
}

// =============================================================================
// Manager
// =============================================================================

/// Registered lexicons plus the validator registry they extend
pub struct LexiconManager {
    lexicons: Vec<Lexicon>,
    validators: ValidatorRegistry,
    logs: Arc<dyn LogSink>,
}

impl LexiconManager {
    pub fn new(logs: Arc<dyn LogSink>) -> Self {
        Self {
            lexicons: Vec::new(),
            validators: ValidatorRegistry::new(logs.clone()),
            logs,
        }
    }

    fn log(&self, message: &str, level: LogLevel) {
        self.logs.log(LOG_MODULE, message, level);
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    /// Validator for `type_name`; unknown names log and never validate
    pub fn validator(&self, type_name: &str) -> Validator {
        self.validators.resolve(type_name)
    }

    /// Registered lexicon names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.lexicons.iter().map(Lexicon::name)
    }

    pub fn get(&self, name: &str) -> Option<&Lexicon> {
        let found = self.lexicons.iter().find(|lexicon| lexicon.name() == name);
        if found.is_none() {
            self.log(&format!("missing lexicon {}", name), LogLevel::Debug);
        }
        found
    }

    /// Registers a lexicon after checking it in isolation
    pub fn add_lexicon(&mut self, lexicon: Lexicon) -> Result<()> {
        let name = lexicon.name().to_string();
        if !is_type_name(&name) {
            return Err(SdjError::Pattern {
                subject: "lexicon".to_string(),
                pattern: "lexicon name",
                value: name,
            });
        }
        if self.lexicons.iter().any(|existing| existing.name() == name) {
            return Err(SdjError::DuplicateLexicon(name));
        }
        if lexicon.is_empty() {
            return Err(SdjError::malformed(
                format!("lexicon '{}'", name),
                "has no items, entities, validators or verifiers",
            ));
        }

        let mut new_types = HashSet::new();
        for (type_name, _) in &lexicon.validators {
            self.validators.check_new(type_name)?;
            if !new_types.insert(type_name.as_str()) {
                return Err(SdjError::DuplicateValidator(type_name.clone()));
            }
        }

        let subject = format!("lexicon '{}'", name);
        check_unique(&subject, lexicon.items().iter().map(|item| (item.id, item.key.as_str())))?;
        check_unique(
            &subject,
            lexicon.entities().iter().map(|entity| (entity.id, entity.key.as_str())),
        )?;

        for item in lexicon.items() {
            let type_name = self.validators.canonicalize(&item.type_name);
            ItemDoc {
                type_name: type_name.clone(),
                ..item.clone()
            }
            .verify()?;
            if !self.validators.contains(&type_name) && !new_types.contains(type_name.as_str()) {
                return Err(SdjError::UnknownValidator {
                    item: item.key.clone(),
                    type_name,
                });
            }
        }
        for entity in lexicon.entities() {
            entity.verify()?;
        }

        for (type_name, validator) in &lexicon.validators {
            self.validators.register(type_name, validator.clone())?;
        }
        self.log(&format!("added lexicon '{}'", name), LogLevel::Lib);
        self.lexicons.push(lexicon);
        Ok(())
    }

    /// Resolves a description's lexicon list, checking each lexicon's required order
    pub fn validate_requires(&self, names: &[String]) -> Result<Vec<&Lexicon>> {
        names
            .iter()
            .map(|name| {
                let lexicon = self
                    .lexicons
                    .iter()
                    .find(|lexicon| lexicon.name() == name)
                    .ok_or_else(|| SdjError::LexiconNotFound(name.clone()))?;
                for (index, required) in lexicon.required().iter().enumerate() {
                    if names.get(index) != Some(required) {
                        return Err(SdjError::LexiconOrder {
                            lexicon: name.clone(),
                            required: required.clone(),
                            index,
                        });
                    }
                }
                Ok(lexicon)
            })
            .collect()
    }

    /// Base items, then lexicon items in order, then the description's own
    pub fn merge_items(
        &self,
        lexicons: &[&Lexicon],
        own: &[ItemDoc],
    ) -> Result<Vec<(ItemDoc, Origin)>> {
        let incoming = lexicons
            .iter()
            .flat_map(|lexicon| {
                lexicon
                    .items()
                    .iter()
                    .map(|item| (item.clone(), Origin::Lexicon(lexicon.name().to_string())))
            })
            .chain(own.iter().map(|item| (item.clone(), Origin::Local)))
            .filter(|(item, _)| !item.is_system());

        let mut items: Vec<(ItemDoc, Origin)> = ItemDoc::base_items()
            .into_iter()
            .map(|item| (item, Origin::System))
            .collect();
        for (mut item, origin) in incoming {
            item.type_name = self.validators.canonicalize(&item.type_name);
            item.verify()?;
            if !self.validators.contains(&item.type_name) {
                return Err(SdjError::UnknownValidator {
                    item: item.key,
                    type_name: item.type_name,
                });
            }
            items.push((item, origin));
        }

        check_unique("items", items.iter().map(|(item, _)| (item.id, item.key.as_str())))?;
        items.sort_by_key(|(item, _)| item.id);
        check_dense("items", items.iter().map(|(item, _)| item.id))?;
        Ok(items)
    }

    /// Graph zero, then lexicon entities in order, then the description's own;
    /// normalized and flattened against `items`
    pub fn merge_graph(
        &self,
        lexicons: &[&Lexicon],
        own: &[EntityDoc],
        items: &[(ItemDoc, Origin)],
    ) -> Result<Vec<(EntityDoc, Origin)>> {
        let incoming = lexicons
            .iter()
            .flat_map(|lexicon| {
                lexicon
                    .entities()
                    .iter()
                    .map(|entity| (entity.clone(), Origin::Lexicon(lexicon.name().to_string())))
            })
            .chain(own.iter().map(|entity| (entity.clone(), Origin::Local)));

        let mut graph = vec![(EntityDoc::graph_zero(), Origin::System)];
        for (entity, origin) in incoming {
            entity.verify()?;
            if !entity.is_graph_zero() {
                graph.push((entity, origin));
            }
        }

        check_unique("graph", graph.iter().map(|(entity, _)| (entity.id, entity.key.as_str())))?;
        graph.sort_by_key(|(entity, _)| entity.id);
        check_dense("graph", graph.iter().map(|(entity, _)| entity.id))?;

        let item_ids: HashSet<SdId> = items.iter().map(|(item, _)| item.id).collect();
        check_references(graph.iter().map(|(entity, _)| entity), &item_ids)?;

        for (entity, _) in graph.iter_mut() {
            normalize_ids(entity);
        }
        let docs: Vec<EntityDoc> = graph.iter().map(|(entity, _)| entity.clone()).collect();
        check_extend_cycles(&docs)?;

        for (entity, _) in graph.iter_mut().filter(|(entity, _)| !entity.is_graph_zero()) {
            let inherited: BTreeSet<SdId> = extend_closure(&docs, entity.id)
                .into_iter()
                .flat_map(|ancestor| docs[ancestor as usize].items.iter().flatten().copied())
                .collect();
            if let Some(owned) = entity.items.as_mut() {
                owned.retain(|id| !inherited.contains(id));
                if owned.is_empty() {
                    entity.items = None;
                }
            }
        }

        let effective = effective_props(&docs);
        for (entity, _) in graph.iter_mut() {
            let props = &effective[entity.id as usize];
            entity.props = (!props.is_empty()).then(|| props.clone());
        }
        Ok(graph)
    }

    /// Full assembly for a description doc
    pub fn assemble(&self, description: &DescriptionDoc) -> Result<AssembledGraph> {
        let lexicons = self.validate_requires(&description.lexicons)?;
        let items = self.merge_items(&lexicons, &description.items)?;
        let entities = self.merge_graph(&lexicons, &description.graph, &items)?;

        let docs: Vec<EntityDoc> = entities.iter().map(|(entity, _)| entity.clone()).collect();
        for lexicon in &lexicons {
            if !lexicon.graph_verify(&docs) {
                return Err(SdjError::GraphVerify(lexicon.name().to_string()));
            }
        }
        self.log(
            &format!(
                "assembled '{}': {} items, {} entities",
                description.info.name,
                items.len(),
                entities.len()
            ),
            LogLevel::Debug,
        );
        Ok(AssembledGraph { items, entities })
    }

    /// Runs each listed lexicon's `dataVerify`, in order
    pub fn data_verify(&self, description: &Description, tree: &DataTree) -> Result<()> {
        for lexicon in self.validate_requires(description.lexicons())? {
            if !lexicon.data_verify(description, tree) {
                return Err(SdjError::DataVerify(lexicon.name().to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for LexiconManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexiconManager")
            .field("lexicons", &self.names().collect::<Vec<_>>())
            .field("validators", &self.validators)
            .finish()
    }
}

// =============================================================================
// Graph Checks
// =============================================================================

fn check_unique<'a>(subject: &str, entries: impl Iterator<Item = (SdId, &'a str)>) -> Result<()> {
    let mut ids = HashSet::new();
    let mut keys = HashSet::new();
    for (id, key) in entries {
        if !ids.insert(id) {
            return Err(SdjError::DuplicateId {
                subject: subject.to_string(),
                id,
            });
        }
        if !keys.insert(key) {
            return Err(SdjError::DuplicateKey {
                subject: subject.to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

/// Sorted ids must be exactly `0..N`
fn check_dense(subject: &str, sorted_ids: impl Iterator<Item = SdId>) -> Result<()> {
    for (expected, found) in sorted_ids.enumerate() {
        let expected = expected as SdId;
        if found != expected {
            return Err(SdjError::IdGap {
                subject: subject.to_string(),
                expected,
                found,
            });
        }
    }
    Ok(())
}

/// Every mentioned entity and item id must be defined. Entity ids are dense,
/// so an entity id is defined when it is below the entity count.
fn check_references<'a>(
    graph: impl Iterator<Item = &'a EntityDoc> + Clone,
    item_ids: &HashSet<SdId>,
) -> Result<()> {
    let entity_count = graph.clone().count() as SdId;
    for entity in graph {
        for (kind, id) in entity.references() {
            let defined = match kind {
                "item" => item_ids.contains(&id),
                _ => id < entity_count,
            };
            if !defined {
                return Err(SdjError::DanglingReference {
                    subject: format!("entity '{}'", entity.key),
                    kind,
                    id,
                });
            }
        }
    }
    Ok(())
}

/// Sorts and dedups every id list, dropping the system items from `sdItems`
fn normalize_ids(entity: &mut EntityDoc) {
    for ids in [
        &mut entity.items,
        &mut entity.extend_ids,
        &mut entity.parent_ids,
        &mut entity.child_ids,
    ] {
        if let Some(list) = ids.as_mut() {
            list.sort_unstable();
            list.dedup();
        }
    }
    if let Some(items) = entity.items.as_mut() {
        items.retain(|id| *id > 1);
        if items.is_empty() {
            entity.items = None;
        }
    }
}

/// Rejects `extendIds` cycles and entities that inherit the same ancestor twice.
///
/// `graph` must be dense by id.
pub fn check_extend_cycles(graph: &[EntityDoc]) -> Result<()> {
    let mut extends: DiGraph<SdId, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = graph.iter().map(|entity| extends.add_node(entity.id)).collect();
    for entity in graph {
        for target in entity.extend_ids.iter().flatten() {
            extends.add_edge(nodes[entity.id as usize], nodes[*target as usize], ());
        }
    }

    for component in kosaraju_scc(&extends) {
        let self_loop = component.len() == 1
            && extends.contains_edge(component[0], component[0]);
        if component.len() > 1 || self_loop {
            let id = extends[component[0]];
            return Err(SdjError::CircularReference {
                key: graph[id as usize].key.clone(),
            });
        }
    }

    for entity in graph {
        let closure = extend_closure(graph, entity.id);
        let mut seen = HashSet::new();
        if closure.iter().any(|id| !seen.insert(*id)) {
            return Err(SdjError::CircularReference {
                key: entity.key.clone(),
            });
        }
    }
    Ok(())
}

/// Every ancestor reachable through `extendIds`, depth first, repeats kept.
///
/// `graph` must be dense by id and acyclic.
pub fn extend_closure(graph: &[EntityDoc], id: SdId) -> Vec<SdId> {
    let mut closure = Vec::new();
    let mut stack: Vec<SdId> = graph[id as usize]
        .extend_ids
        .iter()
        .flatten()
        .rev()
        .copied()
        .collect();
    while let Some(next) = stack.pop() {
        closure.push(next);
        if let Some(extends) = graph.get(next as usize).and_then(|e| e.extend_ids.as_ref()) {
            stack.extend(extends.iter().rev().copied());
        }
    }
    closure
}

/// Left-to-right merge of each extended ancestor's effective props, then own props.
///
/// Indexed by id; `graph` must be dense and acyclic.
pub fn effective_props(graph: &[EntityDoc]) -> Vec<SdProps> {
    fn resolve(
        graph: &[EntityDoc],
        id: SdId,
        memo: &mut HashMap<SdId, SdProps>,
    ) -> SdProps {
        if let Some(done) = memo.get(&id) {
            return done.clone();
        }
        let entity = &graph[id as usize];
        let mut props = inherited_props(graph, entity, memo);
        if let Some(own) = &entity.props {
            props.extend(own.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        memo.insert(id, props.clone());
        props
    }

    fn inherited_props(
        graph: &[EntityDoc],
        entity: &EntityDoc,
        memo: &mut HashMap<SdId, SdProps>,
    ) -> SdProps {
        let mut props = SdProps::new();
        for ancestor in entity.extend_ids.iter().flatten() {
            props.extend(resolve(graph, *ancestor, memo));
        }
        props
    }

    let mut memo = HashMap::new();
    graph
        .iter()
        .map(|entity| resolve(graph, entity.id, &mut memo))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PropValue;
    use crate::limiter::Limiter;
    use crate::log::{LogManager, LogMode};

    fn manager() -> LexiconManager {
        LexiconManager::new(Arc::new(LogManager::new(LogMode::Test)))
    }

    fn simple() -> Lexicon {
        Lexicon::new("simple")
            .with_item(ItemDoc::new(2, "routeTitle", "strd"))
            .with_item(ItemDoc::new(3, "compClassName", "strd").with_limiter(Limiter::Required))
            .with_entity(EntityDoc::new(1, "comp").with_items([3]))
    }

    fn dense(docs: Vec<EntityDoc>) -> Vec<EntityDoc> {
        let mut graph = vec![EntityDoc::graph_zero()];
        graph.extend(docs);
        graph
    }

    #[test]
    fn test_add_lexicon_rules() {
        let mut manager = manager();
        manager.add_lexicon(simple()).unwrap();
        assert_eq!(manager.names().collect::<Vec<_>>(), vec!["simple"]);

        assert!(matches!(
            manager.add_lexicon(simple()),
            Err(SdjError::DuplicateLexicon(_))
        ));
        assert!(matches!(
            manager.add_lexicon(Lexicon::new("Bad Name").with_item(ItemDoc::new(2, "abcd", "strd"))),
            Err(SdjError::Pattern { .. })
        ));
        assert!(manager.add_lexicon(Lexicon::new("hollow")).is_err());
        assert!(matches!(
            manager.add_lexicon(
                Lexicon::new("floaty").with_validator("float", Validator::always_fail("float"))
            ),
            Err(SdjError::SimilarValidator { .. })
        ));
        assert!(matches!(
            manager.add_lexicon(
                Lexicon::new("dupes")
                    .with_item(ItemDoc::new(2, "first", "strd"))
                    .with_item(ItemDoc::new(3, "first", "strd"))
            ),
            Err(SdjError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_lexicon_validator_usable_by_its_items() {
        let mut manager = manager();
        let lexicon = Lexicon::new("colors")
            .with_validator("hexcolor", Validator::new("hexcolor", |v| {
                v.as_str().is_some_and(|s| s.starts_with('#') && s.len() == 7)
            }))
            .with_item(ItemDoc::new(2, "fillColor", "hexcolor"));
        manager.add_lexicon(lexicon).unwrap();
        assert!(manager.validator("hexcolor").valid(&serde_json::json!("#a0b1c2")));
    }

    #[test]
    fn test_validate_requires_order() {
        let mut manager = manager();
        manager.add_lexicon(simple()).unwrap();
        manager
            .add_lexicon(
                Lexicon::new("nested")
                    .with_required(["simple"])
                    .with_item(ItemDoc::new(4, "depthLevel", "intg")),
            )
            .unwrap();

        let ok = manager.validate_requires(&["simple".to_string(), "nested".to_string()]);
        assert_eq!(ok.unwrap().len(), 2);
        assert!(matches!(
            manager.validate_requires(&["nested".to_string(), "simple".to_string()]),
            Err(SdjError::LexiconOrder { .. })
        ));
        assert!(matches!(
            manager.validate_requires(&["missing".to_string()]),
            Err(SdjError::LexiconNotFound(_))
        ));
    }

    #[test]
    fn test_merge_items_drops_system_and_canonicalizes() {
        let manager = manager();
        let own = vec![
            ItemDoc::new(0, "sdId", "sdid"),
            ItemDoc::new(2, "title", "string"),
        ];
        let items = manager.merge_items(&[], &own).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].0.type_name, "strd");
        assert_eq!(items[2].1, Origin::Local);

        let gap = vec![ItemDoc::new(3, "title", "strd")];
        assert!(matches!(manager.merge_items(&[], &gap), Err(SdjError::IdGap { .. })));

        let unknown = vec![ItemDoc::new(2, "title", "nosuchtype")];
        assert!(matches!(
            manager.merge_items(&[], &unknown),
            Err(SdjError::UnknownValidator { .. })
        ));
    }

    #[test]
    fn test_merge_graph_removes_inherited_items_and_flattens_props() {
        let manager = manager();
        let items = manager
            .merge_items(
                &[],
                &[ItemDoc::new(2, "routeTitle", "strd"), ItemDoc::new(3, "compClassName", "strd")],
            )
            .unwrap();
        let own = vec![
            EntityDoc::new(1, "comp").with_items([3, 0, 1]).with_prop("route", false),
            EntityDoc::new(2, "route-comp")
                .with_extends([1])
                .with_items([3, 2])
                .with_prop("route", true)
                .with_children([1, 2, 3, 3]),
            EntityDoc::new(3, "data-obj").with_parents([1, 2, 3]).with_items([2]),
        ];
        let graph = manager.merge_graph(&[], &own, &items).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph[1].0.items, Some(vec![3]));
        assert_eq!(graph[2].0.items, Some(vec![2]));
        assert_eq!(graph[2].0.child_ids, Some(vec![1, 2, 3]));
        assert_eq!(graph[2].0.props.as_ref().unwrap()["route"], PropValue::Bool(true));
    }

    #[test]
    fn test_merge_graph_rejects_gaps_and_dangling() {
        let manager = manager();
        let items = manager.merge_items(&[], &[ItemDoc::new(2, "routeTitle", "strd")]).unwrap();

        let gap = vec![EntityDoc::new(2, "comp").with_items([2])];
        assert!(matches!(
            manager.merge_graph(&[], &gap, &items),
            Err(SdjError::IdGap { .. })
        ));

        let dangling = vec![EntityDoc::new(1, "comp").with_items([2]).with_children([5])];
        assert!(matches!(
            manager.merge_graph(&[], &dangling, &items),
            Err(SdjError::DanglingReference { kind: "entity", id: 5, .. })
        ));

        let missing_item = vec![EntityDoc::new(1, "comp").with_items([9])];
        assert!(matches!(
            manager.merge_graph(&[], &missing_item, &items),
            Err(SdjError::DanglingReference { kind: "item", id: 9, .. })
        ));
    }

    #[test]
    fn test_extend_cycle_rejected() {
        let graph = dense(vec![
            EntityDoc::new(1, "alpha").with_extends([2]),
            EntityDoc::new(2, "beta").with_extends([1]),
        ]);
        assert!(matches!(
            check_extend_cycles(&graph),
            Err(SdjError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_extend_diamond_rejected() {
        let graph = dense(vec![
            EntityDoc::new(1, "root").with_items([2]),
            EntityDoc::new(2, "left").with_extends([1]),
            EntityDoc::new(3, "right").with_extends([1]),
            EntityDoc::new(4, "both").with_extends([2, 3]),
        ]);
        assert!(matches!(
            check_extend_cycles(&graph),
            Err(SdjError::CircularReference { key }) if key == "both"
        ));
    }

    #[test]
    fn test_extend_closure_and_props() {
        let graph = dense(vec![
            EntityDoc::new(1, "base").with_items([2]).with_prop("route", true).with_prop("tier", 1_i64),
            EntityDoc::new(2, "middle").with_extends([1]).with_prop("tier", 2_i64),
            EntityDoc::new(3, "leaf").with_extends([2]),
        ]);
        assert!(check_extend_cycles(&graph).is_ok());
        assert_eq!(extend_closure(&graph, 3), vec![2, 1]);

        let props = effective_props(&graph);
        assert_eq!(props[3]["route"], PropValue::Bool(true));
        assert_eq!(props[3]["tier"], PropValue::from(2_i64));
        assert!(props[0].is_empty());
    }

    #[test]
    fn test_from_description_name() {
        let doc: DescriptionDoc = serde_json::from_value(serde_json::json!({
            "sdInfo": {"name": "SiteMap", "uniqId": "3rh28R-Qlbx4-i6Xy-gqB03MA", "created": 1, "modified": 1},
            "items": [{"sdId": 2, "sdKey": "routeTitle", "type": "strd"}],
            "graph": [{"sdId": 1, "sdKey": "comp", "sdItems": [2]}]
        }))
        .unwrap();
        let lexicon = Lexicon::from_description(&doc);
        assert_eq!(lexicon.name(), "sitemap_lexicon");
        assert_eq!(lexicon.items().len(), 1);
        assert_eq!(lexicon.entities().len(), 1);
    }
}
