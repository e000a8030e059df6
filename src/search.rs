//! Search Engine
//!
//! Path addressing over a [`DataTree`] and single-criterion queries over a
//! [`Description`]'s entities and items. A search may carry several
//! criteria; only the first non-empty one, in a fixed priority order, is used.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data::{DataTree, NodeId};
use crate::description::Description;
use crate::entity::{Entity, SdProps};
use crate::item::Item;
use crate::limiter::Limiter;
use crate::log::LogLevel;
use crate::SdId;

const LOG_MODULE: &str = "search";

// =============================================================================
// Criteria
// =============================================================================

/// Entity query; the first criterion set wins, in field order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySearch {
    #[serde(rename = "sdId", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SdId>,
    #[serde(rename = "sdKey", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<Limiter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_ids: Vec<SdId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extend_ids: Vec<SdId>,
    #[serde(rename = "sdItems", default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<SdId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<SdId>,
    #[serde(rename = "sdProps", default, skip_serializing_if = "Option::is_none")]
    pub props: Option<SdProps>,
    /// Exact props match, and relationship checks against data
    #[serde(default)]
    pub check_data: bool,
}

/// The criterion an [`EntitySearch`] resolves to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityCriterion<'a> {
    Id(SdId),
    Key(&'a str),
    Limiter(Limiter),
    Parents(&'a [SdId]),
    Extends(&'a [SdId]),
    Items(&'a [SdId]),
    Children(&'a [SdId]),
    Props(&'a SdProps),
}

impl EntitySearch {
    pub fn id(id: SdId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn limiter(limiter: Limiter) -> Self {
        Self {
            limiter: Some(limiter),
            ..Default::default()
        }
    }

    pub fn parents(ids: impl Into<Vec<SdId>>) -> Self {
        Self {
            parent_ids: ids.into(),
            ..Default::default()
        }
    }

    pub fn extends(ids: impl Into<Vec<SdId>>) -> Self {
        Self {
            extend_ids: ids.into(),
            ..Default::default()
        }
    }

    pub fn items(ids: impl Into<Vec<SdId>>) -> Self {
        Self {
            items: ids.into(),
            ..Default::default()
        }
    }

    pub fn children(ids: impl Into<Vec<SdId>>) -> Self {
        Self {
            child_ids: ids.into(),
            ..Default::default()
        }
    }

    pub fn props(props: SdProps) -> Self {
        Self {
            props: Some(props),
            ..Default::default()
        }
    }

    pub fn with_check_data(mut self) -> Self {
        self.check_data = true;
        self
    }

    pub fn criterion(&self) -> Option<EntityCriterion<'_>> {
        if let Some(id) = self.id {
            return Some(EntityCriterion::Id(id));
        }
        if let Some(key) = self.key.as_deref().filter(|key| !key.is_empty()) {
            return Some(EntityCriterion::Key(key));
        }
        if let Some(limiter) = self.limiter {
            return Some(EntityCriterion::Limiter(limiter));
        }
        if !self.parent_ids.is_empty() {
            return Some(EntityCriterion::Parents(&self.parent_ids));
        }
        if !self.extend_ids.is_empty() {
            return Some(EntityCriterion::Extends(&self.extend_ids));
        }
        if !self.items.is_empty() {
            return Some(EntityCriterion::Items(&self.items));
        }
        if !self.child_ids.is_empty() {
            return Some(EntityCriterion::Children(&self.child_ids));
        }
        self.props
            .as_ref()
            .filter(|props| !props.is_empty())
            .map(EntityCriterion::Props)
    }
}

/// Item query; the first criterion set wins: id, key, type, limiter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSearch {
    #[serde(rename = "sdId", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SdId>,
    #[serde(rename = "sdKey", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<Limiter>,
}

impl ItemSearch {
    pub fn id(id: SdId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn type_name(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Default::default()
        }
    }

    pub fn limiter(limiter: Limiter) -> Self {
        Self {
            limiter: Some(limiter),
            ..Default::default()
        }
    }
}

// =============================================================================
// Description queries
// =============================================================================

fn contains_any(haystack: &[SdId], needles: &[SdId]) -> bool {
    needles.iter().any(|id| haystack.contains(id))
}

/// Entities matching the search, in id order
pub fn query_entities<'d>(description: &'d Description, search: &EntitySearch) -> Vec<&'d Entity> {
    let Some(criterion) = search.criterion() else {
        return Vec::new();
    };
    let entities = description.entities();
    let found: Vec<&Entity> = match criterion {
        EntityCriterion::Id(id) => entities.get(id as usize).into_iter().collect(),
        EntityCriterion::Key(key) => entities.iter().filter(|e| e.key() == key).collect(),
        EntityCriterion::Limiter(limiter) => {
            entities.iter().filter(|e| e.limiter() == limiter).collect()
        }
        EntityCriterion::Parents(ids) => entities
            .iter()
            .filter(|e| contains_any(e.parent_ids(), ids))
            .collect(),
        EntityCriterion::Extends(ids) => entities
            .iter()
            .filter(|e| contains_any(e.extend_ids(), ids))
            .collect(),
        EntityCriterion::Items(ids) => entities
            .iter()
            .filter(|e| contains_any(e.item_ids(), ids))
            .collect(),
        EntityCriterion::Children(ids) => entities
            .iter()
            .filter(|e| !e.is_graph_zero() && contains_any(e.child_ids(), ids))
            .collect(),
        EntityCriterion::Props(props) => entities
            .iter()
            .filter(|e| !e.is_graph_zero())
            .filter(|e| {
                if search.check_data {
                    e.props() == props
                } else {
                    props.iter().all(|(key, value)| e.props().get(key) == Some(value))
                }
            })
            .collect(),
    };
    description.logs().log(
        LOG_MODULE,
        &format!("entity query {:?}: {} found", criterion, found.len()),
        LogLevel::Trace,
    );
    found
}

/// Items matching the search, in id order
pub fn query_items<'d>(description: &'d Description, search: &ItemSearch) -> Vec<&'d Item> {
    let items = description.items();
    let key = search.key.as_deref().filter(|key| !key.is_empty());
    let type_name = search.type_name.as_deref().filter(|name| !name.is_empty());
    let (criterion, found): (String, Vec<&Item>) = if let Some(id) = search.id {
        (format!("id {}", id), items.get(id as usize).into_iter().collect())
    } else if let Some(key) = key {
        (
            format!("key '{}'", key),
            items.iter().filter(|item| item.key() == key).collect(),
        )
    } else if let Some(type_name) = type_name {
        (
            format!("type '{}'", type_name),
            items.iter().filter(|item| item.type_name() == type_name).collect(),
        )
    } else if let Some(limiter) = search.limiter {
        (
            format!("limiter '{}'", limiter),
            items.iter().filter(|item| item.limiter() == limiter).collect(),
        )
    } else {
        ("empty search".to_string(), Vec::new())
    };
    description.logs().log(
        LOG_MODULE,
        &format!("item query {}: {} found", criterion, found.len()),
        LogLevel::Trace,
    );
    found
}

// =============================================================================
// Data queries
// =============================================================================

/// Resolves `a/b/c` or `a.b.c` from the tree's roots. Misses log and return `None`.
pub fn resolve_by_path(description: &Description, tree: &DataTree, path: &str) -> Option<NodeId> {
    let miss = |message: String| {
        description.logs().log(LOG_MODULE, &message, LogLevel::Lib);
        None
    };
    if path.is_empty() || path == "." || path == "/" {
        return None;
    }

    let normalized = path.replace('.', "/");
    let mut segments = normalized.split('/').skip_while(|segment| segment.is_empty());
    let Some(first) = segments.next() else {
        return miss(format!("error finding sdKey: {}", path));
    };
    let Some(mut current) = tree.root(first) else {
        return miss(format!("error finding sdKey: {}", first));
    };

    let mut walked = first.to_string();
    for segment in segments {
        match tree.child(current, segment) {
            Some(next) => {
                current = next;
                walked.push('.');
                walked.push_str(segment);
            }
            None => return miss(format!("on {}; error finding {}", walked, segment)),
        }
    }
    Some(current)
}

/// Nodes to search: the subtree at `path`, or the whole tree
fn scope(description: &Description, tree: &DataTree, path: Option<&str>) -> Vec<NodeId> {
    match path {
        Some(path) => resolve_by_path(description, tree, path)
            .map(|node| tree.descendants(node))
            .unwrap_or_default(),
        None => tree.iter().collect(),
    }
}

/// Whether a node satisfies the relationship its search names
fn check_entity_data(
    description: &Description,
    tree: &DataTree,
    node: NodeId,
    entity: &Entity,
    criterion: EntityCriterion<'_>,
) -> bool {
    let entity_of = |id: NodeId| tree.node(id).map(|node| node.entity_id());
    match criterion {
        EntityCriterion::Children(ids) => tree
            .children(node)
            .filter_map(entity_of)
            .any(|child| ids.contains(&child)),
        EntityCriterion::Parents(ids) => {
            match tree.node(node).and_then(|data| data.parent()) {
                Some(parent) => entity_of(parent).is_some_and(|parent| ids.contains(&parent)),
                None => ids.contains(&0),
            }
        }
        EntityCriterion::Items(ids) => entity
            .item_refs()
            .iter()
            .filter(|(_, item_id)| ids.contains(*item_id))
            .any(|(key, _)| tree.field(description, node, key).is_some()),
        _ => true,
    }
}

/// Nodes whose entity matches the search, depth first
pub fn data_by_entity(
    description: &Description,
    tree: &DataTree,
    search: &EntitySearch,
    path: Option<&str>,
) -> Vec<NodeId> {
    let Some(criterion) = search.criterion() else {
        return Vec::new();
    };
    let entities: Vec<&Entity> = query_entities(description, search);
    let found: Vec<NodeId> = scope(description, tree, path)
        .into_iter()
        .filter(|node| {
            let Some(data) = tree.node(*node) else {
                return false;
            };
            let Some(entity) = entities.iter().find(|e| e.id() == data.entity_id()) else {
                return false;
            };
            !search.check_data || check_entity_data(description, tree, *node, entity, criterion)
        })
        .collect();
    description.logs().log(
        LOG_MODULE,
        &format!("data by entity: {} entities, {} nodes", entities.len(), found.len()),
        LogLevel::Debug,
    );
    found
}

/// Nodes whose entity carries any matching item, depth first
pub fn data_by_item(
    description: &Description,
    tree: &DataTree,
    search: &ItemSearch,
    path: Option<&str>,
) -> Vec<NodeId> {
    let keys: HashSet<&str> = query_items(description, search)
        .into_iter()
        .map(Item::key)
        .collect();
    if keys.is_empty() {
        return Vec::new();
    }
    let found: Vec<NodeId> = scope(description, tree, path)
        .into_iter()
        .filter(|node| {
            tree.node(*node)
                .and_then(|data| description.entity(data.entity_id()))
                .is_some_and(|entity| keys.iter().any(|key| entity.item_ref(key).is_some()))
        })
        .collect();
    description.logs().log(
        LOG_MODULE,
        &format!("data by item: {} items, {} nodes", keys.len(), found.len()),
        LogLevel::Debug,
    );
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataDoc;
    use crate::description::DescriptionDoc;
    use crate::entity::PropValue;
    use crate::host::{Host, HostOptions};
    use crate::log::{LogManager, LogMode};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        _host: Host,
        logs: Arc<LogManager>,
        description: Description,
        tree: DataTree,
    }

    fn fixture() -> Fixture {
        let logs = Arc::new(LogManager::new(LogMode::Test));
        let host = Host::new(HostOptions::default().with_logs(logs.clone())).unwrap();
        let doc: DescriptionDoc = serde_json::from_value(json!({
            "sdInfo": {"name": "siteMap", "uniqId": "3rh28R-Qlbx4-i6Xy-gqB03MA", "created": 1, "modified": 1},
            "items": [
                {"sdId": 2, "sdKey": "routeTitle", "type": "strd"},
                {"sdId": 3, "sdKey": "compClassName", "type": "strd", "limiter": "req"}
            ],
            "graph": [
                {"sdId": 1, "sdKey": "comp", "parentIds": [0, 2], "sdItems": [3], "sdProps": {"route": false}},
                {"sdId": 2, "sdKey": "route-comp", "parentIds": [0, 2], "extendIds": [1], "sdItems": [2],
                 "sdProps": {"route": true, "tier": 1}, "childIds": [1, 2, 3]},
                {"sdId": 3, "sdKey": "data-obj", "parentIds": [1, 2, 3], "sdItems": [2],
                 "limiter": "one_none"}
            ]
        }))
        .unwrap();
        let description = Description::build(doc, &host).unwrap();
        let home = DataDoc::new(2, "home")
            .with_field("compClassName", "HomeView")
            .with_child(DataDoc::new(1, "home_page1").with_field("compClassName", "PageOne"))
            .with_child(
                DataDoc::new(2, "about")
                    .with_field("compClassName", "AboutView")
                    .with_field("routeTitle", "About")
                    .with_child(DataDoc::new(3, "extra").with_field("routeTitle", "More")),
            );
        let tree = DataTree::build(&host, &description, vec![home], true).unwrap();
        Fixture {
            _host: host,
            logs,
            description,
            tree,
        }
    }

    #[test]
    fn test_criterion_priority() {
        let search = EntitySearch {
            key: Some("comp".into()),
            child_ids: vec![1],
            ..Default::default()
        };
        assert_eq!(search.criterion(), Some(EntityCriterion::Key("comp")));
        assert_eq!(
            EntitySearch::items([2]).criterion(),
            Some(EntityCriterion::Items(&[2]))
        );
        assert_eq!(EntitySearch::default().criterion(), None);
    }

    #[test]
    fn test_query_entities() {
        let f = fixture();
        let keys = |search: EntitySearch| -> Vec<String> {
            query_entities(&f.description, &search)
                .into_iter()
                .map(|e| e.key().to_string())
                .collect()
        };
        assert_eq!(keys(EntitySearch::id(0)), vec!["sdGraphZero"]);
        assert_eq!(keys(EntitySearch::key("comp")), vec!["comp"]);
        assert_eq!(keys(EntitySearch::limiter(Limiter::OneOrNone)), vec!["data-obj"]);
        assert_eq!(keys(EntitySearch::parents([2])), vec!["comp", "route-comp", "data-obj"]);
        assert_eq!(keys(EntitySearch::extends([1])), vec!["route-comp"]);
        assert_eq!(keys(EntitySearch::children([1, 3])), vec!["route-comp"]);
        assert_eq!(keys(EntitySearch::items([2])), vec!["route-comp", "data-obj"]);

        let mut route = SdProps::new();
        route.insert("route".into(), PropValue::Bool(true));
        assert_eq!(keys(EntitySearch::props(route.clone())), vec!["route-comp"]);
        assert!(keys(EntitySearch::props(route).with_check_data()).is_empty());
    }

    #[test]
    fn test_query_items() {
        let f = fixture();
        let keys = |search: ItemSearch| -> Vec<String> {
            query_items(&f.description, &search)
                .into_iter()
                .map(|i| i.key().to_string())
                .collect()
        };
        assert_eq!(keys(ItemSearch::id(1)), vec!["sdKey"]);
        assert_eq!(keys(ItemSearch::type_name("strd")), vec!["routeTitle", "compClassName"]);
        assert_eq!(keys(ItemSearch::limiter(Limiter::Required)), vec!["compClassName"]);
        assert!(keys(ItemSearch::key("missing")).is_empty());

        let history = f.logs.history(LOG_MODULE);
        let last = history.last().unwrap();
        assert_eq!(last.message, "item query key 'missing': 0 found");
        assert_eq!(last.level, LogLevel::Trace);
    }

    #[test]
    fn test_resolve_by_path() {
        let f = fixture();
        let dotted = resolve_by_path(&f.description, &f.tree, "home.home_page1");
        let slashed = resolve_by_path(&f.description, &f.tree, "/home/home_page1");
        assert!(dotted.is_some());
        assert_eq!(dotted, slashed);
        assert_eq!(
            resolve_by_path(&f.description, &f.tree, "home.about.extra").map(|n| f.tree.path(n)),
            Some("home/about/extra".to_string())
        );
        assert_eq!(resolve_by_path(&f.description, &f.tree, "home.nonexistent"), None);
        assert_eq!(resolve_by_path(&f.description, &f.tree, "."), None);
        assert_eq!(resolve_by_path(&f.description, &f.tree, "/"), None);
    }

    #[test]
    fn test_data_by_entity() {
        let f = fixture();
        let keys = |nodes: Vec<NodeId>| -> Vec<String> {
            nodes
                .into_iter()
                .map(|n| f.tree.node(n).unwrap().key().to_string())
                .collect()
        };
        let route = EntitySearch::key("route-comp");
        assert_eq!(keys(data_by_entity(&f.description, &f.tree, &route, None)), vec!["home", "about"]);
        assert_eq!(
            keys(data_by_entity(&f.description, &f.tree, &route, Some("home.about"))),
            vec!["about"]
        );
        assert!(data_by_entity(&f.description, &f.tree, &route, Some("nowhere")).is_empty());

        let parents = EntitySearch::parents([0]).with_check_data();
        assert_eq!(keys(data_by_entity(&f.description, &f.tree, &parents, None)), vec!["home"]);

        let with_data_child = EntitySearch::children([3]).with_check_data();
        assert_eq!(
            keys(data_by_entity(&f.description, &f.tree, &with_data_child, None)),
            vec!["about"]
        );

        let titled = EntitySearch::items([2]).with_check_data();
        assert_eq!(
            keys(data_by_entity(&f.description, &f.tree, &titled, None)),
            vec!["about", "extra"]
        );
    }

    #[test]
    fn test_data_by_item() {
        let f = fixture();
        let found = data_by_item(&f.description, &f.tree, &ItemSearch::key("routeTitle"), None);
        let keys: Vec<&str> = found.iter().map(|n| f.tree.node(*n).unwrap().key()).collect();
        assert_eq!(keys, vec!["home", "about", "extra"]);
    }
}
