//! Structural and value validation of data nodes
//!
//! Checks collect [`Violation`]s into a [`Violations`] list. Strict callers
//! turn the first one into an error; advisory callers log every one and get
//! `false` back.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::data::{DataTree, NodeId};
use crate::description::Description;
use crate::entity::Entity;
use crate::error::{Result, SdjError};
use crate::limiter::Limiter;
use crate::log::{LogLevel, LogSink};
use crate::patterns::index_key;
use crate::SdId;

const LOG_MODULE: &str = "validate";

// === Structural reasons ===
pub const REQUIRES_PARENT: &str = "requires parent";
pub const PARENT_NOT_ALLOWED: &str = "entity does not allow parent";
pub const CHILD_NOT_ALLOWED_BY_PARENT: &str = "parent does not allow child";
pub const CHILD_NOT_ALLOWED: &str = "doesn't allow child";
pub const UNKNOWN_CHILD: &str = "unknown child entity";
pub const INDEX_ORDER: &str = "KEY_IDX out of order";

// === Value reasons ===
pub const REQUIRED: &str = "required";
pub const INVALID: &str = "invalid";

// =============================================================================
// Violation
// =============================================================================

/// Which check produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Data,
    Struct,
}

/// A single `(subject, reason, detail)` finding against an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Entity the node was checked against
    pub entity: String,
    /// Item key for value checks, node or entity key for structural ones
    pub subject: String,
    pub reason: String,
    /// Item type for value checks, the offending key or entity otherwise
    pub detail: String,
}

impl Violation {
    pub fn data(entity: &str, item: &str, reason: &str, type_name: &str) -> Self {
        Self {
            kind: ViolationKind::Data,
            entity: entity.to_string(),
            subject: item.to_string(),
            reason: reason.to_string(),
            detail: type_name.to_string(),
        }
    }

    pub fn structure(
        entity: &str,
        subject: &str,
        reason: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: ViolationKind::Struct,
            entity: entity.to_string(),
            subject: subject.to_string(),
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    /// The triple as reported
    pub fn triple(&self) -> (&str, &str, &str) {
        (&self.subject, &self.reason, &self.detail)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::Data => write!(
                f,
                "SdjData key '{}' validate item '{}' is '{}' should be type '{}'",
                self.entity, self.subject, self.reason, self.detail
            ),
            ViolationKind::Struct => write!(
                f,
                "Entity '{}' with data '{}' error '{}' with data/ent '{}'",
                self.entity, self.subject, self.reason, self.detail
            ),
        }
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Ordered list of violations from one check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Violations {
    items: Vec<Violation>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.items.push(violation);
    }

    pub fn merge(&mut self, other: Violations) {
        self.items.extend(other.items);
    }

    pub fn all(&self) -> &[Violation] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Strict: the first violation becomes the error.
    /// Advisory: every violation is logged and `Ok(false)` returned.
    pub fn into_result(self, strict: bool, logs: &dyn LogSink) -> Result<bool> {
        if strict {
            if let Some(first) = self.items.into_iter().next() {
                return Err(SdjError::Validation(first));
            }
            return Ok(true);
        }
        for violation in &self.items {
            logs.log(LOG_MODULE, &violation.to_string(), LogLevel::Lib);
        }
        Ok(self.items.is_empty())
    }
}

impl IntoIterator for Violations {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

// =============================================================================
// Value checks
// =============================================================================

/// Checks every effective item of `entity` against a node's values.
///
/// `sdId` and `sdKey` are read from `id` and `key`, everything else from `fields`.
pub fn data_violations(
    description: &Description,
    entity: &Entity,
    key: &str,
    fields: &Map<String, Value>,
) -> Violations {
    let id_value = Value::from(entity.id());
    let key_value = Value::from(key);
    let mut violations = Violations::new();

    for (item_key, item_id) in entity.item_refs() {
        let Some(item) = description.item(*item_id) else {
            continue;
        };
        let value = match *item_id {
            0 => Some(&id_value),
            1 => Some(&key_value),
            _ => fields.get(item_key).filter(|value| !value.is_null()),
        };
        let reason = match value {
            None if item.is_required() => Some(REQUIRED),
            Some(value) if !item.validator().valid(value) => Some(INVALID),
            _ => None,
        };
        if let Some(reason) = reason {
            violations.push(Violation::data(entity.key(), item_key, reason, item.type_name()));
        }
    }
    violations
}

/// Value validation of a single node's fields
pub fn valid_data(
    description: &Description,
    entity: &Entity,
    key: &str,
    fields: &Map<String, Value>,
    strict: bool,
) -> Result<bool> {
    data_violations(description, entity, key, fields).into_result(strict, description.logs())
}

// =============================================================================
// Structural checks
// =============================================================================

/// Parent context: whether `entity` may sit under `parent` (or at the root)
pub fn parent_violations(entity: &Entity, parent: Option<&Entity>) -> Violations {
    let mut violations = Violations::new();
    match parent {
        None if !entity.allows_parent(0) => violations.push(Violation::structure(
            entity.key(),
            entity.key(),
            REQUIRES_PARENT,
            "parent undefined",
        )),
        Some(parent) if !entity.allows_parent(parent.id()) => violations.push(
            Violation::structure(entity.key(), entity.key(), PARENT_NOT_ALLOWED, parent.key()),
        ),
        Some(parent) if !parent.allows_child(entity.id()) => violations.push(
            Violation::structure(entity.key(), parent.key(), CHILD_NOT_ALLOWED_BY_PARENT, entity.key()),
        ),
        _ => {}
    }
    violations
}

/// Children of a node: allowed entities, sequential keys and cardinality.
///
/// `children` are `(entity id, key)` pairs in order.
pub fn children_violations(
    description: &Description,
    entity: &Entity,
    key: &str,
    children: &[(SdId, &str)],
) -> Violations {
    let mut violations = Violations::new();
    let mut counts: BTreeMap<SdId, usize> =
        entity.child_refs().iter().map(|id| (*id, 0)).collect();
    let indexed = entity.limiter() == Limiter::SequentialIndexed;

    for (index, (child_id, child_key)) in children.iter().enumerate() {
        match description.entity(*child_id) {
            None => violations.push(Violation::structure(
                entity.key(),
                entity.key(),
                UNKNOWN_CHILD,
                *child_key,
            )),
            Some(_) if !entity.allows_child(*child_id) => violations.push(
                Violation::structure(entity.key(), entity.key(), CHILD_NOT_ALLOWED, child_id.to_string()),
            ),
            Some(child) if child.limiter() != Limiter::None => {
                *counts.entry(*child_id).or_default() += 1;
            }
            Some(_) => {}
        }
        if indexed && *child_key != index_key(index) {
            violations.push(Violation::structure(
                entity.key(),
                key,
                INDEX_ORDER,
                format!("{}!={}", child_key, index_key(index)),
            ));
        }
    }

    for (child_id, count) in counts {
        let Some(child) = description.entity(child_id) else {
            continue;
        };
        if let Some(reason) = child.limiter().check_count(count) {
            violations.push(Violation::structure(
                entity.key(),
                entity.key(),
                format!("{} ({})", reason, count),
                child.key(),
            ));
        }
    }
    violations
}

/// Full structural check of one node in a tree
pub fn struct_violations(description: &Description, tree: &DataTree, node: NodeId) -> Violations {
    let mut violations = Violations::new();
    let Some(data) = tree.node(node) else {
        return violations;
    };
    let Some(entity) = description.entity(data.entity_id()) else {
        violations.push(Violation::structure(
            "",
            data.key(),
            UNKNOWN_CHILD,
            data.entity_id().to_string(),
        ));
        return violations;
    };
    let parent = data
        .parent()
        .and_then(|parent| tree.node(parent))
        .and_then(|parent| description.entity(parent.entity_id()));

    violations.merge(parent_violations(entity, parent));
    let children: Vec<(SdId, &str)> = tree
        .children(node)
        .filter_map(|child| tree.node(child))
        .map(|child| (child.entity_id(), child.key()))
        .collect();
    violations.merge(children_violations(description, entity, data.key(), &children));
    violations
}

/// Structural validation of a single node
pub fn valid_struct(
    description: &Description,
    tree: &DataTree,
    node: NodeId,
    strict: bool,
) -> Result<bool> {
    struct_violations(description, tree, node).into_result(strict, description.logs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataDoc;
    use crate::description::DescriptionDoc;
    use crate::host::{Host, HostOptions};
    use crate::log::{LogManager, LogMode};
    use serde_json::json;
    use std::sync::Arc;

    fn site_map() -> (Arc<LogManager>, Host, Description) {
        let logs = Arc::new(LogManager::new(LogMode::Test).with_max_logs(None));
        let host = Host::new(HostOptions::default().with_logs(logs.clone())).unwrap();
        let doc: DescriptionDoc = serde_json::from_value(json!({
            "sdInfo": {"name": "siteMap", "uniqId": "3rh28R-Qlbx4-i6Xy-gqB03MA", "created": 1, "modified": 1},
            "items": [
                {"sdId": 2, "sdKey": "routeTitle", "type": "strd"},
                {"sdId": 3, "sdKey": "compClassName", "type": "strd", "limiter": "req"}
            ],
            "graph": [
                {"sdId": 1, "sdKey": "comp", "sdItems": [3]},
                {"sdId": 2, "sdKey": "data-obj", "parentIds": [1, 3], "sdItems": [2]},
                {"sdId": 3, "sdKey": "pages", "limiter": "sdj_index", "sdItems": [2], "childIds": [2]}
            ]
        }))
        .unwrap();
        let description = Description::build(doc, &host).unwrap();
        (logs, host, description)
    }

    fn logged(logs: &LogManager, message: &str) -> bool {
        logs.history(LOG_MODULE).iter().any(|detail| detail.message == message)
    }

    #[test]
    fn test_violation_messages() {
        let data = Violation::data("comp", "compClassName", REQUIRED, "strd");
        assert_eq!(data.triple(), ("compClassName", "required", "strd"));
        assert_eq!(
            data.to_string(),
            "SdjData key 'comp' validate item 'compClassName' is 'required' should be type 'strd'"
        );

        let structure = Violation::structure("pages", "pages", INDEX_ORDER, "sdIndex2!=sdIndex1");
        assert_eq!(
            structure.to_string(),
            "Entity 'pages' with data 'pages' error 'KEY_IDX out of order' with data/ent 'sdIndex2!=sdIndex1'"
        );
    }

    #[test]
    fn test_into_result_modes() {
        let logs = LogManager::new(LogMode::Test);
        let mut violations = Violations::new();
        violations.push(Violation::data("comp", "compClassName", REQUIRED, "strd"));
        violations.push(Violation::data("comp", "routeTitle", INVALID, "strd"));

        assert!(!violations.clone().into_result(false, &logs).unwrap());
        assert_eq!(logs.history(LOG_MODULE).len(), 2);

        match violations.into_result(true, &logs) {
            Err(SdjError::Validation(first)) => assert_eq!(first.subject, "compClassName"),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(Violations::new().into_result(true, &logs).unwrap());
    }

    #[test]
    fn test_valid_data() {
        let (logs, _host, description) = site_map();
        let comp = description.entity_by_key("comp").unwrap();

        let mut fields = Map::new();
        fields.insert("compClassName".into(), json!("HomeView"));
        assert!(valid_data(&description, comp, "home", &fields, true).unwrap());
        assert!(valid_data(&description, comp, "home", &fields, false).unwrap());

        let empty = Map::new();
        assert!(!valid_data(&description, comp, "home", &empty, false).unwrap());
        assert!(logged(
            &logs,
            "SdjData key 'comp' validate item 'compClassName' is 'required' should be type 'strd'"
        ));
        match valid_data(&description, comp, "home", &empty, true) {
            Err(SdjError::Validation(violation)) => {
                assert_eq!(violation.triple(), ("compClassName", REQUIRED, "strd"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        fields.insert("compClassName".into(), json!(12));
        assert!(!valid_data(&description, comp, "home", &fields, false).unwrap());
    }

    #[test]
    fn test_valid_struct() {
        let (logs, host, description) = site_map();
        let pages = DataDoc::new(3, "pages")
            .with_child(DataDoc::new(2, "sdIndex1"))
            .with_child(DataDoc::new(2, "sdIndex0"));
        let tree = DataTree::build(&host, &description, vec![pages], false).unwrap();
        let root = tree.roots()[0];
        let first = tree.child(root, 0_usize).unwrap();

        assert!(valid_struct(&description, &tree, first, true).unwrap());
        assert!(!valid_struct(&description, &tree, root, false).unwrap());
        assert!(logged(
            &logs,
            "Entity 'pages' with data 'pages' error 'KEY_IDX out of order' with data/ent 'sdIndex1!=sdIndex0'"
        ));
        match valid_struct(&description, &tree, root, true) {
            Err(SdjError::Validation(violation)) => {
                assert_eq!(violation.reason, INDEX_ORDER);
                assert_eq!(violation.detail, "sdIndex1!=sdIndex0");
            }
            other => panic!("expected structure error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_entity_advisory_and_strict() {
        let (logs, host, description) = site_map();
        let stray = || DataDoc::new(9, "stray").with_field("routeTitle", "Lost");

        let tree = DataTree::build(&host, &description, vec![stray()], false).unwrap();
        let root = tree.roots()[0];
        assert_eq!(tree.node(root).unwrap().entity_id(), 9);
        assert!(!tree.is_valid(&description, root));
        assert!(!valid_struct(&description, &tree, root, false).unwrap());
        assert!(logged(
            &logs,
            "Entity '' with data 'stray' error 'unknown child entity' with data/ent '9'"
        ));
        assert_eq!(tree.to_docs(), vec![stray()]);

        assert!(matches!(
            DataTree::build(&host, &description, vec![stray()], true),
            Err(SdjError::UnknownEntity { id: 9, .. })
        ));
    }
}
