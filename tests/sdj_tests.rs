//! End-to-end tests over JSON fixtures
//!
//! Documents are built through the public API the way a caller would:
//! one host per test, fixtures loaded with `include_str!`.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sdj_schema::{
    DataDoc, DataTree, Description, DescriptionDoc, Document, EntityDoc, EntitySearch, Host,
    HostOptions, ItemSearch, Lexicon, LexiconDoc, LogMode, SdjConfig, SdjError,
};

fn host() -> Host {
    Host::new(HostOptions::default().with_log_mode(LogMode::Test)).unwrap()
}

fn site_map() -> Value {
    serde_json::from_str(include_str!("fixtures/site_map.json")).unwrap()
}

fn basics_lexicon() -> Lexicon {
    let doc: LexiconDoc =
        serde_json::from_str(include_str!("fixtures/basics_lexicon.json")).unwrap();
    Lexicon::from_doc(doc)
}

fn keys(document: &Document<'_>, nodes: &[sdj_schema::NodeId]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| document.tree().node(*node).unwrap().key().to_string())
        .collect()
}

// =============================================================================
// Serialization
// =============================================================================

#[test]
fn test_fixture_round_trip() {
    let first_host = host();
    let document = Document::from_json(site_map(), &first_host).unwrap();
    let serialized = document.to_json().unwrap();

    let second_host = host();
    let reparsed = Document::from_json(serialized.clone(), &second_host).unwrap();
    assert_eq!(reparsed.to_json().unwrap(), serialized);
}

#[test]
fn test_fixture_serialized_shape() {
    let host = host();
    let document = Document::from_json(site_map(), &host).unwrap();
    let out = document.to_json().unwrap();

    assert_eq!(out["sdInfo"]["name"], "siteDocument");
    assert_eq!(out["description"]["items"].as_array().unwrap().len(), 3);
    assert_eq!(out["description"]["graph"].as_array().unwrap().len(), 7);
    assert_eq!(out["description"]["graph"][1]["sdProps"], json!({"route": true}));
    assert_eq!(out["data"][1]["sdChildren"][2]["sdKey"], "sdIndex2");
}

// =============================================================================
// Graph assembly
// =============================================================================

#[test]
fn test_dense_ids() {
    let host = host();
    let document = Document::from_json(site_map(), &host).unwrap();
    let description = document.description();

    for (index, entity) in description.entities().iter().enumerate() {
        assert_eq!(entity.id() as usize, index);
    }
    for (index, item) in description.items().iter().enumerate() {
        assert_eq!(item.id() as usize, index);
    }
    assert_eq!(description.entities()[0].key(), "sdGraphZero");
    assert_eq!(description.items()[1].key(), "sdKey");
}

#[test]
fn test_extend_cycle_rejected() {
    let host = host();
    let mut doc: DescriptionDoc = serde_json::from_value(site_map()["description"].clone()).unwrap();
    doc.graph[0] = EntityDoc::new(1, "comp").with_items([3]).with_extends([2]);

    let err = Description::build(doc, &host).unwrap_err();
    assert!(matches!(err, SdjError::CircularReference { .. }), "got {:?}", err);
}

#[test]
fn test_inherited_items_resolved() {
    let host = host();
    let document = Document::from_json(site_map(), &host).unwrap();
    let route = document.description().entity_by_key("route-comp").unwrap();

    assert_eq!(route.item_ref("compClassName"), Some(3));
    assert_eq!(route.item_ref("routeTitle"), Some(2));
    assert_eq!(route.item_ref("pageTitle"), None);
}

// =============================================================================
// Data validation
// =============================================================================

fn footer(meta_count: usize) -> DataDoc {
    (0..meta_count).fold(
        DataDoc::new(7, "footer").with_field("pageTitle", "Footer"),
        |section, n| {
            section.with_child(
                DataDoc::new(6, format!("meta_{}", n)).with_field("routeTitle", "Meta"),
            )
        },
    )
}

#[test]
fn test_required_hidden_cardinality() {
    let host = host();
    let document = Document::from_json(site_map(), &host).unwrap();
    let description = document.description();

    assert!(DataTree::build(&host, description, vec![footer(1)], true).is_ok());
    for count in [0, 2] {
        match DataTree::build(&host, description, vec![footer(count)], true) {
            Err(SdjError::Validation(violation)) => {
                assert_eq!(violation.subject, "section");
                assert_eq!(violation.detail, "meta-info");
            }
            other => panic!("{} children: expected violation, got {:?}", count, other),
        }
    }
}

#[test]
fn test_sequential_index() {
    let host = host();
    let document = Document::from_json(site_map(), &host).unwrap();
    let description = document.description();
    let pages = |keys: &[&str]| {
        keys.iter().fold(DataDoc::new(4, "pages"), |pages, key| {
            pages.with_child(DataDoc::new(5, *key))
        })
    };

    let ordered = pages(&["sdIndex0", "sdIndex1", "sdIndex2"]);
    assert!(DataTree::build(&host, description, vec![ordered], true).is_ok());

    let reordered = pages(&["sdIndex1", "sdIndex0", "sdIndex2"]);
    match DataTree::build(&host, description, vec![reordered], true) {
        Err(SdjError::Validation(violation)) => {
            assert_eq!(violation.reason, "KEY_IDX out of order");
            assert_eq!(violation.detail, "sdIndex1!=sdIndex0");
        }
        other => panic!("expected index violation, got {:?}", other),
    }

    let advisory = DataTree::build(
        &host,
        description,
        vec![pages(&["sdIndex1", "sdIndex0"])],
        false,
    )
    .unwrap();
    assert!(!advisory.is_valid(description, advisory.roots()[0]));
}

#[test]
fn test_end_to_end_required_item() {
    let host = host();
    let doc: DescriptionDoc = serde_json::from_value(json!({
        "sdInfo": {"name": "compSite", "uniqId": "Rt51bN-8kLp2-Ws3q-Yx7mU4c", "created": 1, "modified": 1},
        "items": [
            {"sdId": 2, "sdKey": "routeTitle", "type": "strd"},
            {"sdId": 3, "sdKey": "compClassName", "type": "strd", "limiter": "req"}
        ],
        "graph": [
            {"sdId": 1, "sdKey": "comp", "sdItems": [3]},
            {"sdId": 2, "sdKey": "route-comp", "extendIds": [1], "sdProps": {"route": true}, "childIds": [1, 2, 3]},
            {"sdId": 3, "sdKey": "data-obj", "parentIds": [1, 2, 3], "sdItems": [2]}
        ]
    }))
    .unwrap();
    let description = Description::build(doc, &host).unwrap();

    let err = DataTree::build(&host, &description, vec![DataDoc::new(1, "bare_comp")], true)
        .unwrap_err();
    match err {
        SdjError::Validation(violation) => {
            assert_eq!(violation.triple(), ("compClassName", "required", "strd"));
            assert_eq!(
                violation.to_string(),
                "SdjData key 'comp' validate item 'compClassName' is 'required' should be type 'strd'"
            );
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

// =============================================================================
// Addressing and search
// =============================================================================

#[test]
fn test_path_resolution() {
    let host = host();
    let document = Document::from_json(site_map(), &host).unwrap();

    let dotted = document.data_by_path("home.home_page1").unwrap();
    assert_eq!(Some(dotted), document.data_by_path("home/home_page1"));
    assert_eq!(Some(dotted), document.data_by_path("/home/home_page1"));
    assert_eq!(document.tree().path(dotted), "home/home_page1");
    assert_eq!(document.data_by_path("home.nonexistent"), None);
    assert_eq!(document.data_by_path("."), None);
}

#[test]
fn test_data_queries() {
    let host = host();
    let document = Document::from_json(site_map(), &host).unwrap();

    let routes = document.data_by_entity(&EntitySearch::key("route-comp"), None);
    assert_eq!(keys(&document, &routes), vec!["home", "about"]);

    let under_pages = document.data_by_entity(&EntitySearch::key("page"), Some("pages"));
    assert_eq!(keys(&document, &under_pages), vec!["sdIndex0", "sdIndex1", "sdIndex2"]);

    let titled = document.data_by_item(&ItemSearch::key("pageTitle"), None);
    assert_eq!(titled.len(), 5);

    let with_contact = document.data_by_entity(&EntitySearch::children([3]).with_check_data(), None);
    assert_eq!(keys(&document, &with_contact), vec!["about"]);
}

// =============================================================================
// Lock lifecycle
// =============================================================================

#[test]
fn test_lock_round_trip_and_invalid_edit() {
    let host = host();
    let mut document = Document::from_json(site_map(), &host).unwrap();
    let original = document.description().fingerprint();

    assert!(document.lock(false).unwrap());
    assert!(document.lock(true).unwrap());
    assert_eq!(document.description().fingerprint(), original);

    document.lock(false).unwrap();
    document
        .builder_mut()
        .unwrap()
        .replace_entity(EntityDoc::new(7, "section").with_items([4]).with_children([5]));
    assert!(matches!(document.lock(true), Err(SdjError::Lock(_))));
    assert!(!document.is_locked());
    assert_eq!(document.description().fingerprint(), original);
}

// =============================================================================
// Lexicons
// =============================================================================

#[test]
fn test_lexicon_document() {
    let host = host_with_basics();
    let mut blog: Value = serde_json::from_str(include_str!("fixtures/blog.json")).unwrap();
    let document = Document::from_json(blog.clone(), &host).unwrap();
    let description = document.description();

    assert_eq!(description.lexicons(), ["basics".to_string()]);
    assert_eq!(description.entity_by_key("article").unwrap().id(), 1);
    assert_eq!(description.item_by_key("bodyText").unwrap().id(), 2);

    let out = document.to_json().unwrap();
    assert_eq!(out["description"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(out["description"]["graph"].as_array().unwrap().len(), 1);
    assert!(out["data"].as_array().unwrap().is_empty());

    blog["lexicons"] = json!(["missing"]);
    let other_host = host_with_basics();
    assert!(matches!(
        Document::from_json(blog, &other_host),
        Err(SdjError::LexiconNotFound(_))
    ));
}

fn host_with_basics() -> Host {
    host_with_lexicon(basics_lexicon(), true)
}

fn host_with_lexicon(lexicon: Lexicon, strict: bool) -> Host {
    let mut config = SdjConfig::default();
    config.validation.strict = strict;
    Host::new(
        HostOptions::default()
            .with_config(config)
            .with_log_mode(LogMode::Test)
            .with_lexicon(lexicon),
    )
    .unwrap()
}

fn blog() -> Value {
    serde_json::from_str(include_str!("fixtures/blog.json")).unwrap()
}

#[test]
fn test_graph_verify_rejects_description() {
    let host = host_with_lexicon(basics_lexicon().with_graph_verify(|_| false), true);
    match Document::from_json(blog(), &host) {
        Err(SdjError::GraphVerify(name)) => assert_eq!(name, "basics"),
        other => panic!("expected graphVerify failure, got {:?}", other.map(|_| ())),
    }

    let host = host_with_lexicon(
        basics_lexicon().with_graph_verify(|graph| graph.iter().any(|e| e.key == "article")),
        true,
    );
    assert!(Document::from_json(blog(), &host).is_ok());
}

#[test]
fn test_data_verify_on_build() {
    let strict = host_with_lexicon(basics_lexicon().with_data_verify(|_, _| false), true);
    match Document::from_json(blog(), &strict) {
        Err(SdjError::DataVerify(name)) => assert_eq!(name, "basics"),
        other => panic!("expected dataVerify failure, got {:?}", other.map(|_| ())),
    }

    let advisory = host_with_lexicon(basics_lexicon().with_data_verify(|_, _| false), false);
    let mut document = Document::from_json(blog(), &advisory).unwrap();
    assert!(!document.is_locked());
    assert!(document.builder_mut().is_some());
    assert!(matches!(document.lock(true), Err(SdjError::Lock(_))));
    assert!(!document.is_locked());
}

#[test]
fn test_data_verify_blocks_relock() {
    let accept = Arc::new(AtomicBool::new(true));
    let verdict = accept.clone();
    let host = host_with_lexicon(
        basics_lexicon().with_data_verify(move |_, _| verdict.load(Ordering::SeqCst)),
        true,
    );
    let mut document = Document::from_json(blog(), &host).unwrap();
    assert!(document.is_locked());

    assert!(document.lock(false).unwrap());
    accept.store(false, Ordering::SeqCst);
    assert!(matches!(document.lock(true), Err(SdjError::Lock(_))));
    assert!(!document.is_locked());

    accept.store(true, Ordering::SeqCst);
    assert!(document.lock(true).unwrap());
    assert!(document.is_locked());
}

#[test]
fn test_generated_lexicon() {
    let blog: DescriptionDoc =
        serde_json::from_str(include_str!("fixtures/blog.json")).unwrap();
    let lexicon = Lexicon::from_description(&blog);

    assert_eq!(lexicon.name(), "blogsite_lexicon");
    assert_eq!(lexicon.items().len(), 1);
    assert_eq!(lexicon.entities().len(), 1);
}
