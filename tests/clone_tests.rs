/// Clone tests
///
/// Recursive cloning: identity reset, naming, depth limits, reference
/// translation, cross-site remapping, batching of notifications and
/// failure handling.
/// Run with: cargo test --test clone_tests
mod common;

use std::sync::{Arc, Mutex};

use common::{create_doc, create_node, create_node_on_site, create_row, fixture, id, reload};
use infobase::clone::{CloneBatchScope, CloneResult, CloneSettings};
use infobase::core::{InfoError, Value};
use infobase::info::{InfoProvider, MetaFile};
use infobase::services::{ChangeAction, Notification};
use infobase::{InfoObject, InfoSession, LifecycleOperation};

fn clone(session: &InfoSession, source: &InfoObject, settings: CloneSettings) -> (InfoObject, CloneResult) {
    let mut settings = settings;
    let mut result = CloneResult::new();
    let clone = source.insert_as_clone(session, &mut settings, &mut result).unwrap();
    (clone, result)
}

fn template(session: &InfoSession, name: &str, site_id: i64) -> InfoObject {
    create_row(
        session,
        "test.template",
        &[("TemplateName", Value::from(name)), ("TemplateSiteID", Value::from(site_id))],
    )
}

#[test]
fn test_clone_resets_identity_and_uniquifies_names() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let source = create_node(&f.session, "B", Some(id(&root)));

    let (copy, result) = clone(&f.session, &source, CloneSettings::new());
    assert_ne!(id(&copy), id(&source));
    assert_ne!(copy.guid().unwrap(), source.guid().unwrap());
    assert_eq!(copy.code_name().unwrap(), Some("B_1".to_string()));
    assert_eq!(copy.display_name().unwrap(), Some("B (1)".to_string()));
    assert_eq!(copy.parent_id().unwrap(), Some(id(&root)));
    assert!(!copy.is_clone());
    assert_eq!(result.cloned_count(), 1);

    let stored = reload(&f.session, "test.node", id(&copy));
    assert_eq!(stored.id_path().unwrap(), Some(format!("/{:06}", id(&copy))));
    assert_eq!(stored.name_path().unwrap(), Some("/B_1".to_string()));
    assert_eq!(stored.order().unwrap(), Some(2));
}

#[test]
fn test_explicit_names_and_parent() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let target = create_node(&f.session, "Target", Some(id(&root)));
    let source = create_node(&f.session, "Page", Some(id(&root)));

    let (copy, _) = clone(
        &f.session,
        &source,
        CloneSettings::new()
            .parent_id(id(&target))
            .code_name("Copy")
            .display_name("Copy of page"),
    );
    assert_eq!(copy.code_name().unwrap(), Some("Copy".to_string()));
    assert_eq!(copy.display_name().unwrap(), Some("Copy of page".to_string()));
    assert_eq!(
        reload(&f.session, "test.node", id(&copy)).name_path().unwrap(),
        Some("/Target/Copy".to_string())
    );
}

#[test]
fn test_depth_limit() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    let c = create_node(&f.session, "C", Some(id(&a)));
    create_node(&f.session, "D", Some(id(&c)));

    let (_, result) = clone(&f.session, &a, CloneSettings::new().depth_limit(0));
    assert_eq!(result.clones_of_type("test.node").len(), 1);

    let (_, result) = clone(&f.session, &a, CloneSettings::new().depth_limit(1));
    assert_eq!(result.clones_of_type("test.node").len(), 2);

    let (copy, result) = clone(&f.session, &a, CloneSettings::new());
    assert_eq!(result.clones_of_type("test.node").len(), 3);
    let children = copy.children(&f.session, "test.node").unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].code_name().unwrap(), Some("C".to_string()));
    assert_eq!(children[0].display_name().unwrap(), Some("C".to_string()));
    assert_eq!(
        children[0].id_path().unwrap(),
        Some(format!("/{:06}", id(&children[0])))
    );
}

#[test]
fn test_clone_under_itself_skips_new_copy() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    create_node(&f.session, "C", Some(id(&a)));

    let (copy, result) = clone(&f.session, &a, CloneSettings::new().parent_id(id(&a)));
    assert_eq!(copy.parent_id().unwrap(), Some(id(&a)));
    assert_eq!(result.clones_of_type("test.node").len(), 2);
    assert_eq!(f.provider.row_count("test.node").unwrap(), 4);
}

#[test]
fn test_references_within_the_clone_are_translated() {
    let f = fixture();
    let outside = create_node(&f.session, "Outside", None);
    let a = create_node(&f.session, "A", None);
    let first = create_node(&f.session, "First", Some(id(&a)));
    let mut second = create_node(&f.session, "Second", Some(id(&a)));
    second.set_value("NodeLinkedNodeID", id(&first)).unwrap();
    second.update(&f.session).unwrap();
    let mut third = create_node(&f.session, "Third", Some(id(&a)));
    third.set_value("NodeLinkedNodeID", id(&outside)).unwrap();
    third.update(&f.session).unwrap();

    let (copy, result) = clone(&f.session, &a, CloneSettings::new());
    let translations: Vec<_> = result.clones_of_type("test.node");
    assert_eq!(translations.len(), 4);

    let children = copy.children(&f.session, "test.node").unwrap();
    let by_name = |name: &str| {
        children
            .iter()
            .find(|c| c.code_name().unwrap().as_deref() == Some(name))
            .unwrap()
    };
    assert_eq!(
        by_name("Second").get_value("NodeLinkedNodeID").unwrap(),
        Value::from(id(by_name("First")))
    );
    assert_eq!(
        by_name("Third").get_value("NodeLinkedNodeID").unwrap(),
        Value::from(id(&outside))
    );
}

#[test]
fn test_external_columns_and_metafiles_are_copied() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    create_doc(&f.session, "readme", id(&a), "hello");
    let mut file = MetaFile::attach(&f.session, &a, "logo.png", vec![9, 8]).unwrap();
    InfoProvider::<MetaFile>::new(&f.session).set(&mut file).unwrap();

    let (copy, result) = clone(&f.session, &a, CloneSettings::new());
    assert_eq!(result.clones_of_type("test.doc").len(), 1);
    assert_eq!(result.clones_of_type("cms.metafile").len(), 1);

    let docs = copy.children(&f.session, "test.doc").unwrap();
    assert_eq!(docs[0].get_value("DocBody").unwrap(), Value::from("hello"));
    assert_eq!(docs[0].code_name().unwrap(), Some("readme".to_string()));

    let files = copy.metafiles(&f.session).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].get_value("MetaFileName").unwrap(), Value::from("logo.png"));
    assert_eq!(files[0].get_value("MetaFileBinary").unwrap(), Value::Binary(vec![9, 8]));
    assert_eq!(f.files.paths().unwrap().len(), 4);

    let (_, result) = clone(&f.session, &a, CloneSettings::new().include_metafiles(false));
    assert!(result.clones_of_type("cms.metafile").is_empty());
}

#[test]
fn test_bindings_are_cloned() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    let tag = create_row(&f.session, "test.tag", &[("TagName", Value::from("T"))]);
    create_row(
        &f.session,
        "test.nodetag",
        &[("NodeTagNodeID", Value::from(id(&a))), ("NodeTagTagID", Value::from(id(&tag)))],
    );

    let (node_copy, _) = clone(&f.session, &a, CloneSettings::new());
    assert_eq!(node_copy.bindings(&f.session, "test.nodetag").unwrap().len(), 1);

    let (tag_copy, result) = clone(&f.session, &tag, CloneSettings::new());
    assert_eq!(tag_copy.code_name().unwrap(), Some("T_1".to_string()));
    assert_eq!(result.clones_of_type("test.nodetag").len(), 2);
    assert_eq!(tag_copy.other_bindings(&f.session, "test.nodetag").unwrap().len(), 2);
    assert_eq!(f.provider.row_count("test.nodetag").unwrap(), 4);

    let (_, result) = clone(&f.session, &tag, CloneSettings::new().include_other_bindings(false));
    assert!(result.clones_of_type("test.nodetag").is_empty());
}

#[test]
fn test_excluded_and_unlicensed_types_are_skipped() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    create_row(
        &f.session,
        "test.comment",
        &[("CommentNodeID", Value::from(id(&a))), ("CommentText", Value::from("hi"))],
    );
    create_doc(&f.session, "readme", id(&a), "x");

    f.license.deny("comments").unwrap();
    let (_, result) = clone(&f.session, &a, CloneSettings::new().exclude_type("test.doc"));
    assert_eq!(result.messages.len(), 1);
    assert!(result.messages[0].contains("test.comment"));
    assert!(result.clones_of_type("test.doc").is_empty());
    assert_eq!(f.provider.row_count("test.comment").unwrap(), 1);
    assert_eq!(f.provider.row_count("test.doc").unwrap(), 1);
}

#[test]
fn test_cross_site_references_are_remapped() {
    let f = fixture();
    let main_one = template(&f.session, "Main", 1);
    let main_two = template(&f.session, "Main", 2);
    let solo = template(&f.session, "Solo", 1);

    let mut page = create_node_on_site(&f.session, "Page", None, 1);
    page.set_value("NodeTemplateID", id(&main_one)).unwrap();
    page.update(&f.session).unwrap();
    let (copy, _) = clone(&f.session, &page, CloneSettings::new().site_id(2));
    assert_eq!(copy.site_id().unwrap(), Some(2));
    assert_eq!(copy.code_name().unwrap(), Some("Page".to_string()));
    assert_eq!(copy.get_value("NodeTemplateID").unwrap(), Value::from(id(&main_two)));

    let mut other = create_node_on_site(&f.session, "Other", None, 1);
    other.set_value("NodeTemplateID", id(&solo)).unwrap();
    other.update(&f.session).unwrap();
    let (copy, _) = clone(&f.session, &other, CloneSettings::new().site_id(2));
    assert_eq!(copy.get_value("NodeTemplateID").unwrap(), Value::Null);

    let widget = create_row(
        &f.session,
        "test.widget",
        &[
            ("WidgetName", Value::from("W")),
            ("WidgetSiteID", Value::from(1i64)),
            ("WidgetTemplateID", Value::from(id(&solo))),
        ],
    );
    let mut settings = CloneSettings::new().site_id(2);
    let mut result = CloneResult::new();
    let err = widget.insert_as_clone(&f.session, &mut settings, &mut result).unwrap_err();
    assert!(matches!(err, InfoError::CrossSiteCloneIncompatible { .. }));
    assert_eq!(f.provider.row_count("test.widget").unwrap(), 1);
}

#[test]
fn test_localization_macros() {
    let f = fixture();
    f.localizer.insert("greeting", "Hello").unwrap();
    let target = create_node(&f.session, "Target", None);
    let mut source = f.session.new_object("test.node").unwrap();
    source.set_value("NodeName", "Greeting").unwrap();
    source.set_value("NodeDisplayName", "{$greeting$}").unwrap();
    source.set_value("NodeSiteID", 1i64).unwrap();
    source.insert(&f.session).unwrap();

    let (resolved, _) = clone(&f.session, &source, CloneSettings::new().parent_id(id(&target)));
    assert_eq!(resolved.display_name().unwrap(), Some("Hello".to_string()));

    let mut settings = CloneSettings::new().keep_translated(true);
    settings.parent_id = Some(id(&resolved));
    let (kept, _) = clone(&f.session, &source, settings);
    assert_eq!(kept.display_name().unwrap(), Some("{$greeting$}".to_string()));
}

#[test]
fn test_notifications_batched_until_clone_finishes() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    create_node(&f.session, "C1", Some(id(&a)));
    create_node(&f.session, "C2", Some(id(&a)));
    f.notifier.clear().unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let (notifier, seen) = (f.notifier.clone(), observed.clone());
    f.session
        .events()
        .on_after("test.node", LifecycleOperation::InsertAsClone, move |_, session| {
            seen.lock().unwrap().push(notifier.delivered().len());
            session.notify(Notification::new("test.site", Some(1), ChangeAction::Updated))
        })
        .unwrap();

    let (_, result) = clone(&f.session, &a, CloneSettings::new());
    assert_eq!(result.cloned_count(), 3);
    assert_eq!(*observed.lock().unwrap(), vec![0, 0, 0]);
    assert!(!CloneBatchScope::is_active());

    let run_key = format!("test.node|{}|Cloned", id(&a));
    assert_eq!(f.notifier.count_with_key(&run_key), 1);
    assert_eq!(f.notifier.count_with_key("test.site|1|Updated"), 1);
    let created = f
        .notifier
        .delivered()
        .iter()
        .filter(|n| n.action == ChangeAction::Created)
        .count();
    assert_eq!(created, 3);
}

#[test]
fn test_cache_touches_deferred_until_clone_commits() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    create_node(&f.session, "C", Some(id(&a)));
    let before = f.cache.touched().len();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let (cache, seen) = (f.cache.clone(), observed.clone());
    f.session
        .events()
        .on_after("test.node", LifecycleOperation::InsertAsClone, move |_, _| {
            seen.lock().unwrap().push(cache.touched().len());
            Ok(())
        })
        .unwrap();

    let (copy, _) = clone(&f.session, &a, CloneSettings::new());
    assert_eq!(*observed.lock().unwrap(), vec![before, before]);
    assert!(f.cache.was_touched(&format!("test.node|byid|{}", id(&copy))));
    assert!(f.cache.touched().len() > before);
}

#[test]
fn test_failed_clone_discards_rows_and_notifications() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    create_node(&f.session, "C", Some(id(&a)));
    create_doc(&f.session, "readme", id(&a), "x");
    f.notifier.clear().unwrap();
    f.session
        .events()
        .on_after("test.doc", LifecycleOperation::InsertAsClone, |_, _| {
            Err(InfoError::Validation("no copies".into()))
        })
        .unwrap();

    let touched = f.cache.touched().len();

    let mut settings = CloneSettings::new();
    let mut result = CloneResult::new();
    assert!(a.insert_as_clone(&f.session, &mut settings, &mut result).is_err());
    assert_eq!(f.cache.touched().len(), touched);

    assert_eq!(f.provider.row_count("test.node").unwrap(), 2);
    assert_eq!(f.provider.row_count("test.doc").unwrap(), 1);
    assert!(f.notifier.delivered().is_empty());
    assert_eq!(CloneBatchScope::depth(), 0);
    assert!(!f.event_log.entries_with_code("INSERTASCLONE").is_empty());
    assert!(f.event_log.entries_with_code("CLONEOBJ").is_empty());
}

#[test]
fn test_single_audit_entry_per_clone() {
    let f = fixture();
    let a = create_node(&f.session, "A", None);
    create_node(&f.session, "C", Some(id(&a)));

    clone(&f.session, &a, CloneSettings::new());
    let entries = f.event_log.entries_with_code("CLONEOBJ");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, "test.node");
    assert!(entries[0].message.contains("2 objects created"));
}

#[test]
fn test_non_clonable_type_is_rejected() {
    let f = fixture();
    let mut node = create_node(&f.session, "A", None);
    node.set_tags(&f.session, &["x"]).unwrap();
    let settings_row = node.object_settings(&f.session).unwrap();

    let mut settings = CloneSettings::new();
    let mut result = CloneResult::new();
    let err = settings_row
        .insert_as_clone(&f.session, &mut settings, &mut result)
        .unwrap_err();
    assert!(matches!(err, InfoError::InvalidState(_)));
}
