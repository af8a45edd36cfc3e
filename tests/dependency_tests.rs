/// Dependency tests
///
/// Blocking references, reference removal on delete and the delete
/// cascade over children, bindings, meta files and settings.
/// Run with: cargo test --test dependency_tests
mod common;

use common::{create_doc, create_node, create_row, fixture, id, reload};
use infobase::core::{InfoError, Value};
use infobase::info::{InfoProvider, MetaFile, OBJECT_SETTINGS_TYPE};
use infobase::metadata::DependencyKind;
use infobase::{InfoObject, LifecycleOutcome, ObjectStatus};

#[test]
fn test_required_reference_blocks_delete() {
    let f = fixture();
    let mut node = create_node(&f.session, "Target", None);
    let other = create_node(&f.session, "Other", None);
    let mut link = create_row(&f.session, "test.link", &[("LinkNodeID", Value::from(id(&node)))]);

    assert!(node.check_dependencies(&f.session, false).unwrap());
    let blocking = node.blocking_dependencies(&f.session).unwrap();
    assert_eq!(blocking.len(), 1);
    assert_eq!(blocking[0].object_type, "test.link");

    let err = node.delete(&f.session).unwrap_err();
    assert!(err.is_dependency_blocked());
    match err {
        InfoError::DependencyBlocked { dependents, .. } => {
            assert_eq!(dependents, vec!["test.link (1) via LinkNodeID".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(f.provider.row_count("test.node").unwrap(), 2);
    assert_eq!(f.provider.row_count("test.link").unwrap(), 1);
    assert_eq!(node.status(), ObjectStatus::Unchanged);

    link.set_value("LinkNodeID", id(&other)).unwrap();
    link.update(&f.session).unwrap();
    assert!(node.blocking_dependencies(&f.session).unwrap().is_empty());
    assert_eq!(node.delete(&f.session).unwrap(), LifecycleOutcome::Completed);
    assert_eq!(node.status(), ObjectStatus::WasDeleted);
    assert_eq!(f.provider.row_count("test.node").unwrap(), 1);
    assert_eq!(f.provider.row_count("test.link").unwrap(), 1);
}

#[test]
fn test_delete_succeeds_once_dependent_removed() {
    let f = fixture();
    let mut node = create_node(&f.session, "Target", None);
    let mut link = create_row(&f.session, "test.link", &[("LinkNodeID", Value::from(id(&node)))]);
    assert!(node.delete(&f.session).unwrap_err().is_dependency_blocked());

    link.delete(&f.session).unwrap();
    assert_eq!(node.delete(&f.session).unwrap(), LifecycleOutcome::Completed);
    assert_eq!(f.provider.row_count("test.node").unwrap(), 0);
}

#[test]
fn test_descendants_are_not_dependents() {
    let f = fixture();
    let link_to = |from: &InfoObject, to: &InfoObject| {
        let mut from = reload(&f.session, "test.node", id(from));
        from.set_value("NodeLinkedNodeID", id(to)).unwrap();
        from.update(&f.session).unwrap();
    };

    let r = create_node(&f.session, "R", None);
    let b = create_node(&f.session, "B", Some(id(&r)));
    let e = create_node(&f.session, "E", Some(id(&b)));
    link_to(&e, &b);
    assert!(b.get_dependencies(&f.session, None, None).unwrap().is_empty());

    let mut a = create_node(&f.session, "A", None);
    let c = create_node(&f.session, "C", Some(id(&a)));
    let d = create_node(&f.session, "D", Some(id(&c)));
    link_to(&c, &a);
    link_to(&d, &a);
    assert_eq!(reload(&f.session, "test.node", id(&a)).id_path().unwrap(), Some("/".to_string()));
    assert!(a.get_dependencies(&f.session, None, None).unwrap().is_empty());

    let outside = create_node(&f.session, "Outside", None);
    link_to(&outside, &a);
    let dependents = a.get_dependencies(&f.session, None, None).unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].id, Some(id(&outside)));

    a.delete(&f.session).unwrap();
    assert_eq!(f.provider.row_count("test.node").unwrap(), 4);
    assert_eq!(
        reload(&f.session, "test.node", id(&outside)).get_value("NodeLinkedNodeID").unwrap(),
        Value::Null
    );
}

#[test]
fn test_optional_and_defaulted_references_are_cleared() {
    let f = fixture();
    let mut node = create_node(&f.session, "Target", None);
    let bookmark = create_row(&f.session, "test.bookmark", &[("BookmarkNodeID", Value::from(id(&node)))]);
    let shortcut = create_row(&f.session, "test.shortcut", &[("ShortcutNodeID", Value::from(id(&node)))]);
    let linked = common::create_node(&f.session, "Linked", None);
    let mut linked = reload(&f.session, "test.node", id(&linked));
    linked.set_value("NodeLinkedNodeID", id(&node)).unwrap();
    linked.update(&f.session).unwrap();

    assert!(node.blocking_dependencies(&f.session).unwrap().is_empty());
    assert!(node.check_dependencies(&f.session, true).unwrap());
    let optional = node
        .get_dependencies(&f.session, Some(&[DependencyKind::NotRequired]), None)
        .unwrap();
    assert_eq!(optional.len(), 2);

    node.delete(&f.session).unwrap();
    assert_eq!(
        reload(&f.session, "test.bookmark", id(&bookmark)).get_value("BookmarkNodeID").unwrap(),
        Value::Null
    );
    assert_eq!(
        reload(&f.session, "test.shortcut", id(&shortcut)).get_value("ShortcutNodeID").unwrap(),
        Value::Integer(0)
    );
    assert_eq!(
        reload(&f.session, "test.node", id(&linked)).get_value("NodeLinkedNodeID").unwrap(),
        Value::Null
    );
}

#[test]
fn test_dependency_lookup_respects_top() {
    let f = fixture();
    let node = create_node(&f.session, "Target", None);
    for _ in 0..3 {
        create_row(&f.session, "test.bookmark", &[("BookmarkNodeID", Value::from(id(&node)))]);
    }
    assert_eq!(node.get_dependencies(&f.session, None, Some(2)).unwrap().len(), 2);
    assert_eq!(node.get_dependencies(&f.session, None, None).unwrap().len(), 3);
}

#[test]
fn test_delete_cascades_to_owned_objects() {
    let f = fixture();
    let mut node = create_node(&f.session, "Parent", None);
    let child = create_node(&f.session, "Child", Some(id(&node)));
    create_node(&f.session, "Grandchild", Some(id(&child)));
    create_doc(&f.session, "readme", id(&node), "text");
    create_row(
        &f.session,
        "test.comment",
        &[("CommentNodeID", Value::from(id(&node))), ("CommentText", Value::from("hi"))],
    );
    let tag = create_row(&f.session, "test.tag", &[("TagName", Value::from("keep"))]);
    create_row(
        &f.session,
        "test.nodetag",
        &[("NodeTagNodeID", Value::from(id(&node))), ("NodeTagTagID", Value::from(id(&tag)))],
    );
    let mut file = MetaFile::attach(&f.session, &node, "a.txt", b"a".to_vec()).unwrap();
    InfoProvider::<MetaFile>::new(&f.session).set(&mut file).unwrap();
    node.set_tags(&f.session, &["x", "y"]).unwrap();
    assert_eq!(f.provider.row_count(OBJECT_SETTINGS_TYPE).unwrap(), 1);
    assert_eq!(f.files.paths().unwrap().len(), 2);

    node.delete(&f.session).unwrap();

    assert_eq!(f.provider.row_count("test.node").unwrap(), 0);
    assert_eq!(f.provider.row_count("test.doc").unwrap(), 0);
    assert_eq!(f.provider.row_count("test.comment").unwrap(), 0);
    assert_eq!(f.provider.row_count("test.nodetag").unwrap(), 0);
    assert_eq!(f.provider.row_count("cms.metafile").unwrap(), 0);
    assert_eq!(f.provider.row_count(OBJECT_SETTINGS_TYPE).unwrap(), 0);
    assert_eq!(f.provider.row_count("test.tag").unwrap(), 1);
    assert!(f.files.paths().unwrap().is_empty());
}

#[test]
fn test_blocked_descendant_rolls_back_cascade() {
    let f = fixture();
    let mut node = create_node(&f.session, "Parent", None);
    let child = create_node(&f.session, "Child", Some(id(&node)));
    create_row(
        &f.session,
        "test.comment",
        &[("CommentNodeID", Value::from(id(&node))), ("CommentText", Value::from("hi"))],
    );
    create_row(&f.session, "test.link", &[("LinkNodeID", Value::from(id(&child)))]);

    assert!(node.delete(&f.session).unwrap_err().is_dependency_blocked());
    assert_eq!(f.provider.row_count("test.node").unwrap(), 2);
    assert_eq!(f.provider.row_count("test.comment").unwrap(), 1);
    assert!(reload(&f.session, "test.node", id(&child)).object_id().unwrap().is_some());
}

#[test]
fn test_deleting_binding_target_removes_bindings() {
    let f = fixture();
    let node = create_node(&f.session, "Tagged", None);
    let mut tag = create_row(&f.session, "test.tag", &[("TagName", Value::from("gone"))]);
    create_row(
        &f.session,
        "test.nodetag",
        &[("NodeTagNodeID", Value::from(id(&node))), ("NodeTagTagID", Value::from(id(&tag)))],
    );

    assert!(tag.check_dependencies(&f.session, false).unwrap());
    tag.delete(&f.session).unwrap();
    assert_eq!(f.provider.row_count("test.nodetag").unwrap(), 0);
    assert_eq!(f.provider.row_count("test.node").unwrap(), 1);
}

#[test]
fn test_saving_existing_binding_updates_in_place() {
    let f = fixture();
    let node = create_node(&f.session, "Tagged", None);
    let tag = create_row(&f.session, "test.tag", &[("TagName", Value::from("t"))]);
    let values = [
        ("NodeTagNodeID", Value::from(id(&node))),
        ("NodeTagTagID", Value::from(id(&tag))),
    ];
    create_row(&f.session, "test.nodetag", &values);
    create_row(&f.session, "test.nodetag", &values);
    assert_eq!(f.provider.row_count("test.nodetag").unwrap(), 1);
}
