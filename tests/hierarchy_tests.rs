/// Hierarchy tests
///
/// ID paths, name paths, levels, subtree moves and sibling ordering.
/// Run with: cargo test --test hierarchy_tests
mod common;

use common::{create_node, fixture, id, reload};
use infobase::services::ChangeAction;
use infobase::InfoSession;

fn paths(session: &InfoSession, node_id: i64) -> (String, String, i64) {
    let node = reload(session, "test.node", node_id);
    (
        node.id_path().unwrap().unwrap(),
        node.name_path().unwrap().unwrap(),
        node.level().unwrap().unwrap(),
    )
}

fn order_of(session: &InfoSession, node_id: i64) -> i64 {
    reload(session, "test.node", node_id).order().unwrap().unwrap()
}

#[test]
fn test_paths_on_insert() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let a = create_node(&f.session, "A", Some(id(&root)));
    let c = create_node(&f.session, "C", Some(id(&a)));

    assert_eq!(paths(&f.session, id(&root)), ("/".to_string(), "/".to_string(), 0));
    assert_eq!(paths(&f.session, id(&a)), ("/000002".to_string(), "/A".to_string(), 1));
    assert_eq!(
        paths(&f.session, id(&c)),
        ("/000002/000003".to_string(), "/A/C".to_string(), 2)
    );
    assert_eq!(c.id_path().unwrap(), Some("/000002/000003".to_string()));
}

#[test]
fn test_move_rewrites_subtree() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let a = create_node(&f.session, "A", Some(id(&root)));
    let b = create_node(&f.session, "B", Some(id(&root)));
    let c = create_node(&f.session, "C", Some(id(&a)));
    let d = create_node(&f.session, "D", Some(id(&c)));

    let mut moving = reload(&f.session, "test.node", id(&c));
    moving.set_parent_id(Some(id(&b))).unwrap();
    moving.update(&f.session).unwrap();

    assert_eq!(
        paths(&f.session, id(&c)),
        ("/000003/000004".to_string(), "/B/C".to_string(), 2)
    );
    assert_eq!(
        paths(&f.session, id(&d)),
        ("/000003/000004/000005".to_string(), "/B/C/D".to_string(), 3)
    );

    moving.set_parent_id(Some(id(&root))).unwrap();
    moving.update(&f.session).unwrap();
    assert_eq!(paths(&f.session, id(&c)), ("/000004".to_string(), "/C".to_string(), 1));
    assert_eq!(
        paths(&f.session, id(&d)),
        ("/000004/000005".to_string(), "/C/D".to_string(), 2)
    );
}

#[test]
fn test_rename_rewrites_name_paths() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let a = create_node(&f.session, "A", Some(id(&root)));
    let c = create_node(&f.session, "C", Some(id(&a)));

    let mut renamed = reload(&f.session, "test.node", id(&a));
    renamed.set_code_name("Alpha").unwrap();
    renamed.update(&f.session).unwrap();

    assert_eq!(paths(&f.session, id(&a)).1, "/Alpha");
    let (id_path, name_path, level) = paths(&f.session, id(&c));
    assert_eq!(id_path, "/000002/000003");
    assert_eq!(name_path, "/Alpha/C");
    assert_eq!(level, 2);
}

#[test]
fn test_insert_order_appends() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let a = create_node(&f.session, "A", Some(id(&root)));
    let b = create_node(&f.session, "B", Some(id(&root)));
    let e = create_node(&f.session, "E", Some(id(&root)));

    assert_eq!(order_of(&f.session, id(&a)), 1);
    assert_eq!(order_of(&f.session, id(&b)), 2);
    assert_eq!(order_of(&f.session, id(&e)), 3);
    assert_eq!(e.order().unwrap(), Some(3));
}

#[test]
fn test_set_order_moves_within_siblings() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let a = create_node(&f.session, "A", Some(id(&root)));
    let b = create_node(&f.session, "B", Some(id(&root)));
    let mut e = create_node(&f.session, "E", Some(id(&root)));
    f.notifier.clear().unwrap();

    e.set_order(&f.session, 1, false).unwrap();
    assert_eq!(e.order().unwrap(), Some(1));
    assert_eq!(order_of(&f.session, id(&a)), 2);
    assert_eq!(order_of(&f.session, id(&b)), 3);
    assert!(f
        .notifier
        .delivered()
        .iter()
        .all(|n| n.action == ChangeAction::Updated));
    assert_eq!(f.notifier.delivered().len(), 3);

    let mut a = reload(&f.session, "test.node", id(&a));
    a.set_order(&f.session, 1, true).unwrap();
    assert_eq!(order_of(&f.session, id(&e)), 1);
    assert_eq!(order_of(&f.session, id(&b)), 2);
    assert_eq!(order_of(&f.session, id(&a)), 3);

    e.set_order(&f.session, 100, false).unwrap();
    assert_eq!(order_of(&f.session, id(&e)), 3);
    assert_eq!(order_of(&f.session, id(&b)), 1);
}

#[test]
fn test_set_order_clamps_extreme_positions() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let a = create_node(&f.session, "A", Some(id(&root)));
    let mut b = create_node(&f.session, "B", Some(id(&root)));
    let c = create_node(&f.session, "C", Some(id(&root)));

    b.set_order(&f.session, i64::MAX, true).unwrap();
    assert_eq!(order_of(&f.session, id(&a)), 1);
    assert_eq!(order_of(&f.session, id(&c)), 2);
    assert_eq!(order_of(&f.session, id(&b)), 3);

    b.set_order(&f.session, i64::MIN, true).unwrap();
    assert_eq!(order_of(&f.session, id(&b)), 1);

    b.set_order(&f.session, i64::MAX, false).unwrap();
    assert_eq!(order_of(&f.session, id(&b)), 3);
}

#[test]
fn test_alphabetical_ordering() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let zulu = create_node(&f.session, "Zulu", Some(id(&root)));
    let alpha = create_node(&f.session, "alpha", Some(id(&root)));
    let mike = create_node(&f.session, "Mike", Some(id(&root)));

    let mut any = reload(&f.session, "test.node", id(&zulu));
    any.initialize_order(&f.session, true).unwrap();
    assert_eq!(order_of(&f.session, id(&alpha)), 1);
    assert_eq!(order_of(&f.session, id(&mike)), 2);
    assert_eq!(order_of(&f.session, id(&zulu)), 3);

    let mut renamed = reload(&f.session, "test.node", id(&zulu));
    renamed.set_display_name("Bravo").unwrap();
    renamed.update(&f.session).unwrap();
    renamed.set_alphabetical_order(&f.session).unwrap();
    assert_eq!(order_of(&f.session, id(&alpha)), 1);
    assert_eq!(order_of(&f.session, id(&zulu)), 2);
    assert_eq!(order_of(&f.session, id(&mike)), 3);
}

#[test]
fn test_initialize_order_heals_gaps() {
    let f = fixture();
    let root = create_node(&f.session, "Root", None);
    let a = create_node(&f.session, "A", Some(id(&root)));
    let b = create_node(&f.session, "B", Some(id(&root)));

    let mut gap = reload(&f.session, "test.node", id(&b));
    gap.set_value("NodeOrder", 7i64).unwrap();
    gap.update(&f.session).unwrap();

    let mut any = reload(&f.session, "test.node", id(&a));
    any.initialize_order(&f.session, false).unwrap();
    assert_eq!(order_of(&f.session, id(&a)), 1);
    assert_eq!(order_of(&f.session, id(&b)), 2);
}
