use skein_types::Type;

use crate::{Error, Graph};

#[test]
fn test_unnamed_value_prints_unique() {
    let mut g = Graph::new();
    let v = g.add_graph_input(Type::dynamic());
    assert!(!g.has_unique_name(v));
    assert_eq!(g.unique_name(v), "0");
}

#[test]
fn test_integer_names_rejected() {
    let mut g = Graph::new();
    let v = g.add_graph_input(Type::dynamic());
    let err = g.set_unique_name(v, "42").unwrap_err();
    assert!(matches!(err, Error::IntegerName { .. }));
}

#[test]
fn test_set_and_clear_name() {
    let mut g = Graph::new();
    let v = g.add_graph_input(Type::dynamic());
    g.set_unique_name(v, "x").unwrap();
    assert_eq!(g.unique_name(v), "x");

    g.set_unique_name(v, "").unwrap();
    assert!(!g.has_unique_name(v));
    assert_eq!(g.unique_name(v), "0");
    g.lint().unwrap();
}

#[test]
fn test_name_collision_renames_old_owner() {
    let mut g = Graph::new();
    let a = g.add_graph_input(Type::dynamic());
    let b = g.add_graph_input(Type::dynamic());
    g.set_unique_name(a, "x").unwrap();
    g.set_unique_name(b, "x").unwrap();

    assert_eq!(g.unique_name(b), "x");
    assert_eq!(g.unique_name(a), "x.1");
    g.lint().unwrap();
}

#[test]
fn test_collision_rename_skips_taken_suffixes() {
    let mut g = Graph::new();
    let a = g.add_graph_input(Type::dynamic());
    let b = g.add_graph_input(Type::dynamic());
    let c = g.add_graph_input(Type::dynamic());
    g.set_unique_name(a, "x.1").unwrap();
    g.set_unique_name(b, "x").unwrap();
    g.set_unique_name(c, "x").unwrap();

    assert_eq!(g.unique_name(c), "x");
    assert_eq!(g.unique_name(a), "x.1");
    assert_eq!(g.unique_name(b), "x.2");
    g.lint().unwrap();
}

#[test]
fn test_suffixed_collision_bumps_from_suffix() {
    let mut g = Graph::new();
    let a = g.add_graph_input(Type::dynamic());
    let b = g.add_graph_input(Type::dynamic());
    g.set_unique_name(a, "y.3").unwrap();
    g.set_unique_name(b, "y.3").unwrap();

    assert_eq!(g.unique_name(b), "y.3");
    assert_eq!(g.unique_name(a), "y.4");
}

#[test]
fn test_names_freed_with_value() {
    let mut g = Graph::new();
    let root = g.root_block();
    let n = g.create_node(crate::NodeKind::Constant, 1);
    g.append(n, root).unwrap();
    g.set_unique_name(g.output(n), "gone").unwrap();

    g.destroy(n).unwrap();
    let v = g.add_graph_input(Type::dynamic());
    // The name is free for the taking again, with no forced rename.
    g.set_unique_name(v, "gone").unwrap();
    assert_eq!(g.unique_name(v), "gone");
    g.lint().unwrap();
}
