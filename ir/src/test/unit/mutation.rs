use skein_types::Type;

use crate::{Error, Graph, NodeKind, Use};

fn op(name: &str) -> NodeKind {
    NodeKind::Op(name.into())
}

/// A graph with one constant feeding one consumer.
fn producer_consumer() -> (Graph, crate::NodeId, crate::NodeId) {
    let mut g = Graph::new();
    let root = g.root_block();
    let c = g.create_node(NodeKind::Constant, 1);
    g.append(c, root).unwrap();
    let user = g.create_with_inputs(op("test::sink"), &[g.output(c)], 1);
    g.append(user, root).unwrap();
    (g, c, user)
}

#[test]
fn test_add_input_records_use() {
    let (g, c, user) = producer_consumer();
    let v = g.output(c);
    assert_eq!(g.value_uses(v), &[Use { user, offset: 0 }]);
    assert_eq!(g.inputs(user), &[v]);
    g.lint().unwrap();
}

#[test]
fn test_insert_input_shifts_use_offsets() {
    let (mut g, c, user) = producer_consumer();
    let v = g.output(c);

    let c2 = g.create_node(NodeKind::Constant, 1);
    g.insert_before(c2, user).unwrap();
    let v2 = g.output(c2);

    g.insert_input(user, 0, v2);
    assert_eq!(g.inputs(user), &[v2, v]);
    assert_eq!(g.value_uses(v), &[Use { user, offset: 1 }]);
    assert_eq!(g.value_uses(v2), &[Use { user, offset: 0 }]);
    g.lint().unwrap();
}

#[test]
fn test_remove_input_shifts_use_offsets() {
    let (mut g, c, user) = producer_consumer();
    let v = g.output(c);
    g.add_input(user, v); // user now consumes v twice

    g.remove_input(user, 0);
    assert_eq!(g.inputs(user), &[v]);
    assert_eq!(g.value_uses(v), &[Use { user, offset: 0 }]);
    g.lint().unwrap();
}

#[test]
fn test_replace_input() {
    let (mut g, c, user) = producer_consumer();
    let v = g.output(c);

    let c2 = g.create_node(NodeKind::Constant, 1);
    g.insert_before(c2, user).unwrap();
    let v2 = g.output(c2);

    let old = g.replace_input(user, 0, v2);
    assert_eq!(old, v);
    assert!(g.value_uses(v).is_empty());
    assert_eq!(g.value_uses(v2), &[Use { user, offset: 0 }]);
    g.lint().unwrap();
}

#[test]
fn test_replace_input_with_replaces_every_occurrence() {
    let (mut g, c, user) = producer_consumer();
    let v = g.output(c);
    g.add_input(user, v);

    let c2 = g.create_node(NodeKind::Constant, 1);
    g.insert_before(c2, user).unwrap();
    let v2 = g.output(c2);

    g.replace_input_with(user, v, v2);
    assert_eq!(g.inputs(user), &[v2, v2]);
    assert!(g.value_uses(v).is_empty());
    assert_eq!(g.value_uses(v2).len(), 2);
    g.lint().unwrap();
}

#[test]
fn test_erase_output_fails_with_uses() {
    let (mut g, c, _user) = producer_consumer();
    let err = g.erase_output(c, 0).unwrap_err();
    assert!(matches!(err, Error::OutputHasUses { uses: 1, .. }));
}

#[test]
fn test_erase_output_shifts_offsets() {
    let mut g = Graph::new();
    let root = g.root_block();
    let n = g.create_node(op("test::pair"), 3);
    g.append(n, root).unwrap();
    let last = g.outputs(n)[2];

    g.erase_output(n, 0).unwrap();
    assert_eq!(g.outputs(n).len(), 2);
    assert_eq!(g.value_offset(last), 1);
    g.lint().unwrap();
}

#[test]
fn test_replace_all_uses_with_requires_arity() {
    let (mut g, c, _user) = producer_consumer();
    let two = g.create_node(NodeKind::Constant, 2);
    let err = g.replace_all_uses_with(c, two).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 1, actual: 2 }));
}

#[test]
fn test_replace_all_uses_with() {
    let (mut g, c, user) = producer_consumer();
    let c2 = g.create_node(NodeKind::Constant, 1);
    g.insert_before(c2, user).unwrap();

    g.replace_all_uses_with(c, c2).unwrap();
    assert!(g.value_uses(g.output(c)).is_empty());
    assert_eq!(g.inputs(user), &[g.output(c2)]);
    g.lint().unwrap();
}

#[test]
fn test_destroy_requires_unused_outputs() {
    let (mut g, c, user) = producer_consumer();
    assert!(g.destroy(c).is_err());

    // Dropping the consumer first makes the destroy legal.
    g.destroy(user).unwrap();
    g.destroy(c).unwrap();
    assert_eq!(g.block_nodes(g.root_block()).count(), 0);
    g.lint().unwrap();
}

#[test]
fn test_destroy_unplaced_node() {
    let mut g = Graph::new();
    let n = g.create_node(op("test::nop"), 1);
    g.destroy(n).unwrap();
    g.lint().unwrap();
}

#[test]
fn test_destroy_control_flow_node_with_blocks() {
    let mut g = Graph::new();
    let root = g.root_block();
    let cond = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(cond), Type::bool_());
    g.append(cond, root).unwrap();

    let if_node = g.create_if(g.output(cond), 0);
    g.append(if_node, root).unwrap();
    let then_block = g.node_blocks(if_node)[0];
    let inner = g.create_with_inputs(op("test::sink"), &[g.output(cond)], 0);
    g.append(inner, then_block).unwrap();

    g.destroy(if_node).unwrap();
    assert_eq!(g.block_nodes(root).collect::<Vec<_>>(), vec![cond]);
    assert!(g.value_uses(g.output(cond)).is_empty());
    g.lint().unwrap();
}

#[test]
fn test_node_state_round_trip() {
    // Unplaced -> placed -> unplaced -> destroyed.
    let mut g = Graph::new();
    let root = g.root_block();
    let n = g.create_node(op("test::nop"), 0);
    assert!(!g.is_placed(n));
    g.append(n, root).unwrap();
    assert!(g.is_placed(n));
    g.remove_from_list(n).unwrap();
    assert!(!g.is_placed(n));
    g.destroy(n).unwrap();
}
