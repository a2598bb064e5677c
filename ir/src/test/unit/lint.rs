use skein_types::{CompleteTensor, ScalarKind, Type};

use crate::{Error, Graph, NodeKind};

fn op(name: &str) -> NodeKind {
    NodeKind::Op(name.into())
}

#[test]
fn test_empty_graph_lints() {
    Graph::new().lint().unwrap();
}

#[test]
fn test_well_formed_graph_lints() {
    let mut g = Graph::new();
    let root = g.root_block();
    let input = g.add_graph_input(Type::dynamic());
    let n = g.create_with_inputs(op("aten::relu"), &[input], 1);
    g.append(n, root).unwrap();
    g.register_output(g.output(n));
    g.lint().unwrap();
}

#[test]
fn test_use_before_def_fails() {
    let mut g = Graph::new();
    let root = g.root_block();

    let producer = g.create_node(NodeKind::Constant, 1);
    let user = g.create_with_inputs(op("test::sink"), &[g.output(producer)], 0);

    // The consumer lands before the producer in the block list.
    g.append(user, root).unwrap();
    g.append(producer, root).unwrap();

    let err = g.lint().unwrap_err();
    assert!(matches!(err, Error::InvariantViolation { .. }));
}

#[test]
fn test_unattached_user_fails() {
    let mut g = Graph::new();
    let root = g.root_block();
    let producer = g.create_node(NodeKind::Constant, 1);
    g.append(producer, root).unwrap();

    // The user node records a use but never enters a block list.
    let _user = g.create_with_inputs(op("test::sink"), &[g.output(producer)], 0);

    assert!(g.lint().is_err());
}

#[test]
fn test_constant_with_inputs_fails() {
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(NodeKind::Constant, 1);
    g.append(a, root).unwrap();
    let bad = g.create_with_inputs(NodeKind::Constant, &[g.output(a)], 1);
    g.append(bad, root).unwrap();

    assert!(g.lint().is_err());
}

#[test]
fn test_nested_scope_visibility() {
    let mut g = Graph::new();
    let root = g.root_block();
    let cond = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(cond), Type::bool_());
    g.append(cond, root).unwrap();

    let outer = g.create_node(NodeKind::Constant, 1);
    g.append(outer, root).unwrap();

    let if_node = g.create_if(g.output(cond), 0);
    g.append(if_node, root).unwrap();

    // A nested node may consume a value from the strictly enclosing block.
    let then_block = g.node_blocks(if_node)[0];
    let inner = g.create_with_inputs(op("test::sink"), &[g.output(outer)], 0);
    g.append(inner, then_block).unwrap();

    g.lint().unwrap();
}

#[test]
fn test_fusion_group_device_mismatch_fails() {
    let mut g = Graph::new();
    let root = g.root_block();

    let t0 = Type::Tensor(CompleteTensor::contiguous(ScalarKind::Float, vec![2], 0));
    let t1 = Type::Tensor(CompleteTensor::contiguous(ScalarKind::Float, vec![2], 1));
    let a = g.add_graph_input(t0.into());
    let b = g.add_graph_input(t1.into());

    let fusion = g.create_fusion_group();
    g.add_input(fusion, a);
    g.add_input(fusion, b);
    let body = g.node_blocks(fusion)[0];
    let _p0 = g.add_block_input(body, g.value_type(a).clone());
    let _p1 = g.add_block_input(body, g.value_type(b).clone());
    g.append(fusion, root).unwrap();

    let err = g.lint().unwrap_err();
    assert!(matches!(err, Error::InvariantViolation { .. }));
}
