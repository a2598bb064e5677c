use skein_ir::{Graph, NodeId, NodeKind};
use skein_types::Type;

use crate::test::helpers::{append_op, install_registry};
use crate::{AliasDb, Error, MoveSide};

fn order(g: &Graph) -> Vec<NodeId> {
    g.block_nodes(g.root_block()).collect()
}

/// `%a = const(); %b = read(%a); %c = write(%a); %d = read(%b)`
fn write_blocked_graph() -> (Graph, NodeId, NodeId, NodeId, NodeId) {
    install_registry();
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(a), Type::dynamic());
    g.append(a, root).unwrap();
    let a_out = g.output(a);
    let b = append_op(&mut g, "test::read", &[a_out]);
    let a_out = g.output(a);
    let c = append_op(&mut g, "test::write", &[a_out]);
    let b_out = g.output(b);
    let d = append_op(&mut g, "test::read", &[b_out]);
    (g, a, b, c, d)
}

#[test]
fn test_move_past_writer_of_unrelated_set() {
    // `d` only touches `%b`'s set, so it may cross the writer `c`.
    let (mut g, a, b, c, d) = write_blocked_graph();
    let db = AliasDb::build(&g).unwrap();

    assert!(db.try_move(&mut g, d, b, MoveSide::After).unwrap());
    assert_eq!(order(&g), vec![a, b, d, c]);
    g.lint().unwrap();
}

#[test]
fn test_move_before_writer_of_unrelated_set() {
    let (mut g, a, b, c, d) = write_blocked_graph();
    let db = AliasDb::build(&g).unwrap();

    assert!(db.try_move(&mut g, d, c, MoveSide::Before).unwrap());
    assert_eq!(order(&g), vec![a, b, d, c]);
    g.lint().unwrap();
}

#[test]
fn test_move_blocked_by_write() {
    // `b` reads `%a`; crossing the writer `c` would change the value read.
    let (mut g, a, b, c, d) = write_blocked_graph();
    let db = AliasDb::build(&g).unwrap();

    assert!(!db.try_move(&mut g, b, c, MoveSide::After).unwrap());
    assert_eq!(order(&g), vec![a, b, c, d], "a failed move leaves the order untouched");
    g.lint().unwrap();
}

#[test]
fn test_move_collects_value_dependencies() {
    install_registry();
    let mut g = Graph::new();
    let root = g.root_block();
    let x = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(x), Type::dynamic());
    g.append(x, root).unwrap();
    let x_out = g.output(x);
    let y = append_op(&mut g, "test::read", &[x_out]);
    let z = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(z), Type::dynamic());
    g.append(z, root).unwrap();

    // Moving x after z drags its dependent y along, in order.
    let db = AliasDb::build(&g).unwrap();
    assert!(db.try_move(&mut g, x, z, MoveSide::After).unwrap());
    assert_eq!(order(&g), vec![z, x, y]);
    g.lint().unwrap();
}

#[test]
fn test_split_mover_from_dependencies() {
    install_registry();
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(a), Type::dynamic());
    g.append(a, root).unwrap();
    let a_out = g.output(a);
    let b = append_op(&mut g, "test::read", &[a_out]);
    let a_out = g.output(a);
    let c = append_op(&mut g, "test::read", &[a_out]);

    // Moving `a` directly before `c` splits `a` off from its dependent `b`,
    // which lands on the far side of the move point.
    let db = AliasDb::build(&g).unwrap();
    assert!(db.try_move(&mut g, a, c, MoveSide::Before).unwrap());
    assert_eq!(order(&g), vec![a, c, b]);
    g.lint().unwrap();
}

#[test]
fn test_move_before_with_dependency_chain() {
    // Both n and o consume the mover: move_after(n) must refuse, but
    // move_before(o) succeeds as [this, o, n].
    install_registry();
    let mut g = Graph::new();
    let root = g.root_block();
    let this = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(this), Type::dynamic());
    g.append(this, root).unwrap();
    let this_out = g.output(this);
    let n = append_op(&mut g, "test::read", &[this_out]);
    let this_out = g.output(this);
    let o = append_op(&mut g, "test::read", &[this_out]);

    let db = AliasDb::build(&g).unwrap();
    assert!(!db.move_after_topologically_valid(&mut g, this, n).unwrap());

    assert!(db.move_before_topologically_valid(&mut g, this, o).unwrap());
    assert_eq!(order(&g), vec![this, o, n]);
    g.lint().unwrap();
}

#[test]
fn test_move_and_undo_restores_order() {
    install_registry();
    let mut g = Graph::new();
    let root = g.root_block();
    let mut nodes = Vec::new();
    for _ in 0..4 {
        let n = g.create_node(NodeKind::Constant, 1);
        g.set_value_type(g.output(n), Type::dynamic());
        g.append(n, root).unwrap();
        nodes.push(n);
    }
    let original = order(&g);
    let db = AliasDb::build(&g).unwrap();

    assert!(db.try_move(&mut g, nodes[0], nodes[3], MoveSide::After).unwrap());
    assert_ne!(order(&g), original);

    // Independent constants: the inverse move is always feasible.
    assert!(db.try_move(&mut g, nodes[0], nodes[1], MoveSide::Before).unwrap());
    assert_eq!(order(&g), original);
    g.lint().unwrap();
}

#[test]
fn test_move_to_self_is_trivially_true() {
    let (mut g, _a, b, _c, _d) = write_blocked_graph();
    let db = AliasDb::build(&g).unwrap();
    assert!(db.try_move(&mut g, b, b, MoveSide::After).unwrap());
}

#[test]
fn test_move_across_blocks_is_rejected() {
    install_registry();
    let mut g = Graph::new();
    let root = g.root_block();
    let cond = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(cond), Type::bool_());
    g.append(cond, root).unwrap();
    let if_node = g.create_if(g.output(cond), 0);
    g.append(if_node, root).unwrap();
    let inner = g.create_node(NodeKind::Constant, 0);
    let then_block = g.node_blocks(if_node)[0];
    g.append(inner, then_block).unwrap();

    let db = AliasDb::build(&g).unwrap();
    let err = db.try_move(&mut g, inner, cond, MoveSide::After).unwrap_err();
    assert!(matches!(err, Error::NotInSameBlock { .. }));
}

#[test]
fn test_wildcard_blocks_moves_past_writers() {
    install_registry();
    let mut g = Graph::new();
    let root = g.root_block();
    let tup = g.add_graph_input(Type::tuple(vec![Type::dynamic()]));
    let t = g.add_graph_input(Type::dynamic());

    let unpack = g.create_tuple_unpack(tup).unwrap();
    g.append(unpack, root).unwrap();
    let unpack_out = g.outputs(unpack)[0];
    let consumer = append_op(&mut g, "test::read", &[unpack_out]);
    let writer = append_op(&mut g, "test::write", &[t]);

    // The consumer touches a wildcard value; any writer interferes.
    let db = AliasDb::build(&g).unwrap();
    assert!(!db.try_move(&mut g, consumer, writer, MoveSide::After).unwrap());
    g.lint().unwrap();
}

#[test]
fn test_mutators_keep_relative_order() {
    // Two writers to the same set never reorder.
    install_registry();
    let mut g = Graph::new();
    let t = g.add_graph_input(Type::dynamic());
    let w1 = append_op(&mut g, "test::write", &[t]);
    let w2 = append_op(&mut g, "test::write", &[t]);

    let db = AliasDb::build(&g).unwrap();
    assert!(!db.try_move(&mut g, w1, w2, MoveSide::After).unwrap());
    assert!(!db.try_move(&mut g, w2, w1, MoveSide::Before).unwrap());
}
