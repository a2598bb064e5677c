use skein_types::Type;

use crate::{APPEND_INTERVAL, Graph, NodeKind};

fn op(name: &str) -> NodeKind {
    NodeKind::Op(name.into())
}

#[test]
fn test_append_assigns_stride_positions() {
    let mut g = Graph::new();
    let root = g.root_block();

    let mut nodes = Vec::new();
    for _ in 0..10 {
        let n = g.create_node(op("test::nop"), 1);
        g.append(n, root).unwrap();
        nodes.push(n);
    }

    for (k, &n) in nodes.iter().enumerate() {
        assert_eq!(g.topo_position(n), i64::MIN + APPEND_INTERVAL * (k as i64 + 1));
    }
    g.lint().unwrap();
}

#[test]
fn test_forced_reindex_after_gap_collapse() {
    let mut g = Graph::new();
    let root = g.root_block();

    let first = g.create_node(op("test::nop"), 0);
    g.append(first, root).unwrap();

    // Each insertion right after the param sentinel halves the leading gap;
    // after 40 halvings the gap is one, and the next insertion must trigger
    // a whole-block reindex.
    for _ in 0..41 {
        let n = g.create_node(op("test::nop"), 0);
        g.prepend(n, root).unwrap();
    }

    let nodes: Vec<_> = g.block_nodes(root).collect();
    assert_eq!(nodes.len(), 42, "reindex must preserve the node count");
    for (k, &n) in nodes.iter().enumerate() {
        assert_eq!(
            g.topo_position(n),
            i64::MIN + APPEND_INTERVAL * (k as i64 + 1),
            "after reindex, positions are re-spaced at stride intervals"
        );
    }
    g.lint().unwrap();
}

#[test]
fn test_insert_between_takes_midpoint() {
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(op("test::nop"), 0);
    let b = g.create_node(op("test::nop"), 0);
    g.append(a, root).unwrap();
    g.append(b, root).unwrap();

    let mid = g.create_node(op("test::nop"), 0);
    g.insert_after(mid, a).unwrap();

    assert!(g.topo_position(a) < g.topo_position(mid));
    assert!(g.topo_position(mid) < g.topo_position(b));
    let expected = g.topo_position(a) + (g.topo_position(b) - g.topo_position(a)) / 2;
    assert_eq!(g.topo_position(mid), expected);
}

#[test]
fn test_is_before_is_after_same_block() {
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(op("test::nop"), 0);
    let b = g.create_node(op("test::nop"), 0);
    g.append(a, root).unwrap();
    g.append(b, root).unwrap();

    assert!(g.is_before(a, b));
    assert!(g.is_after(b, a));
    assert!(!g.is_before(a, a));
    assert!(!g.is_after(a, a));
}

#[test]
fn test_ordering_across_blocks() {
    let mut g = Graph::new();
    let root = g.root_block();

    let cond = g.create_node(NodeKind::Constant, 1);
    g.set_value_type(g.output(cond), Type::bool_());
    g.append(cond, root).unwrap();

    let if_node = g.create_if(g.output(cond), 0);
    g.append(if_node, root).unwrap();

    let inner = g.create_node(op("test::nop"), 0);
    let then_block = g.node_blocks(if_node)[0];
    g.append(inner, then_block).unwrap();

    let after = g.create_node(op("test::nop"), 0);
    g.append(after, root).unwrap();

    // `inner` sits in a nested block: ordering resolves in the closest
    // common ancestor block.
    assert!(g.is_before(cond, inner));
    assert!(g.is_after(inner, cond));
    assert!(g.is_before(inner, after));
    assert!(g.is_after(after, inner));
}

#[test]
fn test_move_primitives() {
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(op("test::nop"), 0);
    let b = g.create_node(op("test::nop"), 0);
    let c = g.create_node(op("test::nop"), 0);
    for &n in &[a, b, c] {
        g.append(n, root).unwrap();
    }

    g.move_after(a, c).unwrap();
    assert_eq!(g.block_nodes(root).collect::<Vec<_>>(), vec![b, c, a]);

    g.move_before(a, b).unwrap();
    assert_eq!(g.block_nodes(root).collect::<Vec<_>>(), vec![a, b, c]);
    g.lint().unwrap();
}

#[test]
fn test_insert_requires_unplaced() {
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(op("test::nop"), 0);
    g.append(a, root).unwrap();

    let err = g.append(a, root).unwrap_err();
    assert!(matches!(err, crate::Error::AlreadyPlaced { .. }));
}

#[test]
fn test_sentinel_insert_rejected() {
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(op("test::nop"), 0);

    let err = g.insert_after(a, g.block_return(root)).unwrap_err();
    assert!(matches!(err, crate::Error::SentinelInsert));
    let err = g.insert_before(a, g.block_param(root)).unwrap_err();
    assert!(matches!(err, crate::Error::SentinelInsert));
}

#[test]
fn test_remove_from_list_leaves_unplaced() {
    let mut g = Graph::new();
    let root = g.root_block();
    let a = g.create_node(op("test::nop"), 0);
    g.append(a, root).unwrap();
    assert!(g.is_placed(a));

    g.remove_from_list(a).unwrap();
    assert!(!g.is_placed(a));
    assert_eq!(g.block_nodes(root).count(), 0);

    // And can be placed again.
    g.append(a, root).unwrap();
    assert!(g.is_placed(a));
}
