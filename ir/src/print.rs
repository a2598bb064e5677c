//! Deterministic SSA-style textual form of a graph.
//!
//! ```text
//! graph(%in0 : T0,
//!       %in1 : T1) {
//!   %out0 : T = kind[attr=...](%in0, %in1), scope: <name>
//!     block0(%b0 : T) {
//!       ...
//!       -> (%bo)
//!     }
//!   return (%out0)
//! }
//! ```
//!
//! Subgraph-bearing nodes (fusion groups, differentiable subgraphs) are
//! printed as `<kind>_N` references and their bodies hoisted after the
//! enclosing graph as `with <kind>_N = <graph>`.

use std::fmt;

use crate::graph::Graph;
use crate::{BlockId, NodeId, ValueId};

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer { g: self, groups: Vec::new() };
        printer.print_block_as_graph(f, self.root_block())?;

        let mut printed = 0;
        while printed < printer.groups.len() {
            let group = printer.groups[printed];
            write!(f, "with {}_{} = ", self.kind(group).qual_string(), printed)?;
            let body = self.node_blocks(group)[0];
            printer.print_block_as_graph(f, body)?;
            printed += 1;
        }
        Ok(())
    }
}

impl Graph {
    /// Write the textual form to stderr.
    pub fn dump(&self) {
        eprintln!("{self}");
    }
}

struct Printer<'g> {
    g: &'g Graph,
    /// Subgraph-bearing nodes encountered so far, in print order.
    groups: Vec<NodeId>,
}

impl Printer<'_> {
    fn value_ref(&self, v: ValueId) -> String {
        format!("%{}", self.g.unique_name(v))
    }

    fn write_value_list(&self, f: &mut fmt::Formatter<'_>, values: &[ValueId]) -> fmt::Result {
        for (i, &v) in values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.value_ref(v))?;
        }
        Ok(())
    }

    fn write_typed_value_list(
        &self,
        f: &mut fmt::Formatter<'_>,
        values: &[ValueId],
        separator: &str,
    ) -> fmt::Result {
        for (i, &v) in values.iter().enumerate() {
            if i > 0 {
                write!(f, "{separator}")?;
            }
            write!(f, "{} : {}", self.value_ref(v), self.g.value_type(v))?;
        }
        Ok(())
    }

    fn indent(f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        for _ in 0..level {
            write!(f, "  ")?;
        }
        Ok(())
    }

    fn write_attrs(&self, f: &mut fmt::Formatter<'_>, n: NodeId) -> fmt::Result {
        write!(f, "[")?;
        for (i, (name, value)) in self.g.attrs(n).iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "]")
    }

    fn print_node(&mut self, f: &mut fmt::Formatter<'_>, level: usize, n: NodeId) -> fmt::Result {
        Self::indent(f, level)?;
        self.write_typed_value_list(f, self.g.outputs(n), ", ")?;
        write!(f, " = ")?;

        let kind = self.g.kind(n);
        let hoist = kind.has_subgraph() && !self.g.node_blocks(n).is_empty();
        if hoist {
            write!(f, "{}_{}", kind.qual_string(), self.groups.len())?;
            if !self.g.attrs(n).is_empty() {
                self.write_attrs(f, n)?;
            }
            self.groups.push(n);
        } else {
            write!(f, "{}", kind.qual_string())?;
            if !self.g.attrs(n).is_empty() {
                self.write_attrs(f, n)?;
            }
        }

        write!(f, "(")?;
        self.write_value_list(f, self.g.inputs(n))?;
        write!(f, ")")?;
        match self.g.scope_of(n) {
            Some(scope) if !scope.is_empty() => writeln!(f, ", scope: {scope}")?,
            _ => writeln!(f)?,
        }

        if !hoist {
            for (i, &b) in self.g.node_blocks(n).iter().enumerate() {
                Self::indent(f, level + 1)?;
                write!(f, "block{i}(")?;
                self.write_typed_value_list(f, self.g.block_inputs(b), ", ")?;
                writeln!(f, ") {{")?;
                for inner in self.g.block_nodes(b).collect::<Vec<_>>() {
                    self.print_node(f, level + 2, inner)?;
                }
                Self::indent(f, level + 2)?;
                write!(f, "-> (")?;
                self.write_value_list(f, self.g.block_outputs(b))?;
                writeln!(f, ")")?;
                Self::indent(f, level + 1)?;
                writeln!(f, "}}")?;
            }
        }
        Ok(())
    }

    fn print_block_as_graph(&mut self, f: &mut fmt::Formatter<'_>, b: BlockId) -> fmt::Result {
        write!(f, "graph(")?;
        self.write_typed_value_list(f, self.g.block_inputs(b), ",\n      ")?;
        writeln!(f, ") {{")?;
        for n in self.g.block_nodes(b).collect::<Vec<_>>() {
            self.print_node(f, 1, n)?;
        }
        write!(f, "  return (")?;
        self.write_value_list(f, self.g.block_outputs(b))?;
        writeln!(f, ")")?;
        writeln!(f, "}}")
    }
}
