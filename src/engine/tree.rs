//! Operation tree handed to the engine.
//!
//! Leaves carry a dense matrix, inner nodes an operator. The engine only ever
//! asks for the next resolvable node and writes a leaf back in its place.

use std::fmt;

/// Operator (or leaf marker) of a [`ComputationNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Matrix,
    Add,
    Multiply,
    Negate,
    Transpose,
}

impl NodeKind {
    /// Symbol used by the JSON input format.
    pub fn symbol(self) -> &'static str {
        match self {
            NodeKind::Matrix => "M",
            NodeKind::Add => "+",
            NodeKind::Multiply => "*",
            NodeKind::Negate => "-",
            NodeKind::Transpose => "T",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(NodeKind::Add),
            "*" => Some(NodeKind::Multiply),
            "-" => Some(NodeKind::Negate),
            "T" => Some(NodeKind::Transpose),
            _ => None,
        }
    }

    /// Operators whose operand lists may be regrouped pairwise.
    pub fn is_associative(self) -> bool {
        matches!(self, NodeKind::Add | NodeKind::Multiply)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Matrix => "MATRIX",
            NodeKind::Add => "ADD",
            NodeKind::Multiply => "MULTIPLY",
            NodeKind::Negate => "NEGATE",
            NodeKind::Transpose => "TRANSPOSE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputationNode {
    kind: NodeKind,
    children: Vec<ComputationNode>,
    matrix: Option<Vec<Vec<f64>>>,
}

impl ComputationNode {
    pub fn matrix(rows: Vec<Vec<f64>>) -> Self {
        Self {
            kind: NodeKind::Matrix,
            children: Vec::new(),
            matrix: Some(rows),
        }
    }

    pub fn op(kind: NodeKind, children: Vec<ComputationNode>) -> Self {
        Self {
            kind,
            children,
            matrix: None,
        }
    }

    pub fn add(children: Vec<ComputationNode>) -> Self {
        Self::op(NodeKind::Add, children)
    }

    pub fn multiply(children: Vec<ComputationNode>) -> Self {
        Self::op(NodeKind::Multiply, children)
    }

    pub fn negate(child: ComputationNode) -> Self {
        Self::op(NodeKind::Negate, vec![child])
    }

    pub fn transpose(child: ComputationNode) -> Self {
        Self::op(NodeKind::Transpose, vec![child])
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn children(&self) -> &[ComputationNode] {
        &self.children
    }

    /// Payload of a MATRIX leaf.
    pub fn matrix_value(&self) -> Option<&[Vec<f64>]> {
        self.matrix.as_deref()
    }

    pub fn into_matrix(self) -> Option<Vec<Vec<f64>>> {
        self.matrix
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Matrix
    }

    /// Rewrites every ADD/MULTIPLY with more than two operands into
    /// left-nested binary nodes, keeping operand order.
    pub fn associative_nesting(&mut self) {
        for child in &mut self.children {
            child.associative_nesting();
        }
        self.nest_operands();
    }

    // op(a, b, c, d) -> op(op(op(a, b), c), d)
    fn nest_operands(&mut self) {
        if !self.kind.is_associative() || self.children.len() <= 2 {
            return;
        }
        let Some(last) = self.children.pop() else {
            return;
        };
        let mut left = ComputationNode::op(self.kind, std::mem::take(&mut self.children));
        left.nest_operands();
        self.children = vec![left, last];
    }

    /// First operator node, depth-first and left to right, whose operands are
    /// all matrices. Regroups the nodes it passes through.
    pub fn find_resolvable(&mut self) -> Option<&mut ComputationNode> {
        if self.is_leaf() {
            return None;
        }
        self.nest_operands();
        if self.children.iter().all(ComputationNode::is_leaf) {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(ComputationNode::find_resolvable)
    }

    /// Collapses this node into a MATRIX leaf.
    pub fn resolve(&mut self, rows: Vec<Vec<f64>>) {
        self.kind = NodeKind::Matrix;
        self.children.clear();
        self.matrix = Some(rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(v: f64) -> ComputationNode {
        ComputationNode::matrix(vec![vec![v]])
    }

    #[test]
    fn test_nesting_keeps_operand_order() {
        let mut node = ComputationNode::multiply(vec![leaf(1.0), leaf(2.0), leaf(3.0), leaf(4.0)]);
        node.associative_nesting();

        let expected = ComputationNode::multiply(vec![
            ComputationNode::multiply(vec![
                ComputationNode::multiply(vec![leaf(1.0), leaf(2.0)]),
                leaf(3.0),
            ]),
            leaf(4.0),
        ]);
        assert_eq!(node, expected);
    }

    #[test]
    fn test_nesting_leaves_unary_nodes_alone() {
        let mut node = ComputationNode::negate(ComputationNode::add(vec![leaf(1.0), leaf(2.0)]));
        let before = node.clone();
        node.associative_nesting();
        assert_eq!(node, before);
    }

    #[test]
    fn test_find_resolvable_walks_left_first() {
        let mut root = ComputationNode::add(vec![
            ComputationNode::negate(leaf(1.0)),
            ComputationNode::transpose(leaf(2.0)),
        ]);

        let node = root.find_resolvable().unwrap();
        assert_eq!(node.kind(), NodeKind::Negate);
        node.resolve(vec![vec![-1.0]]);

        let node = root.find_resolvable().unwrap();
        assert_eq!(node.kind(), NodeKind::Transpose);
        node.resolve(vec![vec![2.0]]);

        let node = root.find_resolvable().unwrap();
        assert_eq!(node.kind(), NodeKind::Add);
        node.resolve(vec![vec![1.0]]);

        assert!(root.find_resolvable().is_none());
        assert_eq!(root.matrix_value(), Some(&[vec![1.0]][..]));
    }

    #[test]
    fn test_find_resolvable_regroups_wide_add() {
        let mut root = ComputationNode::add(vec![leaf(1.0), leaf(2.0), leaf(3.0)]);
        let node = root.find_resolvable().unwrap();
        assert_eq!(node.children(), &[leaf(1.0), leaf(2.0)]);
    }

    #[test]
    fn test_symbols() {
        for kind in [
            NodeKind::Add,
            NodeKind::Multiply,
            NodeKind::Negate,
            NodeKind::Transpose,
        ] {
            assert_eq!(NodeKind::from_symbol(kind.symbol()), Some(kind));
        }
        assert_eq!(NodeKind::from_symbol("M"), None);
        assert_eq!(NodeKind::from_symbol("/"), None);
    }
}
