//! Variation tree stored as an arena of nodes.
//!
//! Nodes are addressed by [`NodeId`]; a node refers to its parent by index
//! only, so navigation is O(1) in both directions and there is no ownership
//! cycle. Nodes detached from their parent stay in the arena but are no
//! longer reachable from the root. Every traversal below uses an explicit
//! work stack.

use crate::board::{Board, Color, Mark, Point};
use crate::constants::VALUE_UNSET;

/// Index of a node inside a [`MoveTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node does on the board.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Move {
    Play(Point),
    Pass,
    Resign,
}

impl Move {
    pub fn point(self) -> Option<Point> {
        match self {
            Move::Play(p) => Some(p),
            _ => None,
        }
    }
}

/// A stone (or an emptied point) set on the board outside of normal play.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SetupStone {
    pub point: Point,
    /// `None` clears the intersection.
    pub color: Option<Color>,
}

/// A node of the variation tree.
#[derive(Clone, Debug, PartialEq)]
pub struct GameNode {
    /// Move played by this node; `None` for the root and for setup-only nodes.
    pub mv: Option<Move>,
    pub color: Option<Color>,
    /// Problem annotation in [0, 100], or -1 if unset.
    pub value: i8,
    /// Index of the child taken the last time the game went through this node.
    pub last_variation: usize,
    pub comment: String,
    pub setup: Vec<SetupStone>,
    pub marks: Vec<Mark>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Default for GameNode {
    fn default() -> Self {
        Self {
            mv: None,
            color: None,
            value: VALUE_UNSET,
            last_variation: 0,
            comment: String::new(),
            setup: Vec::new(),
            marks: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

impl GameNode {
    /// A node playing `mv` for `color`.
    pub fn with_move(color: Color, mv: Move) -> Self {
        Self {
            mv: Some(mv),
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Adds a setup stone, replacing any earlier one on the same point.
    pub fn set_stone(&mut self, point: Point, color: Option<Color>) {
        self.setup.retain(|s| s.point != point);
        self.setup.push(SetupStone { point, color });
    }

    /// Adds a mark, replacing any earlier one on the same point.
    pub fn add_mark(&mut self, mark: Mark) {
        self.marks.retain(|m| m.point != mark.point);
        self.marks.push(mark);
    }

    /// True if this node carries nothing but its tree links.
    pub fn is_blank(&self) -> bool {
        self.mv.is_none() && self.setup.is_empty() && self.marks.is_empty() && self.comment.is_empty()
    }

    fn same_move(&self, color: Color, mv: Move) -> bool {
        self.color == Some(color) && self.mv == Some(mv)
    }
}

/// A rooted, acyclic tree of [`GameNode`]s.
#[derive(Clone, Debug)]
pub struct MoveTree {
    nodes: Vec<GameNode>,
}

impl Default for MoveTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveTree {
    /// A tree holding only an empty root.
    pub fn new() -> Self {
        Self::with_root(GameNode::default())
    }

    /// A tree whose root is `root` (its links are reset).
    pub fn with_root(mut root: GameNode) -> Self {
        root.parent = None;
        root.children.clear();
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &GameNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GameNode {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Appends `node` as the last child of `parent`, even if an identical child exists.
    pub fn push_child(&mut self, parent: NodeId, mut node: GameNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Returns the child of `parent` playing `mv` for `color`, creating it if needed.
    /// A new child starts with its parent's value.
    pub fn add_child(&mut self, parent: NodeId, color: Color, mv: Move) -> NodeId {
        if let Some(&existing) = self.nodes[parent.0]
            .children
            .iter()
            .find(|&&c| self.nodes[c.0].same_move(color, mv))
        {
            return existing;
        }
        let mut node = GameNode::with_move(color, mv);
        node.value = self.nodes[parent.0].value;
        self.push_child(parent, node)
    }

    /// Removes `child` from the children of its parent.
    pub fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent {
            self.nodes[parent.0].children.retain(|&c| c != child);
        }
    }

    /// Position of `child` among its siblings.
    pub fn child_index(&self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.children(parent).iter().position(|&c| c == child)
    }

    /// Number of nodes reachable from the root, root included.
    pub fn len(&self) -> usize {
        self.preorder().len()
    }

    /// True if the root has no children.
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Reachable nodes in pre-order (parent before children, children in order).
    pub fn preorder(&self) -> Vec<NodeId> {
        self.preorder_from(self.root())
    }

    pub fn preorder_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    /// First-child chain from the root, root excluded.
    pub fn main_line(&self) -> Vec<NodeId> {
        let mut line = Vec::new();
        let mut id = self.root();
        while let Some(&next) = self.children(id).first() {
            line.push(next);
            id = next;
        }
        line
    }

    /// Nodes from the root (excluded) down to `id` (included).
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            path.push(cur);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// Number of edges between the root and `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            depth += 1;
            cur = parent;
        }
        depth
    }

    /// Sets the value of `id` and lifts the best child value into each ancestor.
    ///
    /// Propagation stops at the first ancestor whose value already equals the
    /// maximum of its children's values.
    pub fn set_move_value(&mut self, id: NodeId, value: i8) {
        self.nodes[id.0].value = value;
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            let highest = self
                .children(parent)
                .iter()
                .map(|&c| self.nodes[c.0].value)
                .fold(VALUE_UNSET, i8::max);
            if highest == self.nodes[parent.0].value {
                break;
            }
            self.nodes[parent.0].value = highest;
            cur = parent;
        }
    }

    /// Copies the subtree under `id` into a new tree whose root is `id`.
    ///
    /// A move on the new root is turned into a setup stone, since a root
    /// carries the initial position rather than a move.
    pub fn subtree(&self, id: NodeId) -> MoveTree {
        let mut root = self.node(id).clone();
        if let (Some(Move::Play(p)), Some(color)) = (root.mv, root.color) {
            root.set_stone(p, Some(color));
        }
        root.mv = None;
        root.color = None;
        let mut copy = MoveTree::with_root(root);

        let mut stack: Vec<(NodeId, NodeId)> = self
            .children(id)
            .iter()
            .rev()
            .map(|&c| (c, copy.root()))
            .collect();
        while let Some((src, dst_parent)) = stack.pop() {
            let dst = copy.push_child(dst_parent, self.node(src).clone());
            stack.extend(self.children(src).iter().rev().map(|&c| (c, dst)));
        }
        copy
    }

    /// Rotates every move, setup stone and mark by 90° counter-clockwise.
    pub fn rotate_ccw(&mut self, size: usize) {
        for id in self.preorder() {
            let node = &mut self.nodes[id.0];
            if let Some(Move::Play(p)) = node.mv {
                node.mv = Some(Move::Play(Board::rotate_point_ccw(size, p)));
            }
            for stone in &mut node.setup {
                stone.point = Board::rotate_point_ccw(size, stone.point);
            }
            for mark in &mut node.marks {
                mark.point = Board::rotate_point_ccw(size, mark.point);
            }
        }
    }

    /// Smallest rectangle containing every played move, or `None` if there is none.
    pub fn move_bounds(&self) -> Option<crate::board::Rect> {
        crate::board::Rect::enclosing(
            self.preorder()
                .into_iter()
                .filter_map(|id| self.node(id).mv.and_then(Move::point)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(tree: &mut MoveTree, parent: NodeId, color: Color, x: usize, y: usize) -> NodeId {
        tree.add_child(parent, color, Move::Play((x, y)))
    }

    #[test]
    fn test_add_child_reuses_identical_move() {
        let mut tree = MoveTree::new();
        let root = tree.root();
        let a = play(&mut tree, root, Color::Black, 3, 3);
        let b = play(&mut tree, root, Color::Black, 3, 3);
        let c = play(&mut tree, root, Color::White, 3, 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(tree.children(root).len(), 2);
    }

    #[test]
    fn test_preorder_and_main_line() {
        let mut tree = MoveTree::new();
        let root = tree.root();
        let a = play(&mut tree, root, Color::Black, 0, 0);
        let b = play(&mut tree, a, Color::White, 1, 0);
        let c = play(&mut tree, a, Color::White, 2, 0);
        let d = play(&mut tree, b, Color::Black, 3, 0);
        assert_eq!(tree.preorder(), vec![root, a, b, d, c]);
        assert_eq!(tree.main_line(), vec![a, b, d]);
        assert_eq!(tree.path_to(c), vec![a, c]);
        assert_eq!(tree.depth(d), 3);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_detach() {
        let mut tree = MoveTree::new();
        let root = tree.root();
        let a = play(&mut tree, root, Color::Black, 0, 0);
        let b = play(&mut tree, root, Color::Black, 1, 1);
        tree.detach(a);
        assert_eq!(tree.children(root), &[b]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_value_propagation() {
        let mut tree = MoveTree::new();
        let root = tree.root();
        let a = play(&mut tree, root, Color::Black, 0, 0);
        let wrong = play(&mut tree, a, Color::White, 1, 0);
        let right = play(&mut tree, a, Color::White, 2, 0);

        tree.set_move_value(wrong, 0);
        assert_eq!(tree.node(a).value, 0);
        assert_eq!(tree.node(root).value, 0);

        tree.set_move_value(right, 100);
        assert_eq!(tree.node(a).value, 100);
        assert_eq!(tree.node(root).value, 100);

        // New children inherit the parent's value.
        let extra = play(&mut tree, right, Color::Black, 4, 4);
        assert_eq!(tree.node(extra).value, 100);
    }

    #[test]
    fn test_subtree_turns_root_move_into_setup() {
        let mut tree = MoveTree::new();
        let root = tree.root();
        let a = play(&mut tree, root, Color::Black, 2, 2);
        let b = play(&mut tree, a, Color::White, 3, 2);
        play(&mut tree, b, Color::Black, 4, 2);

        let sub = tree.subtree(a);
        let new_root = sub.node(sub.root());
        assert_eq!(new_root.mv, None);
        assert_eq!(
            new_root.setup,
            vec![SetupStone {
                point: (2, 2),
                color: Some(Color::Black)
            }]
        );
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.node(sub.main_line()[0]).mv, Some(Move::Play((3, 2))));
    }

    #[test]
    fn test_rotate_and_bounds() {
        let mut tree = MoveTree::new();
        let root = tree.root();
        let a = play(&mut tree, root, Color::Black, 0, 0);
        tree.add_child(a, Color::White, Move::Pass);
        tree.rotate_ccw(9);
        assert_eq!(tree.node(a).mv, Some(Move::Play((0, 8))));
        let rect = tree.move_bounds().unwrap();
        assert_eq!((rect.left, rect.top, rect.right, rect.bottom), (0, 8, 0, 8));
    }
}
