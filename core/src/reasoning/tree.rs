//! Thought tree arena.
//!
//! Every node lives in a single `Vec` owned by [`ThoughtTree`] and refers to
//! its parent and children by [`NodeId`]. A node's parent is fixed when the
//! node is created, so walking from any node back to the root always works.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ReasoningError, ReasoningResult};

/// Index of a node inside its [`ThoughtTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// The root of every tree.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One reasoning step plus its search statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtNode {
    /// Globally unique identifier
    pub uid: String,
    /// Step text (empty for the root)
    pub text: String,
    /// Language tag, e.g. "en" for a logical pivot or "th" for context
    pub language: String,
    /// Whether the step is shown to the end user
    pub visible: bool,
    /// Times this node was touched by backpropagation
    pub visit_count: u32,
    /// Sum of rewards backpropagated through this node
    pub total_reward: f64,
    /// Score assigned by the step evaluator
    pub step_score: f64,
    /// Empty expansions observed at this node
    pub empty_expansions: u32,
    id: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    terminal: bool,
}

impl ThoughtNode {
    fn new(id: NodeId, parent: Option<NodeId>, text: String, language: String, depth: usize) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            text,
            language,
            visible: false,
            visit_count: 0,
            total_reward: 0.0,
            step_score: 0.0,
            empty_expansions: 0,
            id,
            parent,
            children: Vec::new(),
            depth,
            terminal: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent node; `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Excluded from selection.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Mean reward, defined only once the node has been visited.
    pub fn value(&self) -> Option<f64> {
        if self.visit_count == 0 {
            None
        } else {
            Some(self.total_reward / self.visit_count as f64)
        }
    }

    /// UCB1 score relative to a parent with `parent_visits` visits.
    ///
    /// Unvisited nodes score `+inf` so they are always tried first.
    pub fn ucb1(&self, parent_visits: u32, exploration_weight: f64) -> f64 {
        match self.value() {
            None => f64::INFINITY,
            Some(exploitation) => {
                let parent_visits = parent_visits.max(1) as f64;
                let exploration =
                    exploration_weight * (parent_visits.ln() / self.visit_count as f64).sqrt();
                exploitation + exploration
            }
        }
    }
}

/// Arena owning every node of one search tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtTree {
    nodes: Vec<ThoughtNode>,
}

impl ThoughtTree {
    /// Create a tree holding only the root sentinel.
    ///
    /// The root starts with one visit so its children's exploration term is
    /// defined before the first backpropagation.
    pub fn new(language: &str) -> Self {
        let mut root = ThoughtNode::new(NodeId::ROOT, None, String::new(), language.to_string(), 0);
        root.visit_count = 1;
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> &ThoughtNode {
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is never removed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&ThoughtNode> {
        self.nodes.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> ReasoningResult<&ThoughtNode> {
        self.nodes.get(id.0).ok_or(ReasoningError::UnknownNode(id.0))
    }

    pub fn node_mut(&mut self, id: NodeId) -> ReasoningResult<&mut ThoughtNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or(ReasoningError::UnknownNode(id.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThoughtNode> {
        self.nodes.iter()
    }

    /// Append a child under `parent`; it inherits the parent's language.
    pub fn add_child(&mut self, parent: NodeId, text: impl Into<String>) -> ReasoningResult<NodeId> {
        let (language, depth) = {
            let p = self.node(parent)?;
            (p.language.clone(), p.depth + 1)
        };
        let id = NodeId(self.nodes.len());
        self.nodes
            .push(ThoughtNode::new(id, Some(parent), text.into(), language, depth));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Node ids from the first step down to `id`, root excluded.
    pub fn path_to(&self, id: NodeId) -> ReasoningResult<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            path.push(current.id);
            current = self.node(parent)?;
        }
        path.reverse();
        Ok(path)
    }

    /// Step texts from the first step down to `id`, root excluded.
    pub fn path_texts(&self, id: NodeId) -> ReasoningResult<Vec<String>> {
        Ok(self
            .path_to(id)?
            .into_iter()
            .map(|n| self.nodes[n.0].text.clone())
            .collect())
    }

    /// Add one visit and `reward` to `id` and every ancestor up to the root.
    pub fn backpropagate(&mut self, id: NodeId, reward: f64) -> ReasoningResult<()> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node_mut(node_id)?;
            node.visit_count += 1;
            node.total_reward += reward;
            current = node.parent;
        }
        Ok(())
    }

    /// Descend from the root by maximum UCB1 until reaching a leaf.
    ///
    /// Terminal children are skipped and ties go to the earlier child.
    /// Returns `None` once the root itself is terminal.
    pub fn select_leaf(&self, exploration_weight: f64) -> Option<NodeId> {
        let mut current = self.root();
        if current.terminal {
            return None;
        }
        loop {
            if current.children.is_empty() {
                return Some(current.id);
            }
            let mut best: Option<(&ThoughtNode, f64)> = None;
            for child in current.children.iter().map(|c| &self.nodes[c.0]) {
                if child.terminal {
                    continue;
                }
                let score = child.ucb1(current.visit_count, exploration_weight);
                match best {
                    Some((_, best_score)) if score <= best_score => {}
                    _ => best = Some((child, score)),
                }
            }
            current = best?.0;
        }
    }

    /// Path of most-visited children from the root, root excluded.
    ///
    /// Ties go to the earlier child, so the result is stable for an
    /// unchanged tree.
    pub fn best_path(&self) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.root();
        while !current.children.is_empty() {
            let mut best = &self.nodes[current.children[0].0];
            for child in current.children[1..].iter().map(|c| &self.nodes[c.0]) {
                if child.visit_count > best.visit_count {
                    best = child;
                }
            }
            path.push(best.id);
            current = best;
        }
        path
    }

    /// Exclude `id` from selection. Ancestors whose children are now all
    /// terminal become terminal too.
    pub fn mark_terminal(&mut self, id: NodeId) -> ReasoningResult<()> {
        self.node_mut(id)?.terminal = true;
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            let exhausted = self.nodes[parent.0]
                .children
                .iter()
                .all(|c| self.nodes[c.0].terminal);
            if !exhausted {
                break;
            }
            self.nodes[parent.0].terminal = true;
            current = self.nodes[parent.0].parent;
        }
        Ok(())
    }

    /// Deepest node depth in the tree.
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}
