use std::fmt::Write as _;

use crate::lexer::Location;

/// Index of a node inside its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Environment(String),
    /// A command; its children are parameters only. The location is kept
    /// for macro definition commands.
    Command {
        name: String,
        location: Option<Location>,
    },
    OptionalParameter,
    RequiredParameter,
    LineBreak,
    ParagraphBreak,
    /// A curly brace that is not a parameter, linked to its `EndScope`.
    BeginScope {
        end: Option<NodeId>,
    },
    EndScope {
        begin: Option<NodeId>,
    },
    Whitespace,
    Text(String),
    /// `#N`, 1-based.
    Placeholder(usize),
}

impl NodeKind {
    pub fn command(name: impl Into<String>) -> Self {
        NodeKind::Command {
            name: name.into(),
            location: None,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, NodeKind::Command { .. })
    }

    pub fn is_parameter(&self) -> bool {
        matches!(
            self,
            NodeKind::OptionalParameter | NodeKind::RequiredParameter
        )
    }

    /// Command name, if this is a command.
    pub fn command_name(&self) -> Option<&str> {
        match self {
            NodeKind::Command { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The same kind without scope links, for copying into another tree.
    pub fn unlinked(&self) -> NodeKind {
        match self {
            NodeKind::BeginScope { .. } => NodeKind::BeginScope { end: None },
            NodeKind::EndScope { .. } => NodeKind::EndScope { begin: None },
            kind => kind.clone(),
        }
    }

    /// Short human readable name, used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            NodeKind::Root => "Root".to_string(),
            NodeKind::Environment(name) => format!("Environment “{name}”"),
            NodeKind::Command { name, .. } => format!("Command “{name}”"),
            NodeKind::OptionalParameter => "OptionalParameter".to_string(),
            NodeKind::RequiredParameter => "RequiredParameter".to_string(),
            NodeKind::LineBreak => "LineBreak".to_string(),
            NodeKind::ParagraphBreak => "ParagraphBreak".to_string(),
            NodeKind::BeginScope { .. } => "BeginScope".to_string(),
            NodeKind::EndScope { .. } => "EndScope".to_string(),
            NodeKind::Whitespace => "Whitespace".to_string(),
            NodeKind::Text(text) => format!("Text “{text}”"),
            NodeKind::Placeholder(index) => format!("Placeholder #{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Back reference for upward walks; the tree owns every node.
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena of nodes rooted at a `Root` node.
///
/// Node ids are only meaningful for the tree that issued them.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True if the root has no children.
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// Append a new node to `parent` and return its id.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        debug_assert!(
            !self.kind(parent).is_command() || kind.is_parameter(),
            "commands only take parameters"
        );
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Link a `BeginScope`/`EndScope` pair both ways.
    pub fn link_scope(&mut self, begin: NodeId, end: NodeId) {
        if let NodeKind::BeginScope { end: link } = &mut self.nodes[begin.0].kind {
            *link = Some(end);
        }
        if let NodeKind::EndScope { begin: link } = &mut self.nodes[end.0].kind {
            *link = Some(begin);
        }
    }

    /// The `EndScope` matching a `BeginScope`.
    pub fn scope_end(&self, begin: NodeId) -> Option<NodeId> {
        match self.kind(begin) {
            NodeKind::BeginScope { end } => *end,
            _ => None,
        }
    }

    /// The `BeginScope` matching an `EndScope`.
    pub fn scope_begin(&self, end: NodeId) -> Option<NodeId> {
        match self.kind(end) {
            NodeKind::EndScope { begin } => *begin,
            _ => None,
        }
    }

    /// Walk from `from` (inclusive) towards the root and return the first
    /// node matching `pred`. The root itself is never returned.
    pub fn walk_up_to(&self, from: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        let mut here = from;
        loop {
            if here == self.root() {
                return None;
            }
            if pred(self.kind(here)) {
                return Some(here);
            }
            here = self.parent(here)?;
        }
    }

    /// Number of ancestors of `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut here = id;
        while let Some(parent) = self.parent(here) {
            depth += 1;
            here = parent;
        }
        depth
    }

    /// All descendants of `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// First descendant of `id` in document order matching `pred`.
    pub fn first(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&node| pred(self.kind(node)))
    }

    pub fn optional_parameters(&self, command: NodeId) -> Vec<NodeId> {
        self.parameters_of(command, NodeKind::OptionalParameter)
    }

    pub fn required_parameters(&self, command: NodeId) -> Vec<NodeId> {
        self.parameters_of(command, NodeKind::RequiredParameter)
    }

    fn parameters_of(&self, command: NodeId, kind: NodeKind) -> Vec<NodeId> {
        self.children(command)
            .iter()
            .copied()
            .filter(|&child| *self.kind(child) == kind)
            .collect()
    }

    /// Flatten the text below `id`: text content, whitespace as a single
    /// space, breaks as newlines and unsubstituted placeholders as `#N`.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            match self.kind(node) {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Whitespace => out.push(' '),
                NodeKind::Placeholder(index) => {
                    let _ = write!(out, "#{index}");
                }
                NodeKind::LineBreak => out.push('\n'),
                NodeKind::ParagraphBreak => out.push_str("\n\n"),
                _ => {}
            }
        }
        out
    }

    /// Flattened text of the whole tree.
    pub fn to_text(&self) -> String {
        self.text(self.root())
    }

    /// Indented one-node-per-line dump, for debugging and tests.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, level)) = stack.pop() {
            let _ = writeln!(
                out,
                "{}{} ({})",
                "  ".repeat(level),
                self.kind(id).describe(),
                self.children(id).len()
            );
            stack.extend(self.children(id).iter().rev().map(|&c| (c, level + 1)));
        }
        out
    }

    /// Deep copy of `id` from `src` under `parent`. Scope pairs inside the
    /// copy are relinked through `scopes`.
    ///
    /// Expanded trees are not depth limited, so the copy walks with an
    /// explicit stack.
    pub fn graft(
        &mut self,
        parent: NodeId,
        src: &Tree,
        id: NodeId,
        scopes: &mut ScopeLinks,
    ) -> NodeId {
        let copy = self.append_copy(parent, src.kind(id), scopes);
        let mut stack: Vec<(NodeId, NodeId)> = src
            .children(id)
            .iter()
            .rev()
            .map(|&child| (child, copy))
            .collect();
        while let Some((next, under)) = stack.pop() {
            let copied = self.append_copy(under, src.kind(next), scopes);
            stack.extend(src.children(next).iter().rev().map(|&child| (child, copied)));
        }
        copy
    }

    /// Append a copy of a single node kind under `parent`, pairing scope
    /// markers through `scopes`.
    pub fn append_copy(
        &mut self,
        parent: NodeId,
        kind: &NodeKind,
        scopes: &mut ScopeLinks,
    ) -> NodeId {
        let copy = self.append(parent, kind.unlinked());
        match kind {
            NodeKind::BeginScope { .. } => scopes.open(copy),
            NodeKind::EndScope { .. } => {
                if let Some(begin) = scopes.close() {
                    self.link_scope(begin, copy);
                }
            }
            _ => {}
        }
        copy
    }

    /// A new tree whose root holds copies of `ids` from `src`.
    pub fn fragment(src: &Tree, ids: &[NodeId]) -> Tree {
        let mut tree = Tree::new();
        let root = tree.root();
        let mut scopes = ScopeLinks::default();
        for &id in ids {
            tree.graft(root, src, id, &mut scopes);
        }
        tree
    }
}

/// Stack of copied `BeginScope` nodes still waiting for their `EndScope`.
#[derive(Debug, Default)]
pub struct ScopeLinks(Vec<NodeId>);

impl ScopeLinks {
    pub fn open(&mut self, begin: NodeId) {
        self.0.push(begin);
    }

    pub fn close(&mut self) -> Option<NodeId> {
        self.0.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
