use std::collections::VecDeque;

use log::trace;

use crate::ast::{NodeId, NodeKind, ScopeLinks, Tree};
use crate::config::Config;
use crate::error::{CallError, Result};
use crate::macros::{ArgSpec, DefinitionKeyword, MacroDefinition, MacroRegistry};

/// Resolves user macros by copying a tree with every call replaced by its
/// expansion. The input tree is never modified.
pub struct Expander<'r> {
    registry: &'r MacroRegistry,
    max_depth: usize,
    max_nesting: usize,
}

/// Where a copy stands: nested expansions, the level of the output parent
/// and the innermost macro being expanded.
#[derive(Debug, Clone, Copy)]
struct Depth<'r> {
    expansions: usize,
    nesting: usize,
    within: Option<&'r str>,
}

impl<'r> Expander<'r> {
    pub fn new(registry: &'r MacroRegistry) -> Self {
        let config = Config::default();
        Self {
            registry,
            max_depth: config.max_expansion_depth,
            max_nesting: config.max_nesting_depth,
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.max_depth = config.max_expansion_depth;
        self.max_nesting = config.max_nesting_depth;
        self
    }

    /// A resolved copy of `tree`. Definition commands are dropped and macro
    /// calls expanded, including calls produced by other expansions.
    pub fn resolve(&self, tree: &Tree) -> Result<Tree> {
        let mut out = Tree::new();
        let root = out.root();
        let mut scopes = ScopeLinks::default();
        let depth = Depth {
            expansions: 0,
            nesting: 0,
            within: None,
        };
        self.expand_children(tree, tree.root(), &mut out, root, &mut scopes, depth)?;
        Ok(out)
    }

    fn expand_children(
        &self,
        src: &Tree,
        node: NodeId,
        out: &mut Tree,
        parent: NodeId,
        scopes: &mut ScopeLinks,
        depth: Depth<'r>,
    ) -> Result<()> {
        // Built trees already respect the nesting limit; expansions may not.
        if let Some(name) = depth.within.filter(|_| depth.nesting > self.max_nesting) {
            return Err(CallError::NestingTooDeep {
                name: name.to_string(),
                limit: self.max_nesting,
            }
            .into());
        }

        let children = src.children(node);
        let mut i = 0;
        while i < children.len() {
            let child = children[i];
            let kind = src.kind(child);
            if let Some(name) = kind.command_name() {
                if let Some(keyword) = DefinitionKeyword::from_name(name) {
                    // Definitions are side effects only; skip a paired declarator too.
                    if let Some(declarator) = keyword.declarator(src, children, i) {
                        i = declarator;
                    }
                    i += 1;
                    continue;
                }

                if let Some(definition) = self.registry.get(name) {
                    if depth.expansions >= self.max_depth {
                        return Err(CallError::ExpansionTooDeep {
                            name: name.to_string(),
                            limit: self.max_depth,
                        }
                        .into());
                    }
                    trace!("expanding \\{name} at depth {}", depth.expansions);
                    let expansion = call(definition, src, child)?;
                    let inner = Depth {
                        expansions: depth.expansions + 1,
                        within: Some(definition.name()),
                        ..depth
                    };
                    self.expand_children(&expansion, expansion.root(), out, parent, scopes, inner)?;
                    i += 1;
                    continue;
                }
            }

            // Dropped definitions leave their surrounding blanks adjacent.
            let repeated = matches!(kind, NodeKind::Whitespace | NodeKind::ParagraphBreak)
                && out.last_child(parent).is_some_and(|last| out.kind(last) == kind);
            if !repeated {
                let copy = out.append_copy(parent, kind, scopes);
                let inner = Depth {
                    nesting: depth.nesting + 1,
                    ..depth
                };
                self.expand_children(src, child, out, copy, scopes, inner)?;
            }
            i += 1;
        }
        Ok(())
    }
}

/// Expand one call of `definition` at `invocation` in `tree`: bind the
/// call's parameters and substitute them into a copy of the body.
pub fn call(
    definition: &MacroDefinition,
    tree: &Tree,
    invocation: NodeId,
) -> std::result::Result<Tree, CallError> {
    let bound = bind(definition, tree, invocation)?;

    let mut out = Tree::new();
    let root = out.root();
    let mut scopes = ScopeLinks::default();
    let body = definition.body();
    for &node in body.children(body.root()) {
        substitute(definition, body, node, &bound, &mut out, root, &mut scopes)?;
    }
    Ok(out)
}

/// An argument value: the children of a node in some tree.
type Bound<'a> = (&'a Tree, NodeId);

/// Pair the declared arguments with the call's parameters. Required and
/// optional parameters are consumed separately, each in source order.
fn bind<'a>(
    definition: &'a MacroDefinition,
    tree: &'a Tree,
    invocation: NodeId,
) -> std::result::Result<Vec<Bound<'a>>, CallError> {
    let mut required: VecDeque<NodeId> = tree.required_parameters(invocation).into();
    let mut optional: VecDeque<NodeId> = tree.optional_parameters(invocation).into();
    let supplied = required.len() + optional.len();

    let mut bound = Vec::with_capacity(definition.arity());
    for (index, arg) in definition.args().iter().enumerate() {
        match arg {
            ArgSpec::Mandatory => {
                let param = required
                    .pop_front()
                    .ok_or_else(|| CallError::MissingArgument {
                        name: definition.name().to_string(),
                        index: index + 1,
                        expected: definition.arity(),
                        location: definition.location(),
                    })?;
                bound.push((tree, param));
            }
            ArgSpec::Optional(default) => match optional.pop_front() {
                Some(param) => bound.push((tree, param)),
                None => bound.push((default, default.root())),
            },
        }
    }

    if !required.is_empty() || !optional.is_empty() {
        return Err(CallError::TooManyArguments {
            name: definition.name().to_string(),
            expected: definition.arity(),
            found: supplied,
            location: definition.location(),
        });
    }
    Ok(bound)
}

/// Copy `node` of the body under `parent`, replacing each placeholder with
/// the nodes of its bound argument.
fn substitute(
    definition: &MacroDefinition,
    body: &Tree,
    node: NodeId,
    bound: &[Bound<'_>],
    out: &mut Tree,
    parent: NodeId,
    scopes: &mut ScopeLinks,
) -> std::result::Result<(), CallError> {
    if let NodeKind::Placeholder(index) = *body.kind(node) {
        let &(tree, value) = index
            .checked_sub(1)
            .and_then(|i| bound.get(i))
            .ok_or_else(|| CallError::PlaceholderOutOfRange {
                name: definition.name().to_string(),
                index,
                bound: bound.len(),
                location: definition.location(),
            })?;
        for &child in tree.children(value) {
            out.graft(parent, tree, child, scopes);
        }
        return Ok(());
    }

    let copy = out.append_copy(parent, body.kind(node), scopes);
    for &child in body.children(node) {
        substitute(definition, body, child, bound, out, copy, scopes)?;
    }
    Ok(())
}
