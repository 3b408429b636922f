use std::collections::HashMap;

use log::debug;

use crate::ast::{NodeId, NodeKind, Tree};
use crate::error::{DefinitionError, Result};
use crate::lexer::Location;
use crate::parser::TreeBuilder;

/// How a definition declares its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionStyle {
    /// `\newcommand{\name}[nargs][default]{body}`
    OldStyle,
    /// `\NewDocumentCommand\name{argspec}{body}`
    Xparse,
}

/// Commands that define macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKeyword {
    NewCommand,
    RenewCommand,
    ProvideCommand,
    NewDocumentCommand,
    RenewDocumentCommand,
    DeclareDocumentCommand,
    ProvideDocumentCommand,
}

impl DefinitionKeyword {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "newcommand" | "newcommand*" => Some(Self::NewCommand),
            "renewcommand" | "renewcommand*" => Some(Self::RenewCommand),
            "providecommand" | "providecommand*" => Some(Self::ProvideCommand),
            "NewDocumentCommand" => Some(Self::NewDocumentCommand),
            "RenewDocumentCommand" => Some(Self::RenewDocumentCommand),
            "DeclareDocumentCommand" => Some(Self::DeclareDocumentCommand),
            "ProvideDocumentCommand" => Some(Self::ProvideDocumentCommand),
            _ => None,
        }
    }

    pub fn style(self) -> DefinitionStyle {
        match self {
            Self::NewCommand | Self::RenewCommand | Self::ProvideCommand => {
                DefinitionStyle::OldStyle
            }
            _ => DefinitionStyle::Xparse,
        }
    }

    /// Whether the definition replaces an existing one of the same name.
    pub fn overrides(self) -> bool {
        !matches!(self, Self::ProvideCommand | Self::ProvideDocumentCommand)
    }

    /// For an xparse keyword without parameters of its own, the index of
    /// the sibling command declaring name, argspec and body. Whitespace
    /// between the two is skipped.
    pub fn declarator(self, tree: &Tree, siblings: &[NodeId], index: usize) -> Option<usize> {
        if self.style() != DefinitionStyle::Xparse || !tree.children(siblings[index]).is_empty() {
            return None;
        }

        let next = siblings[index + 1..]
            .iter()
            .position(|&id| *tree.kind(id) != NodeKind::Whitespace)?
            + index
            + 1;
        tree.kind(siblings[next]).is_command().then_some(next)
    }
}

/// One declared macro argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSpec {
    Mandatory,
    /// Optional, with the nodes used when the call doesn't supply it.
    Optional(Tree),
}

impl ArgSpec {
    /// An optional argument that is empty when not supplied.
    pub fn optional() -> Self {
        ArgSpec::Optional(Tree::new())
    }
}

/// A user macro: its argument list and a body with placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDefinition {
    name: String,
    args: Vec<ArgSpec>,
    body: Tree,
    location: Option<Location>,
}

impl MacroDefinition {
    /// A definition supplied by the host rather than found in the source.
    pub fn new(name: impl Into<String>, args: Vec<ArgSpec>, body: Tree) -> Self {
        Self {
            name: name.into(),
            args,
            body,
            location: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Body nodes hang below the root of this tree.
    pub fn body(&self) -> &Tree {
        &self.body
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// `\newcommand`, `\renewcommand` and `\providecommand`:
    ///
    /// ```text
    /// \newcommand{\cmd}{body}
    /// \newcommand{\cmd}[nargs]{body}
    /// \newcommand{\cmd}[nargs][default]{body}
    /// ```
    ///
    /// `nargs` counts all arguments, 0 to 9. Without it the highest
    /// placeholder in the body decides. With a default the first argument
    /// is optional and the required ones start at `#2`.
    fn old_style(
        tree: &Tree,
        command: NodeId,
        keyword: &str,
        location: Option<Location>,
    ) -> std::result::Result<Self, DefinitionError> {
        let required = tree.required_parameters(command);
        if required.len() != 2 {
            return Err(DefinitionError::ParameterCount {
                command: keyword.to_string(),
                expected: 2,
                found: required.len(),
                location,
            });
        }

        let optional = tree.optional_parameters(command);
        if optional.len() > 2 {
            return Err(DefinitionError::OptionalParameterCount {
                command: keyword.to_string(),
                found: optional.len(),
                location,
            });
        }

        let name = declared_name(tree, required[0]).ok_or_else(|| DefinitionError::MissingName {
            command: keyword.to_string(),
            location,
        })?;

        let nargs = match optional.first() {
            Some(&param) => {
                let text = tree.text(param);
                parse_nargs(&text).ok_or(DefinitionError::ArgumentCount { text, location })?
            }
            None => highest_placeholder(tree, required[1]),
        };

        let mut args = Vec::with_capacity(nargs);
        if let Some(&default) = optional.get(1) {
            if nargs == 0 {
                return Err(DefinitionError::DefaultWithoutArguments {
                    command: keyword.to_string(),
                    location,
                });
            }
            args.push(ArgSpec::Optional(Tree::fragment(tree, tree.children(default))));
        }
        args.resize(nargs, ArgSpec::Mandatory);

        Ok(Self {
            name,
            args,
            body: Tree::fragment(tree, tree.children(required[1])),
            location,
        })
    }

    /// `\NewDocumentCommand` and friends, either paired with a declarator
    /// (`\NewDocumentCommand\cmd{argspec}{body}`) or braced
    /// (`\NewDocumentCommand{\cmd}{argspec}{body}`).
    fn xparse(
        tree: &Tree,
        command: NodeId,
        declarator: Option<NodeId>,
        keyword: &str,
        location: Option<Location>,
    ) -> std::result::Result<Self, DefinitionError> {
        let (name, argspec, body) = match declarator {
            Some(declarator) => {
                let name = tree.kind(declarator).command_name().unwrap_or_default();
                let required = tree.required_parameters(declarator);
                if required.len() != 2 || tree.children(declarator).len() != 2 {
                    return Err(DefinitionError::ParameterCount {
                        command: name.to_string(),
                        expected: 2,
                        found: required.len(),
                        location,
                    });
                }
                (name.to_string(), required[0], required[1])
            }
            None => {
                if tree.children(command).is_empty() {
                    return Err(DefinitionError::MissingName {
                        command: keyword.to_string(),
                        location,
                    });
                }
                let required = tree.required_parameters(command);
                if required.len() != 3 || tree.children(command).len() != 3 {
                    return Err(DefinitionError::ParameterCount {
                        command: keyword.to_string(),
                        expected: 3,
                        found: required.len(),
                        location,
                    });
                }
                let name = declared_name(tree, required[0]).ok_or_else(|| {
                    DefinitionError::MissingName {
                        command: keyword.to_string(),
                        location,
                    }
                })?;
                (name, required[1], required[2])
            }
        };

        let args = parse_argspec(tree, argspec, &name, location)?;
        Ok(Self {
            name,
            args,
            body: Tree::fragment(tree, tree.children(body)),
            location,
        })
    }
}

/// Name of the first command inside a name parameter.
fn declared_name(tree: &Tree, param: NodeId) -> Option<String> {
    let command = tree.first(param, NodeKind::is_command)?;
    tree.kind(command).command_name().map(str::to_string)
}

fn highest_placeholder(tree: &Tree, node: NodeId) -> usize {
    tree.descendants(node)
        .into_iter()
        .filter_map(|id| match tree.kind(id) {
            NodeKind::Placeholder(index) => Some(*index),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

fn parse_nargs(text: &str) -> Option<usize> {
    text.trim().parse().ok().filter(|&n| n <= 9)
}

/// Read an xparse argument specification from the nodes of a parameter.
///
/// `m` is mandatory, `o` optional and empty when absent, `O{default}`
/// optional with the nodes between the braces as default.
pub fn parse_argspec(
    tree: &Tree,
    param: NodeId,
    name: &str,
    location: Option<Location>,
) -> std::result::Result<Vec<ArgSpec>, DefinitionError> {
    let unsupported = |spec: String| DefinitionError::UnsupportedArgument {
        name: name.to_string(),
        spec,
        location,
    };
    let missing_default = || DefinitionError::MissingDefault {
        name: name.to_string(),
        location,
    };

    let children = tree.children(param);
    let mut args = Vec::new();
    let mut i = 0;
    while i < children.len() {
        match tree.kind(children[i]) {
            NodeKind::Whitespace => {}
            NodeKind::Text(text) => {
                let mut chars = text.chars().peekable();
                while let Some(c) = chars.next() {
                    match c {
                        'm' => args.push(ArgSpec::Mandatory),
                        'o' => args.push(ArgSpec::optional()),
                        'O' => {
                            if chars.peek().is_some() {
                                return Err(missing_default());
                            }
                            let (default, end) =
                                default_group(tree, children, i + 1).ok_or_else(missing_default)?;
                            args.push(ArgSpec::Optional(default));
                            i = end;
                        }
                        c if c.is_whitespace() => {}
                        other => return Err(unsupported(other.to_string())),
                    }
                }
            }
            other => return Err(unsupported(other.describe())),
        }
        i += 1;
    }
    Ok(args)
}

/// The brace group starting at or after `start` (whitespace skipped): its
/// content as a fragment and the index of its `EndScope`.
fn default_group(tree: &Tree, children: &[NodeId], start: usize) -> Option<(Tree, usize)> {
    let begin = start
        + children
            .get(start..)?
            .iter()
            .position(|&id| *tree.kind(id) != NodeKind::Whitespace)?;
    let end_id = tree.scope_end(children[begin])?;
    let end = begin + children[begin..].iter().position(|&id| id == end_id)?;
    Some((Tree::fragment(tree, &children[begin + 1..end]), end))
}

/// Registry of macro definitions by name.
#[derive(Debug, Default, Clone)]
pub struct MacroRegistry(HashMap<String, MacroDefinition>);

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the definitions in a tree. Later definitions of a name win,
    /// except for the provide variants.
    pub fn from_tree(tree: &Tree) -> std::result::Result<Self, DefinitionError> {
        let mut registry = Self::new();
        registry.scan(tree, tree.root())?;
        Ok(registry)
    }

    /// Register every definition found in source text.
    pub fn load(&mut self, source: &str) -> Result<()> {
        let tree = TreeBuilder::new(source).build()?;
        self.scan(&tree, tree.root())?;
        Ok(())
    }

    /// Register a macro definition, replacing any earlier one.
    pub fn define(&mut self, definition: MacroDefinition) {
        self.0.insert(definition.name.clone(), definition);
    }

    /// Get a macro definition by name
    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.0.get(name)
    }

    /// Check if a macro is defined
    pub fn is_defined(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Defined names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Merge `other` on top of this registry.
    pub fn extend(&mut self, other: &MacroRegistry) {
        for definition in other.0.values() {
            self.define(definition.clone());
        }
    }

    /// Look for definitions among the children of `node`, descending into
    /// everything but commands.
    fn scan(&mut self, tree: &Tree, node: NodeId) -> std::result::Result<(), DefinitionError> {
        let children = tree.children(node);
        let mut i = 0;
        while i < children.len() {
            let child = children[i];
            match tree.kind(child) {
                NodeKind::Command { name, location } => {
                    if let Some(keyword) = DefinitionKeyword::from_name(name) {
                        let definition = match keyword.style() {
                            DefinitionStyle::OldStyle => {
                                MacroDefinition::old_style(tree, child, name, *location)?
                            }
                            DefinitionStyle::Xparse => {
                                let declarator = keyword.declarator(tree, children, i);
                                let definition = MacroDefinition::xparse(
                                    tree,
                                    child,
                                    declarator.map(|j| children[j]),
                                    name,
                                    *location,
                                )?;
                                if let Some(j) = declarator {
                                    i = j;
                                }
                                definition
                            }
                        };
                        self.register(definition, keyword);
                    }
                }
                _ => self.scan(tree, child)?,
            }
            i += 1;
        }
        Ok(())
    }

    fn register(&mut self, definition: MacroDefinition, keyword: DefinitionKeyword) {
        if !keyword.overrides() && self.is_defined(&definition.name) {
            debug!("\\{} already defined, keeping it", definition.name);
            return;
        }
        debug!(
            "registered \\{} with {} arguments",
            definition.name,
            definition.arity()
        );
        self.define(definition);
    }
}
