use std::collections::HashMap;

use log::debug;

use crate::ast::{NodeId, NodeKind, Tree};
use crate::config::Config;
use crate::error::{ParseError, Result};
use crate::lexer::{Location, TexLexer, TokenKind};
use crate::macros::DefinitionKeyword;

/// Single-pass state machine turning tokens into a [`Tree`].
pub struct TreeBuilder<'s> {
    source: &'s str,
    tree: Tree,
    /// The currently open node.
    here: NodeId,
    /// Open `BeginScope`s per node, with the offset of their brace.
    scopes: HashMap<NodeId, Vec<(NodeId, usize)>>,
    /// Literal `[` per node still waiting for their `]`.
    brackets: HashMap<NodeId, usize>,
    offset: usize,
    max_depth: usize,
}

impl<'s> TreeBuilder<'s> {
    pub fn new(source: &'s str) -> Self {
        let tree = Tree::new();
        let here = tree.root();
        Self {
            source,
            tree,
            here,
            scopes: HashMap::new(),
            brackets: HashMap::new(),
            offset: 0,
            max_depth: Config::default().max_nesting_depth,
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.max_depth = config.max_nesting_depth;
        self
    }

    /// Tokenize the source and build the tree. Aborts on the first error.
    pub fn build(mut self) -> Result<Tree> {
        let tokens = TexLexer::tokenize(self.source)?;
        for token in tokens {
            self.offset = token.offset;
            self.step(token.kind)?;
        }
        self.finish()
    }

    fn step(&mut self, kind: TokenKind<'_>) -> Result<()> {
        match kind {
            TokenKind::BeginEnvironment(name) => {
                self.close_command();
                if self.scope_open(self.here) {
                    return Err(ParseError::EnvironmentInScope {
                        name: name.to_string(),
                        location: self.location(),
                    }
                    .into());
                }
                self.descend(NodeKind::Environment(name.to_string()))?;
            }
            TokenKind::EndEnvironment(name) => self.end_environment(name)?,
            TokenKind::Command(name) => {
                self.close_command();
                // Locating is a scan of the source; only definitions need it.
                let location = DefinitionKeyword::from_name(name).map(|_| self.location());
                self.descend(NodeKind::Command {
                    name: name.to_string(),
                    location,
                })?;
            }
            TokenKind::OpenOptional => {
                if self.at_command() {
                    self.descend(NodeKind::OptionalParameter)?;
                } else {
                    *self.brackets.entry(self.here).or_default() += 1;
                    self.append(NodeKind::Text("[".to_string()));
                }
            }
            TokenKind::CloseOptional => {
                self.close_command();
                self.close_optional()?;
            }
            TokenKind::OpenCurly => {
                if self.at_command() {
                    self.descend(NodeKind::RequiredParameter)?;
                } else {
                    let begin = self.append(NodeKind::BeginScope { end: None });
                    self.scopes
                        .entry(self.here)
                        .or_default()
                        .push((begin, self.offset));
                }
            }
            TokenKind::CloseCurly => self.close_curly()?,
            TokenKind::LineBreak => {
                self.close_command();
                self.append(NodeKind::LineBreak);
            }
            TokenKind::BlankLines(_) => {
                self.close_command();
                self.append_coalesced(NodeKind::ParagraphBreak);
            }
            TokenKind::Comment => {}
            TokenKind::Whitespace => {
                self.close_command();
                self.append_coalesced(NodeKind::Whitespace);
            }
            TokenKind::Placeholder(index) => {
                self.close_command();
                self.append(NodeKind::Placeholder(index));
            }
            TokenKind::Word(word) => {
                self.close_command();
                self.append(NodeKind::Text(word.into_owned()));
            }
            TokenKind::Text(text) => {
                self.close_command();
                self.append(NodeKind::Text(text.to_string()));
            }
        }
        Ok(())
    }

    fn end_environment(&mut self, name: &str) -> Result<()> {
        self.close_command();

        let mut here = self.here;
        loop {
            if self.scope_open(here) {
                return Err(ParseError::EnvironmentNotClosed {
                    name: name.to_string(),
                    location: self.location(),
                }
                .into());
            }

            if let NodeKind::Environment(open) = self.tree.kind(here) {
                if open != name {
                    return Err(ParseError::EnvironmentMismatch {
                        expected: open.clone(),
                        found: name.to_string(),
                        location: self.location(),
                    }
                    .into());
                }
                break;
            }

            match self.tree.parent(here) {
                Some(parent) => here = parent,
                None => {
                    return Err(ParseError::NotInEnvironment {
                        name: name.to_string(),
                        location: self.location(),
                    }
                    .into());
                }
            }
        }

        self.here = self.tree.parent(here).unwrap_or(self.tree.root());
        Ok(())
    }

    fn close_optional(&mut self) -> Result<()> {
        let literal = match self.brackets.get_mut(&self.here) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        };
        if literal {
            self.append(NodeKind::Text("]".to_string()));
            return Ok(());
        }

        if *self.tree.kind(self.here) != NodeKind::OptionalParameter {
            return Err(ParseError::OptionalParameterOutsideCommand {
                location: self.location(),
            }
            .into());
        }
        if self.scope_open(self.here) {
            return Err(ParseError::ScopeInOptionalParameter {
                location: self.location(),
            }
            .into());
        }
        self.ascend();
        Ok(())
    }

    fn close_curly(&mut self) -> Result<()> {
        let after_command = self.at_command();
        self.close_command();

        let open = self.scopes.get_mut(&self.here).and_then(|stack| stack.pop());
        if let Some((begin, _)) = open {
            let end = self.append(NodeKind::EndScope { begin: None });
            self.tree.link_scope(begin, end);
            return Ok(());
        }

        if *self.tree.kind(self.here) == NodeKind::RequiredParameter {
            // Back to the owning command, which may take more parameters.
            self.ascend();
            return Ok(());
        }

        let location = self.location();
        if after_command {
            Err(ParseError::UnmatchedBraceAfterCommand { location }.into())
        } else {
            Err(ParseError::StrayClosingBrace { location }.into())
        }
    }

    fn finish(mut self) -> Result<Tree> {
        self.close_command();

        let root = self.tree.root();
        if self.here != root {
            return Err(ParseError::UnexpectedEnd {
                open: self.tree.kind(self.here).describe(),
                location: Location::locate(self.source, self.source.len()),
            }
            .into());
        }
        if let Some(&(_, offset)) = self.scopes.get(&root).and_then(|stack| stack.first()) {
            return Err(ParseError::UnclosedBrace {
                location: Location::locate(self.source, offset),
            }
            .into());
        }

        debug!("built tree with {} nodes", self.tree.node_count());
        Ok(self.tree)
    }

    fn at_command(&self) -> bool {
        self.tree.kind(self.here).is_command()
    }

    /// Commands end at the first token that isn't one of their parameters.
    fn close_command(&mut self) {
        if self.at_command() {
            self.ascend();
        }
    }

    fn ascend(&mut self) {
        if let Some(parent) = self.tree.parent(self.here) {
            self.here = parent;
        }
    }

    fn descend(&mut self, kind: NodeKind) -> Result<()> {
        if self.tree.depth(self.here) >= self.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.max_depth,
                location: self.location(),
            }
            .into());
        }
        self.here = self.tree.append(self.here, kind);
        Ok(())
    }

    fn append(&mut self, kind: NodeKind) -> NodeId {
        self.tree.append(self.here, kind)
    }

    /// Append unless the last child already is of the same kind.
    fn append_coalesced(&mut self, kind: NodeKind) {
        let last = self.tree.last_child(self.here);
        if last.is_none_or(|id| *self.tree.kind(id) != kind) {
            self.append(kind);
        }
    }

    fn scope_open(&self, id: NodeId) -> bool {
        self.scopes.get(&id).is_some_and(|stack| !stack.is_empty())
    }

    fn location(&self) -> Location {
        Location::locate(self.source, self.offset)
    }
}
