//! Front end of a preprocessor for a LaTeX-like markup dialect: source text
//! is built into a [`Tree`], then user macros defined with `\newcommand`
//! and `\NewDocumentCommand` are expanded into a resolved copy of it.

pub mod ast;
pub mod config;
pub mod error;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod processor;

pub use ast::{NodeId, NodeKind, Tree};
pub use config::Config;
pub use error::{CallError, DefinitionError, Error, ParseError, Result};
pub use lexer::Location;
pub use macros::{ArgSpec, MacroDefinition, MacroRegistry};
pub use processor::Expander;

use parser::TreeBuilder;

/// Parse source text and resolve its macros with the default limits.
pub fn parse(source: &str) -> Result<Tree> {
    Processor::new().process(source)
}

/// Parses and resolves source text, optionally with host-provided macros
/// that override the ones defined in the source.
#[derive(Debug, Default, Clone)]
pub struct Processor {
    config: Config,
    macros: MacroRegistry,
}

impl Processor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_macros(mut self, macros: MacroRegistry) -> Self {
        self.macros = macros;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The unresolved tree, definitions and calls still in place.
    pub fn build(&self, source: &str) -> Result<Tree> {
        TreeBuilder::new(source).with_config(&self.config).build()
    }

    /// A resolved copy of `tree`.
    pub fn resolve(&self, tree: &Tree) -> Result<Tree> {
        let mut registry = MacroRegistry::from_tree(tree)?;
        registry.extend(&self.macros);
        Expander::new(&registry)
            .with_config(&self.config)
            .resolve(tree)
    }

    pub fn process(&self, source: &str) -> Result<Tree> {
        let tree = self.build(source)?;
        self.resolve(&tree)
    }
}
