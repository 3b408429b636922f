use thiserror::Error;

use crate::lexer::{Location, Rule};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("lexical error at {location}: {message}")]
    Lex { message: String, location: Location },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Call(#[from] CallError),
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        Error::Lex {
            message: err.variant.message().into_owned(),
            location: Location::new(line, column),
        }
    }
}

/// Structural errors raised while building the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("can’t begin environment “{name}” within a scope at {location}")]
    EnvironmentInScope { name: String, location: Location },

    #[error("environment “{name}” closed with an open scope at {location}")]
    EnvironmentNotClosed { name: String, location: Location },

    #[error("“\\end{{{name}}}” outside of any environment at {location}")]
    NotInEnvironment { name: String, location: Location },

    #[error("“\\end{{{found}}}” closes environment “{expected}” at {location}")]
    EnvironmentMismatch {
        expected: String,
        found: String,
        location: Location,
    },

    #[error("optional parameter closed outside of a command at {location}")]
    OptionalParameterOutsideCommand { location: Location },

    #[error("optional parameter closed with an open scope at {location}")]
    ScopeInOptionalParameter { location: Location },

    #[error("closing curly brace without opening at {location}")]
    StrayClosingBrace { location: Location },

    #[error("closing curly brace after command without opening at {location}")]
    UnmatchedBraceAfterCommand { location: Location },

    #[error("unclosed curly brace opened at {location}")]
    UnclosedBrace { location: Location },

    #[error("unexpected end of input inside {open} at {location}")]
    UnexpectedEnd { open: String, location: Location },

    #[error("nesting deeper than {limit} levels at {location}")]
    TooDeep { limit: usize, location: Location },
}

/// Errors in a macro definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("\\{command} requires {expected} required parameters, not {found}{}", at(.location))]
    ParameterCount {
        command: String,
        expected: usize,
        found: usize,
        location: Option<Location>,
    },

    #[error("\\{command} takes at most two optional parameters, not {found}{}", at(.location))]
    OptionalParameterCount {
        command: String,
        found: usize,
        location: Option<Location>,
    },

    #[error("can’t parse number of arguments “{text}”{}", at(.location))]
    ArgumentCount {
        text: String,
        location: Option<Location>,
    },

    #[error("\\{command} has an optional default but takes no arguments{}", at(.location))]
    DefaultWithoutArguments {
        command: String,
        location: Option<Location>,
    },

    #[error("\\{command} needs a command to (re-)define{}", at(.location))]
    MissingName {
        command: String,
        location: Option<Location>,
    },

    #[error("unsupported argument type “{spec}” for \\{name}{}", at(.location))]
    UnsupportedArgument {
        name: String,
        spec: String,
        location: Option<Location>,
    },

    #[error("argument type “O” of \\{name} needs a default in curly braces{}", at(.location))]
    MissingDefault {
        name: String,
        location: Option<Location>,
    },
}

/// Errors raised while calling a user macro.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("\\{name} requires {expected} arguments, missing argument {index}{}", at(.location))]
    MissingArgument {
        name: String,
        index: usize,
        expected: usize,
        location: Option<Location>,
    },

    #[error("\\{name} requires {expected} arguments, not {found}{}", at(.location))]
    TooManyArguments {
        name: String,
        expected: usize,
        found: usize,
        location: Option<Location>,
    },

    #[error("placeholder #{index} of \\{name} has no argument ({bound} bound){}", at(.location))]
    PlaceholderOutOfRange {
        name: String,
        index: usize,
        bound: usize,
        location: Option<Location>,
    },

    #[error("maximum expansion depth {limit} exceeded expanding \\{name}")]
    ExpansionTooDeep { name: String, limit: usize },

    #[error("expanding \\{name} nests deeper than {limit} levels")]
    NestingTooDeep { name: String, limit: usize },
}

impl CallError {
    /// Name of the macro being called.
    pub fn name(&self) -> &str {
        match self {
            CallError::MissingArgument { name, .. }
            | CallError::TooManyArguments { name, .. }
            | CallError::PlaceholderOutOfRange { name, .. }
            | CallError::ExpansionTooDeep { name, .. }
            | CallError::NestingTooDeep { name, .. } => name,
        }
    }
}

fn at(location: &Option<Location>) -> String {
    match location {
        Some(location) => format!(" at {location}"),
        None => String::new(),
    }
}
