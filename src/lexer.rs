use std::borrow::Cow;
use std::fmt;

use pest::{Parser, iterators::Pair};
use pest_derive::Parser;

use crate::error::Error;

#[derive(Parser)]
#[grammar = "src/tex.pest"]
pub struct TexLexer;

/// A line/column position in the source, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Compute the location of a byte offset. This scans the source up to
    /// `offset`, so tokens only carry offsets and callers locate lazily.
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// `\begin{name}`
    BeginEnvironment(&'a str),
    /// `\end{name}`
    EndEnvironment(&'a str),
    /// `\name` or `\name*`, without the backslash
    Command(&'a str),
    OpenOptional,
    CloseOptional,
    OpenCurly,
    CloseCurly,
    /// `\\`
    LineBreak,
    /// Two or more newlines; carries the newline count.
    BlankLines(usize),
    Comment,
    Whitespace,
    /// `#N`
    Placeholder(usize),
    /// A run of word characters; inner blanks are collapsed to one space.
    Word(Cow<'a, str>),
    /// Any single leftover character.
    Text(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// Byte offset of the token start.
    pub offset: usize,
}

impl TexLexer {
    /// Split source text into tokens.
    pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, Error> {
        let mut pairs = TexLexer::parse(Rule::file, input)?;
        let Some(file) = pairs.next() else {
            return Ok(Vec::new());
        };

        file.into_inner()
            .filter(|pair| pair.as_rule() != Rule::EOI)
            .map(|pair| Self::parse_token(input, pair))
            .collect()
    }

    fn parse_token<'a>(input: &'a str, pair: Pair<'a, Rule>) -> Result<Token<'a>, Error> {
        let offset = pair.as_span().start();
        let kind = match pair.as_rule() {
            Rule::begin_environment => TokenKind::BeginEnvironment(inner_str(pair)),
            Rule::end_environment => TokenKind::EndEnvironment(inner_str(pair)),
            Rule::command => TokenKind::Command(inner_str(pair)),
            Rule::linebreak => TokenKind::LineBreak,
            Rule::open_oparam => TokenKind::OpenOptional,
            Rule::close_oparam => TokenKind::CloseOptional,
            Rule::open_curly => TokenKind::OpenCurly,
            Rule::close_curly => TokenKind::CloseCurly,
            Rule::eols => TokenKind::BlankLines(pair.as_str().matches('\n').count()),
            Rule::comment => TokenKind::Comment,
            Rule::placeholder => {
                let digits = inner_str(pair);
                let index = digits.parse().map_err(|_| Error::Lex {
                    message: format!("placeholder index “#{digits}” out of range"),
                    location: Location::locate(input, offset),
                })?;
                TokenKind::Placeholder(index)
            }
            Rule::whitespace => TokenKind::Whitespace,
            Rule::word => TokenKind::Word(collapse_blanks(pair.as_str())),
            _ => TokenKind::Text(pair.as_str()),
        };

        Ok(Token { kind, offset })
    }
}

fn inner_str<'a>(pair: Pair<'a, Rule>) -> &'a str {
    pair.into_inner().next().map_or("", |p| p.as_str())
}

/// Collapse runs of spaces and tabs to a single space.
fn collapse_blanks(word: &str) -> Cow<'_, str> {
    if !word.contains('\t') && !word.contains("  ") {
        return Cow::Borrowed(word);
    }

    let mut out = String::with_capacity(word.len());
    let mut in_blank = false;
    for c in word.chars() {
        if c == ' ' || c == '\t' {
            if !in_blank {
                out.push(' ');
            }
            in_blank = true;
        } else {
            out.push(c);
            in_blank = false;
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        TexLexer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_environment() {
        assert_eq!(
            kinds("\\begin{itemize}\\END{itemize}"),
            vec![
                TokenKind::BeginEnvironment("itemize"),
                TokenKind::EndEnvironment("itemize"),
            ]
        );
    }

    #[test]
    fn test_tokenize_command_with_parameters() {
        assert_eq!(
            kinds("\\newcommand*{\\x}[1]"),
            vec![
                TokenKind::Command("newcommand*"),
                TokenKind::OpenCurly,
                TokenKind::Command("x"),
                TokenKind::CloseCurly,
                TokenKind::OpenOptional,
                TokenKind::Text("1"),
                TokenKind::CloseOptional,
            ]
        );
    }

    #[test]
    fn test_word_needs_two_characters() {
        assert_eq!(
            kinds("a bc"),
            vec![
                TokenKind::Text("a"),
                TokenKind::Whitespace,
                TokenKind::Word(Cow::Borrowed("bc")),
            ]
        );
    }

    #[test]
    fn test_word_keeps_inner_blanks_collapsed() {
        assert_eq!(
            kinds("Hello  \tworld !"),
            vec![
                TokenKind::Word(Cow::Owned("Hello world".to_string())),
                TokenKind::Whitespace,
                TokenKind::Text("!"),
            ]
        );
    }

    #[test]
    fn test_blank_lines_and_single_newline() {
        assert_eq!(
            kinds("ab\ncd\n\n\nef"),
            vec![
                TokenKind::Word(Cow::Borrowed("ab")),
                TokenKind::Whitespace,
                TokenKind::Word(Cow::Borrowed("cd")),
                TokenKind::BlankLines(3),
                TokenKind::Word(Cow::Borrowed("ef")),
            ]
        );
    }

    #[test]
    fn test_comment_swallows_following_whitespace() {
        assert_eq!(
            kinds("ab% note\n   cd"),
            vec![
                TokenKind::Word(Cow::Borrowed("ab")),
                TokenKind::Comment,
                TokenKind::Word(Cow::Borrowed("cd")),
            ]
        );
    }

    #[test]
    fn test_placeholder_and_linebreak() {
        assert_eq!(
            kinds("#12\\\\#"),
            vec![
                TokenKind::Placeholder(12),
                TokenKind::LineBreak,
                TokenKind::Text("#"),
            ]
        );
    }

    #[test]
    fn test_placeholder_overflow() {
        let err = TexLexer::tokenize("ab\n #99999999999999999999999").unwrap_err();
        match err {
            Error::Lex { message, location } => {
                assert_eq!(location, Location::new(2, 2));
                assert!(message.contains("#99999999999999999999999"));
            }
            other => panic!("Expected lexical error, got {:?}", other),
        }
    }

    #[test]
    fn test_offsets() {
        let tokens = TexLexer::tokenize("ab \\cd").unwrap();
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 2, 3]);
    }

    #[test]
    fn test_locate() {
        let source = "one\ntwo\nthree";
        assert_eq!(Location::locate(source, 0), Location::new(1, 1));
        assert_eq!(Location::locate(source, 5), Location::new(2, 2));
        assert_eq!(Location::locate(source, source.len()), Location::new(3, 6));
    }
}
