// Parser module for Vistrace scripts
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ast::{Expr, Program};

mod grammar;


#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Source line of a syntax error
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Syntax { line, .. } => Some(*line),
            ParseError::Io { .. } => None,
        }
    }
}

/// Trait for script parsers
pub trait Parser {
    /// Parse source code into a program
    fn parse(&mut self, source: &str) -> Result<Program, ParseError>;

    /// Parse a file
    fn parse_file(&mut self, path: &Path) -> Result<Program, ParseError> {
        let source = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&source)
    }

    /// Get parser name for debugging
    fn name(&self) -> &'static str;
}

/// nom-based parser for the brace-delimited script syntax
#[derive(Debug, Default)]
pub struct ScriptParser;

impl ScriptParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for ScriptParser {
    fn parse(&mut self, source: &str) -> Result<Program, ParseError> {
        grammar::StatementParser::new(source).program(source)
    }

    fn name(&self) -> &'static str {
        "script"
    }
}

/// Parse a whole program
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    ScriptParser::new().parse(source)
}

/// Parse a file from disk
pub fn parse_file(path: &Path) -> Result<Program, ParseError> {
    ScriptParser::new().parse_file(path)
}

/// Parse a single expression, used by tooling that accepts expressions on the command line
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let parser = grammar::StatementParser::new(source);
    match grammar::expression(source) {
        Ok((rest, expr)) if rest.trim().is_empty() => Ok(expr),
        Ok((rest, _)) => Err(ParseError::Syntax {
            line: parser.line_at(source.len() - rest.len()),
            message: format!("trailing input {:?}", rest.trim()),
        }),
        Err(_) => Err(ParseError::Syntax {
            line: 1,
            message: "invalid expression".to_string(),
        }),
    }
}
