// Parser module - host dialect parsing behind a common trait
use std::path::Path;

use anyhow::Context;
use thiserror::Error;

use crate::ast::HostAst;

pub mod host;
pub mod lexer;


pub use host::{parse_expression, parse_parameters, parse_statements, HostParser, MAX_NESTING};

/// A syntax error with the position where it was detected
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Trait for all host parsers
pub trait Parser: Send + Sync {
    /// Parse source code into a host AST
    fn parse(&mut self, source: &str) -> Result<HostAst, ParseError>;

    /// Parse source code as a program (multiple statements)
    fn parse_program(&mut self, source: &str) -> Result<HostAst, ParseError> {
        // Default implementation wraps result in Program node
        match self.parse(source)? {
            program @ HostAst::Program(_) => Ok(program),
            other => Ok(HostAst::Program(vec![other])),
        }
    }

    /// Parse a file
    fn parse_file(&mut self, path: &Path) -> anyhow::Result<HostAst> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        self.parse_program(&source)
            .with_context(|| format!("parsing {}", path.display()))
    }

    /// Get parser name for debugging
    fn name(&self) -> &'static str;
}

/// Create a parser by dialect name
pub fn create_parser(dialect: &str) -> anyhow::Result<Box<dyn Parser>> {
    match dialect {
        "host" => Ok(Box::new(HostParser::new())),
        _ => anyhow::bail!("Unknown parser type: {}", dialect),
    }
}
