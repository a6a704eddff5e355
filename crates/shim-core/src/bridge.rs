//! Parser/printer seam used by the loader.
//!
//! The rewrite engine only ever sees [`HostAst`]; any dialect that can be
//! parsed into it and printed back can sit behind this trait.

use crate::ast::{HostAst, ToSource};
use crate::parser::{HostParser, ParseError, Parser};

pub trait AstBridge: Send + Sync {
    /// Parse a whole source file into a `Program`
    fn parse(&self, source: &str) -> Result<HostAst, ParseError>;

    /// Print a tree back to source. Must be deterministic.
    fn print(&self, ast: &HostAst) -> String;

    fn name(&self) -> &'static str;
}

/// Bridge for the built-in host dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct HostBridge;

impl HostBridge {
    pub fn new() -> Self {
        Self
    }
}

impl AstBridge for HostBridge {
    fn parse(&self, source: &str) -> Result<HostAst, ParseError> {
        HostParser::new().parse_program(source)
    }

    fn print(&self, ast: &HostAst) -> String {
        ast.to_source()
    }

    fn name(&self) -> &'static str {
        "host"
    }
}
