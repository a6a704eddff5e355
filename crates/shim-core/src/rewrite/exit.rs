// Process-exit rule

use crate::ast::HostAst;
use crate::hooks::Hook;

use super::rules::RewriteRule;
use super::{RewriteContext, RewriteResult};

/// `exit` → `__shim::exit(0)`, `exit(status)` → `__shim::exit(status)`
#[derive(Debug, Default)]
pub struct ExitRule;

impl ExitRule {
    pub fn new() -> Self {
        Self
    }
}

impl RewriteRule for ExitRule {
    fn name(&self) -> &'static str {
        "process-exit"
    }

    fn description(&self) -> &'static str {
        "Routes process termination through the exit hook"
    }

    fn priority(&self) -> u32 {
        250
    }

    fn matches(&self, ast: &HostAst, _context: &RewriteContext) -> bool {
        matches!(ast, HostAst::Exit { .. })
    }

    fn transform(&self, ast: HostAst, _context: &RewriteContext) -> RewriteResult<HostAst> {
        match ast {
            HostAst::Exit { status } => {
                let status = status.map_or(HostAst::Integer(0), |s| *s);
                Ok(Hook::Exit.call(vec![status]))
            }
            other => Ok(other),
        }
    }
}
