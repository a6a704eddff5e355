// Call-site rule for functions no rewritten source declares

use crate::ast::HostAst;
use crate::hooks::{Hook, COUNT, FUNC_ARGS, LOCAL_PREFIX};

use super::rules::{PrologueSite, RewriteRule};
use super::{RewriteContext, RewriteResult};

/// Intrinsics emitted by the other rules; never redirected. Neither are
/// calls through rewrite-introduced locals such as `__shim_original`.
const INTRINSICS: [&str; 2] = [FUNC_ARGS, COUNT];

/// `f(a, b)` where `f` is not declared in this file becomes
///
/// ```text
/// __shim::intercepted(null, null, "f") ? __shim::call(null, null, "f", [a, b], null) : f(a, b)
/// ```
///
/// Host functions have no body to carry a prologue, so the check happens
/// where they are called. Only one branch runs, so arguments are evaluated
/// once.
#[derive(Debug, Default)]
pub struct HostCallRule;

impl HostCallRule {
    pub fn new() -> Self {
        Self
    }
}

impl RewriteRule for HostCallRule {
    fn name(&self) -> &'static str {
        "host-call"
    }

    fn description(&self) -> &'static str {
        "Guards call sites of functions declared outside the rewritten file"
    }

    fn priority(&self) -> u32 {
        150
    }

    fn marks_output(&self) -> bool {
        true
    }

    fn matches(&self, ast: &HostAst, context: &RewriteContext) -> bool {
        match ast {
            HostAst::FunctionCall { name, .. } => {
                !INTRINSICS.contains(&name.as_str())
                    && !name.starts_with(LOCAL_PREFIX)
                    && context.records.callable_kind(None, name).is_none()
            }
            _ => false,
        }
    }

    fn transform(&self, ast: HostAst, _context: &RewriteContext) -> RewriteResult<HostAst> {
        match ast {
            HostAst::FunctionCall { name, args } => {
                let site = PrologueSite::function(&name);
                let redirected = site.transfer(
                    Hook::Call,
                    HostAst::List {
                        elements: args.clone(),
                    },
                );
                Ok(HostAst::Ternary {
                    condition: Box::new(site.intercepted()),
                    then_value: Box::new(redirected),
                    else_value: Box::new(HostAst::FunctionCall { name, args }),
                })
            }
            other => Ok(other),
        }
    }
}
