/*!
# Rewrite Rules

Core trait for rewrite rules plus the call-site pieces shared by the call and
generator rules.
*/

use crate::ast::{HostAst, UnitMember};
use crate::hooks::{static_class, str_lit, Hook};

use super::{RewriteContext, RewriteResult};

/// A single transformation applied bottom-up over a program.
///
/// `transform` sees a node whose children were already rewritten by the same
/// rule; `transform_member` sees a unit member whose body was.
pub trait RewriteRule: Send + Sync {
    /// Human-readable name for this rule
    fn name(&self) -> &'static str;

    /// Detailed description of what this rule does
    fn description(&self) -> &'static str;

    /// Priority for rule ordering (higher priority runs first)
    fn priority(&self) -> u32 {
        100
    }

    /// Whether output this rule changed must carry the `declare` hook even
    /// when the file declares nothing, so it is not rewritten a second time
    fn marks_output(&self) -> bool {
        false
    }

    /// Check if this rule applies to the given node
    fn matches(&self, ast: &HostAst, context: &RewriteContext) -> bool {
        let _ = (ast, context);
        false
    }

    fn transform(&self, ast: HostAst, context: &RewriteContext) -> RewriteResult<HostAst> {
        let _ = context;
        Ok(ast)
    }

    /// Check if this rule applies to a unit member; `context.unit` is set
    fn matches_member(&self, member: &UnitMember, context: &RewriteContext) -> bool {
        let _ = (member, context);
        false
    }

    fn transform_member(
        &self,
        member: UnitMember,
        context: &RewriteContext,
    ) -> RewriteResult<UnitMember> {
        let _ = context;
        Ok(member)
    }
}

/// Statistics for rule application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStats {
    pub rule_name: String,
    pub applications: u64,
    pub transformations: u64,
    pub errors: u64,
    pub total_time_us: u64,
}

impl RuleStats {
    pub fn new(rule_name: String) -> Self {
        Self {
            rule_name,
            ..Default::default()
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.transformations as f64) / (self.applications as f64)
        }
    }

    pub fn average_time_us(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.total_time_us as f64) / (self.applications as f64)
        }
    }
}

/// The identity arguments every prologue passes to the runtime
#[derive(Debug, Clone)]
pub struct PrologueSite {
    pub lexical: HostAst,
    pub dynamic: HostAst,
    pub member: HostAst,
    pub this: HostAst,
}

impl PrologueSite {
    /// A method or constructor of `unit`; static methods have no `this`
    pub fn method(unit: &str, member: &str, is_static: bool) -> Self {
        Self {
            lexical: str_lit(unit),
            dynamic: static_class(),
            member: str_lit(member),
            this: if is_static { HostAst::Null } else { HostAst::This },
        }
    }

    /// A free function: no unit on either side
    pub fn function(name: &str) -> Self {
        Self {
            lexical: HostAst::Null,
            dynamic: HostAst::Null,
            member: str_lit(name),
            this: HostAst::Null,
        }
    }

    /// `__shim::intercepted(lexical, dynamic, member)`
    pub fn intercepted(&self) -> HostAst {
        Hook::Intercepted.call(vec![
            self.lexical.clone(),
            self.dynamic.clone(),
            self.member.clone(),
        ])
    }

    /// `__shim::call(...)` or `__shim::generator(...)` with `args`
    pub fn transfer(&self, hook: Hook, args: HostAst) -> HostAst {
        hook.call(vec![
            self.lexical.clone(),
            self.dynamic.clone(),
            self.member.clone(),
            args,
            self.this.clone(),
        ])
    }
}

/// `if (<intercepted>) { <body> }`
pub fn guarded(site: &PrologueSite, body: Vec<HostAst>) -> HostAst {
    HostAst::If {
        condition: Box::new(site.intercepted()),
        then_branch: body,
        else_branch: None,
    }
}
