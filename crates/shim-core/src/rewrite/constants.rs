// Class-constant fetch rule

use crate::ast::{HostAst, Scope};
use crate::hooks::{static_class, str_lit, Hook};

use super::rules::RewriteRule;
use super::{RewriteContext, RewriteError, RewriteResult};

/// Rewrites `Scope::NAME` in code bodies to
/// `__shim::constant(lexical, resolution, "NAME")`.
///
/// | fetch        | lexical | resolution        |
/// |--------------|---------|-------------------|
/// | `self::X`    | `"U"`   | `"U"`             |
/// | `static::X`  | `"U"`   | `static::class`   |
/// | `parent::X`  | `"U"`   | `"P"`             |
/// | `Named::X`   | `"U"`   | `"Named"`         |
/// | `expr::X`    | `"U"`   | `expr::class`     |
///
/// Outside of any unit the lexical side is `null`.
#[derive(Debug, Default)]
pub struct ConstantRule;

impl ConstantRule {
    pub fn new() -> Self {
        Self
    }
}

impl RewriteRule for ConstantRule {
    fn name(&self) -> &'static str {
        "constant-access"
    }

    fn description(&self) -> &'static str {
        "Routes class-constant reads through the constant accessor"
    }

    fn priority(&self) -> u32 {
        300
    }

    fn matches(&self, ast: &HostAst, _context: &RewriteContext) -> bool {
        matches!(ast, HostAst::ClassConstant { .. })
    }

    fn transform(&self, ast: HostAst, context: &RewriteContext) -> RewriteResult<HostAst> {
        let HostAst::ClassConstant { scope, name } = ast else {
            return Ok(ast);
        };
        let unit = context.unit.as_deref();

        let resolution = match scope {
            Scope::SelfUnit => {
                let unit = unit.ok_or(RewriteError::ScopeOutsideUnit { scope: "self" })?;
                str_lit(&unit.name)
            }
            Scope::Static => {
                unit.ok_or(RewriteError::ScopeOutsideUnit { scope: "static" })?;
                static_class()
            }
            Scope::Parent => {
                let unit = unit.ok_or(RewriteError::ScopeOutsideUnit { scope: "parent" })?;
                let parent = unit.parent.as_deref().ok_or_else(|| RewriteError::NoParent {
                    unit: unit.name.clone(),
                })?;
                str_lit(parent)
            }
            Scope::Named(named) => str_lit(&named),
            Scope::Expr(expr) => HostAst::ClassName {
                scope: Scope::Expr(expr),
            },
        };
        let lexical = unit.map_or(HostAst::Null, |u| str_lit(&u.name));

        Ok(Hook::Constant.call(vec![lexical, resolution, str_lit(&name)]))
    }
}
