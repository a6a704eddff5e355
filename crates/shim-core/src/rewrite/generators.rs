// Generator wrapper rule
//
// A generator body cannot run a prologue that returns a different generator,
// so the original body moves into an inner generator closure and the
// declaration becomes an ordinary callable with the same signature:
//
//     if (__shim::intercepted(U, static::class, "g")) {
//         return __shim::generator(U, static::class, "g", func_args(), this);
//     }
//     let __shim_original = fn (params) { original body };
//     return __shim_original(params...);

use crate::ast::{HostAst, Parameter, UnitMember};
use crate::hooks::{func_args, local, Hook};
use crate::records::CallableKind;

use super::rules::{guarded, PrologueSite, RewriteRule};
use super::{RewriteContext, RewriteError, RewriteResult};

#[derive(Debug, Default)]
pub struct GeneratorRule;

impl GeneratorRule {
    pub fn new() -> Self {
        Self
    }
}

fn wrap(
    site: &PrologueSite,
    params: &[Parameter],
    body: Vec<HostAst>,
    by_ref: bool,
) -> Vec<HostAst> {
    let original = local("original");

    let redirect = guarded(
        site,
        vec![HostAst::Return {
            value: Some(Box::new(site.transfer(Hook::Generator, func_args()))),
        }],
    );

    // Defaults were already applied by the outer signature
    let inner_params = params
        .iter()
        .map(|p| Parameter {
            default_value: None,
            ..p.clone()
        })
        .collect();
    let inner = HostAst::Let {
        name: original.clone(),
        value: Some(Box::new(HostAst::Closure {
            params: inner_params,
            captures: Vec::new(),
            body,
            by_ref,
        })),
    };

    // Passing parameters by name keeps by-reference bindings intact
    let args = params
        .iter()
        .map(|p| {
            let name = HostAst::Identifier(p.name.clone());
            if p.variadic {
                HostAst::Spread(Box::new(name))
            } else {
                name
            }
        })
        .collect();
    let start = HostAst::Return {
        value: Some(Box::new(HostAst::FunctionCall {
            name: original,
            args,
        })),
    };

    vec![redirect, inner, start]
}

impl RewriteRule for GeneratorRule {
    fn name(&self) -> &'static str {
        "generator-wrapper"
    }

    fn description(&self) -> &'static str {
        "Wraps generator bodies so an installed generator can replace the whole sequence"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn matches(&self, ast: &HostAst, context: &RewriteContext) -> bool {
        match ast {
            HostAst::FunctionDef { name, .. } => {
                context.records.callable_kind(None, name) == Some(CallableKind::Generator)
            }
            _ => false,
        }
    }

    fn transform(&self, ast: HostAst, _context: &RewriteContext) -> RewriteResult<HostAst> {
        match ast {
            HostAst::FunctionDef {
                name,
                params,
                body,
                by_ref,
            } => {
                let site = PrologueSite::function(&name);
                let body = wrap(&site, &params, body, by_ref);
                Ok(HostAst::FunctionDef {
                    name,
                    params,
                    body,
                    by_ref,
                })
            }
            other => Ok(other),
        }
    }

    fn matches_member(&self, member: &UnitMember, context: &RewriteContext) -> bool {
        let Some(unit) = context.unit_name() else {
            return false;
        };
        match member {
            UnitMember::Method {
                name,
                body: Some(_),
                ..
            } => context.records.callable_kind(Some(unit), name) == Some(CallableKind::Generator),
            _ => false,
        }
    }

    fn transform_member(
        &self,
        member: UnitMember,
        context: &RewriteContext,
    ) -> RewriteResult<UnitMember> {
        let unit = context
            .unit_name()
            .ok_or(RewriteError::ScopeOutsideUnit { scope: "self" })?;

        match member {
            UnitMember::Method {
                name,
                params,
                body: Some(body),
                visibility,
                is_static,
                by_ref,
            } => {
                let site = PrologueSite::method(unit, &name, is_static);
                let body = wrap(&site, &params, body, by_ref);
                Ok(UnitMember::Method {
                    name,
                    params,
                    body: Some(body),
                    visibility,
                    is_static,
                    by_ref,
                })
            }
            other => Ok(other),
        }
    }
}
