// Call prologue rule: functions, methods and constructors

use crate::ast::{BinaryOp, HostAst, Parameter, UnitMember, CONSTRUCTOR_NAME};
use crate::hooks::{func_args, local, Hook, COUNT};
use crate::records::CallableKind;

use super::rules::{guarded, PrologueSite, RewriteRule};
use super::{RewriteContext, RewriteError, RewriteResult};

/// Prepends `if (__shim::intercepted(..)) { return __shim::call(..); }` to
/// every callable body. Generators are handled by `GeneratorRule`.
#[derive(Debug, Default)]
pub struct CallRule;

impl CallRule {
    pub fn new() -> Self {
        Self
    }
}

/// Arguments handed to the replacement: `func_args()`, with by-reference
/// parameters re-bound so the replacement can write through them.
fn forwarded_args(params: &[Parameter]) -> (Vec<HostAst>, HostAst) {
    let by_ref: Vec<(usize, &Parameter)> = params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.by_ref && !p.variadic)
        .collect();
    if by_ref.is_empty() {
        return (Vec::new(), func_args());
    }

    let args_name = local("args");
    let args = || HostAst::Identifier(args_name.clone());
    let mut setup = vec![HostAst::Let {
        name: args_name.clone(),
        value: Some(Box::new(func_args())),
    }];

    for (index, param) in by_ref {
        let rebind = HostAst::ExpressionStatement(Box::new(HostAst::Assignment {
            target: Box::new(HostAst::IndexAccess {
                object: Box::new(args()),
                index: Box::new(HostAst::Integer(index as i64)),
            }),
            value: Box::new(HostAst::Reference {
                target: Box::new(HostAst::Identifier(param.name.clone())),
            }),
        }));
        if param.default_value.is_some() {
            // Optional parameters are only re-bound when actually supplied
            setup.push(HostAst::If {
                condition: Box::new(HostAst::Binary {
                    op: BinaryOp::GreaterThan,
                    left: Box::new(HostAst::FunctionCall {
                        name: COUNT.to_string(),
                        args: vec![args()],
                    }),
                    right: Box::new(HostAst::Integer(index as i64)),
                }),
                then_branch: vec![rebind],
                else_branch: None,
            });
        } else {
            setup.push(rebind);
        }
    }

    (setup, args())
}

fn prologue(site: &PrologueSite, params: &[Parameter], returns_value: bool) -> HostAst {
    let (mut body, args) = forwarded_args(params);
    let transfer = site.transfer(Hook::Call, args);
    if returns_value {
        body.push(HostAst::Return {
            value: Some(Box::new(transfer)),
        });
    } else {
        body.push(HostAst::ExpressionStatement(Box::new(transfer)));
        body.push(HostAst::Return { value: None });
    }
    guarded(site, body)
}

fn with_prologue(prologue: HostAst, body: Vec<HostAst>) -> Vec<HostAst> {
    let mut rewritten = Vec::with_capacity(body.len() + 1);
    rewritten.push(prologue);
    rewritten.extend(body);
    rewritten
}

impl RewriteRule for CallRule {
    fn name(&self) -> &'static str {
        "call-prologue"
    }

    fn description(&self) -> &'static str {
        "Routes function, method and constructor entry through the mock registry"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn matches(&self, ast: &HostAst, context: &RewriteContext) -> bool {
        match ast {
            HostAst::FunctionDef { name, .. } => {
                context.records.callable_kind(None, name) == Some(CallableKind::Function)
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
                let body = with_prologue(prologue(&site, &params, true), body);
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
            } => context.records.callable_kind(Some(unit), name) == Some(CallableKind::Method),
            UnitMember::Constructor { .. } => true,
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
                let body = with_prologue(prologue(&site, &params, true), body);
                Ok(UnitMember::Method {
                    name,
                    params,
                    body: Some(body),
                    visibility,
                    is_static,
                    by_ref,
                })
            }
            UnitMember::Constructor {
                params,
                body,
                visibility,
            } => {
                let site = PrologueSite::method(unit, CONSTRUCTOR_NAME, false);
                let body = with_prologue(prologue(&site, &params, false), body);
                Ok(UnitMember::Constructor {
                    params,
                    body,
                    visibility,
                })
            }
            other => Ok(other),
        }
    }
}
