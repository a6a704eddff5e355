/*!
# Rewriter - interception point insertion

Transforms a parsed host program so that every function, method, constructor,
generator, class-constant fetch and process exit is routed through the hooks
in [`crate::hooks`].

## Architecture

- `RewriteRule`: trait for a single transformation (calls, generators,
  constants, exit, host-function call sites)
- `Rewriter`: runs rules in priority order, one post-order pass per rule,
  then prepends the `declare` hook carrying the file's declaring-unit records
- `RewriteContext`: lexical position (unit, function) plus depth accounting

## Example Usage

```rust
use shim_core::bridge::{AstBridge, HostBridge};
use shim_core::rewrite::Rewriter;

let program = HostBridge.parse("fn answer() { return 42; }")?;
let mut rewriter = Rewriter::with_default_rules();
let output = rewriter.rewrite(program, None)?;
println!("{}", HostBridge.print(&output.program));
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::ast::{HostAst, Scope, UnitMember};
use crate::config::ShimConfig;
use crate::hooks::{str_lit, Hook};
use crate::records::ModuleRecord;

pub mod calls;
pub mod constants;
pub mod exit;
pub mod generators;
pub mod host_calls;
pub mod rules;

#[cfg(test)]
mod tests;

pub use calls::CallRule;
pub use constants::ConstantRule;
pub use exit::ExitRule;
pub use generators::GeneratorRule;
pub use host_calls::HostCallRule;
pub use rules::{RewriteRule, RuleStats};

pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("`{scope}::` used outside of a class")]
    ScopeOutsideUnit { scope: &'static str },

    #[error("`parent::` used in class {unit}, which has no parent")]
    NoParent { unit: String },

    #[error("nesting exceeds the maximum depth of {max_depth}")]
    TooDeep { max_depth: usize },

    #[error("rule {rule} failed: {message}")]
    Rule { rule: &'static str, message: String },

    #[error("declaring-unit records: {0}")]
    Records(#[from] serde_json::Error),
}

pub type RewriteResult<T> = Result<T, RewriteError>;

/// Unit whose body is being rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitScope {
    pub name: String,
    pub parent: Option<String>,
}

/// Function or method whose body is being rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionScope {
    pub name: String,
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub source_file: Option<Arc<str>>,
    pub unit: Option<Arc<UnitScope>>,
    pub function: Option<Arc<FunctionScope>>,
    pub records: Arc<ModuleRecord>,
    pub current_depth: usize,
    pub max_depth: usize,
}

impl Default for RewriteContext {
    fn default() -> Self {
        Self {
            source_file: None,
            unit: None,
            function: None,
            records: Arc::new(ModuleRecord::default()),
            current_depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RewriteContext {
    pub fn new(records: Arc<ModuleRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_source_file(mut self, file: &str) -> Self {
        self.source_file = Some(Arc::from(file));
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_unit(&self, name: &str, parent: Option<&str>) -> Self {
        Self {
            unit: Some(Arc::new(UnitScope {
                name: name.to_string(),
                parent: parent.map(str::to_string),
            })),
            function: None,
            ..self.clone()
        }
    }

    pub fn with_function(&self, name: &str, is_static: bool) -> Self {
        Self {
            function: Some(Arc::new(FunctionScope {
                name: name.to_string(),
                is_static,
            })),
            ..self.clone()
        }
    }

    pub fn descend(&self) -> Self {
        Self {
            current_depth: self.current_depth + 1,
            ..self.clone()
        }
    }

    pub fn at_max_depth(&self) -> bool {
        self.current_depth >= self.max_depth
    }

    pub fn unit_name(&self) -> Option<&str> {
        self.unit.as_deref().map(|u| u.name.as_str())
    }
}

/// A rewritten program together with the records it declares
#[derive(Debug, Clone)]
pub struct RewriteOutput {
    pub program: HostAst,
    pub module: ModuleRecord,
}

/// Rule-driven rewriting engine
pub struct Rewriter {
    rules: Vec<Box<dyn RewriteRule>>,
    stats: HashMap<String, RuleStats>,
    max_depth: usize,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Rewriter {
    /// An engine with no rules; only records are collected and declared
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            stats: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_default_rules() -> Self {
        Self::from_config(&ShimConfig::default())
    }

    pub fn from_config(config: &ShimConfig) -> Self {
        let mut rewriter = Self::new().max_depth(config.max_depth);
        if config.rewrite_constants {
            rewriter.add_rule(Box::new(ConstantRule::new()));
        }
        if config.rewrite_exit {
            rewriter.add_rule(Box::new(ExitRule::new()));
        }
        if config.rewrite_host_calls {
            rewriter.add_rule(Box::new(HostCallRule::new()));
        }
        rewriter.add_rule(Box::new(GeneratorRule::new()));
        rewriter.add_rule(Box::new(CallRule::new()));
        rewriter
    }

    pub fn max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    /// Add a rule, keeping rules ordered by priority (higher first)
    pub fn add_rule(&mut self, rule: Box<dyn RewriteRule>) {
        self.stats
            .insert(rule.name().to_string(), RuleStats::new(rule.name().to_string()));
        self.rules.push(rule);
        self.rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority()));
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Get rewrite statistics
    pub fn stats(&self) -> &HashMap<String, RuleStats> {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        for stats in self.stats.values_mut() {
            *stats = RuleStats::new(stats.rule_name.clone());
        }
    }

    /// Rewrite a whole program
    pub fn rewrite(
        &mut self,
        program: HostAst,
        source_file: Option<&str>,
    ) -> RewriteResult<RewriteOutput> {
        let program = match program {
            HostAst::Program(items) => items,
            other => vec![other],
        };

        if let Some(module) = already_rewritten(&program)? {
            debug!(source = ?source_file, "program already carries a declare hook; leaving as is");
            return Ok(RewriteOutput {
                program: HostAst::Program(program),
                module,
            });
        }

        let mut program = HostAst::Program(program);
        let module = ModuleRecord::collect(&program, source_file.map(str::to_string));
        let records = Arc::new(module.clone());

        let mut context = RewriteContext::new(records).with_max_depth(self.max_depth);
        if let Some(file) = source_file {
            context = context.with_source_file(file);
        }

        let mut marked = false;
        for rule in &self.rules {
            let stats = self
                .stats
                .entry(rule.name().to_string())
                .or_insert_with(|| RuleStats::new(rule.name().to_string()));
            let before = stats.transformations;
            let mut fold = Fold {
                rule: rule.as_ref(),
                stats,
            };
            program = fold.node(program, &context)?;
            marked |= rule.marks_output() && fold.stats.transformations > before;
        }

        let HostAst::Program(mut items) = program else {
            return Err(RewriteError::Rule {
                rule: "rewriter",
                message: "a rule replaced the program root".to_string(),
            });
        };

        if !module.is_empty() || marked {
            let json = module.to_json()?;
            items.insert(
                0,
                HostAst::ExpressionStatement(Box::new(Hook::Declare.call(vec![str_lit(&json)]))),
            );
        }

        info!(
            source = ?source_file,
            units = module.units.len(),
            functions = module.functions.len(),
            "rewrote program"
        );

        Ok(RewriteOutput {
            program: HostAst::Program(items),
            module,
        })
    }
}

/// Output of a previous rewrite starts with the declare hook
fn already_rewritten(items: &[HostAst]) -> RewriteResult<Option<ModuleRecord>> {
    let Some(HostAst::ExpressionStatement(first)) = items.first() else {
        return Ok(None);
    };
    match first.as_ref() {
        HostAst::StaticCall { args, .. } if Hook::matching(first) == Some(Hook::Declare) => {
            match args.first() {
                Some(HostAst::String(json)) => Ok(Some(ModuleRecord::from_json(json)?)),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

/// One post-order pass of a single rule over a tree
struct Fold<'a> {
    rule: &'a dyn RewriteRule,
    stats: &'a mut RuleStats,
}

impl Fold<'_> {
    fn node(&mut self, node: HostAst, ctx: &RewriteContext) -> RewriteResult<HostAst> {
        if ctx.at_max_depth() {
            return Err(RewriteError::TooDeep {
                max_depth: ctx.max_depth,
            });
        }
        let node = self.children(node, &ctx.descend())?;
        if !self.rule.matches(&node, ctx) {
            return Ok(node);
        }

        let start = Instant::now();
        self.stats.applications += 1;
        let result = self.rule.transform(node, ctx);
        self.stats.total_time_us += start.elapsed().as_micros() as u64;
        match result {
            Ok(node) => {
                self.stats.transformations += 1;
                Ok(node)
            }
            Err(e) => {
                self.stats.errors += 1;
                Err(e)
            }
        }
    }

    fn boxed(&mut self, node: Box<HostAst>, ctx: &RewriteContext) -> RewriteResult<Box<HostAst>> {
        Ok(Box::new(self.node(*node, ctx)?))
    }

    fn optional(
        &mut self,
        node: Option<Box<HostAst>>,
        ctx: &RewriteContext,
    ) -> RewriteResult<Option<Box<HostAst>>> {
        node.map(|n| self.boxed(n, ctx)).transpose()
    }

    fn nodes(&mut self, nodes: Vec<HostAst>, ctx: &RewriteContext) -> RewriteResult<Vec<HostAst>> {
        nodes.into_iter().map(|n| self.node(n, ctx)).collect()
    }

    fn scope(&mut self, scope: Scope, ctx: &RewriteContext) -> RewriteResult<Scope> {
        match scope {
            Scope::Expr(expr) => Ok(Scope::Expr(self.boxed(expr, ctx)?)),
            other => Ok(other),
        }
    }

    fn children(&mut self, node: HostAst, ctx: &RewriteContext) -> RewriteResult<HostAst> {
        Ok(match node {
            HostAst::Reference { target } => HostAst::Reference {
                target: self.boxed(target, ctx)?,
            },
            HostAst::Binary { op, left, right } => HostAst::Binary {
                op,
                left: self.boxed(left, ctx)?,
                right: self.boxed(right, ctx)?,
            },
            HostAst::Unary { op, operand } => HostAst::Unary {
                op,
                operand: self.boxed(operand, ctx)?,
            },
            HostAst::Ternary {
                condition,
                then_value,
                else_value,
            } => HostAst::Ternary {
                condition: self.boxed(condition, ctx)?,
                then_value: self.boxed(then_value, ctx)?,
                else_value: self.boxed(else_value, ctx)?,
            },
            HostAst::Assignment { target, value } => HostAst::Assignment {
                target: self.boxed(target, ctx)?,
                value: self.boxed(value, ctx)?,
            },
            HostAst::PropertyAccess { object, property } => HostAst::PropertyAccess {
                object: self.boxed(object, ctx)?,
                property,
            },
            HostAst::IndexAccess { object, index } => HostAst::IndexAccess {
                object: self.boxed(object, ctx)?,
                index: self.boxed(index, ctx)?,
            },
            HostAst::FunctionCall { name, args } => HostAst::FunctionCall {
                name,
                args: self.nodes(args, ctx)?,
            },
            HostAst::MethodCall {
                object,
                method,
                args,
            } => HostAst::MethodCall {
                object: self.boxed(object, ctx)?,
                method,
                args: self.nodes(args, ctx)?,
            },
            HostAst::StaticCall {
                scope,
                method,
                args,
            } => HostAst::StaticCall {
                scope: self.scope(scope, ctx)?,
                method,
                args: self.nodes(args, ctx)?,
            },
            HostAst::Call { func, args } => HostAst::Call {
                func: self.boxed(func, ctx)?,
                args: self.nodes(args, ctx)?,
            },
            HostAst::Spread(inner) => HostAst::Spread(self.boxed(inner, ctx)?),
            HostAst::New { scope, args } => HostAst::New {
                scope: self.scope(scope, ctx)?,
                args: self.nodes(args, ctx)?,
            },
            HostAst::ClassConstant { scope, name } => HostAst::ClassConstant {
                scope: self.scope(scope, ctx)?,
                name,
            },
            HostAst::ClassName { scope } => HostAst::ClassName {
                scope: self.scope(scope, ctx)?,
            },
            HostAst::List { elements } => HostAst::List {
                elements: self.nodes(elements, ctx)?,
            },
            HostAst::Map { entries } => HostAst::Map {
                entries: entries
                    .into_iter()
                    .map(|(key, value)| -> RewriteResult<(HostAst, HostAst)> {
                        Ok((self.node(key, ctx)?, self.node(value, ctx)?))
                    })
                    .collect::<RewriteResult<Vec<_>>>()?,
            },
            // Closures share the enclosing lexical scope; parameter defaults
            // are constant expressions and stay untouched.
            HostAst::Closure {
                params,
                captures,
                body,
                by_ref,
            } => HostAst::Closure {
                params,
                captures,
                body: self.nodes(body, ctx)?,
                by_ref,
            },
            HostAst::Yield { key, value } => HostAst::Yield {
                key: self.optional(key, ctx)?,
                value: self.optional(value, ctx)?,
            },
            HostAst::Exit { status } => HostAst::Exit {
                status: self.optional(status, ctx)?,
            },
            HostAst::Let { name, value } => HostAst::Let {
                name,
                value: self.optional(value, ctx)?,
            },
            HostAst::Return { value } => HostAst::Return {
                value: self.optional(value, ctx)?,
            },
            HostAst::If {
                condition,
                then_branch,
                else_branch,
            } => HostAst::If {
                condition: self.boxed(condition, ctx)?,
                then_branch: self.nodes(then_branch, ctx)?,
                else_branch: else_branch.map(|b| self.nodes(b, ctx)).transpose()?,
            },
            HostAst::While { condition, body } => HostAst::While {
                condition: self.boxed(condition, ctx)?,
                body: self.nodes(body, ctx)?,
            },
            HostAst::For {
                key,
                value,
                by_ref,
                collection,
                body,
            } => HostAst::For {
                key,
                value,
                by_ref,
                collection: self.boxed(collection, ctx)?,
                body: self.nodes(body, ctx)?,
            },
            HostAst::Throw { value } => HostAst::Throw {
                value: self.boxed(value, ctx)?,
            },
            HostAst::Try {
                body,
                catch,
                finally,
            } => HostAst::Try {
                body: self.nodes(body, ctx)?,
                catch: catch
                    .map(|mut clause| -> RewriteResult<_> {
                        clause.body = self.nodes(clause.body, ctx)?;
                        Ok(clause)
                    })
                    .transpose()?,
                finally: finally.map(|f| self.nodes(f, ctx)).transpose()?,
            },
            HostAst::ExpressionStatement(inner) => {
                HostAst::ExpressionStatement(self.boxed(inner, ctx)?)
            }
            HostAst::Block(stmts) => HostAst::Block(self.nodes(stmts, ctx)?),
            HostAst::Program(items) => HostAst::Program(self.nodes(items, ctx)?),
            HostAst::FunctionDef {
                name,
                params,
                body,
                by_ref,
            } => {
                let body_ctx = ctx.with_function(&name, false);
                HostAst::FunctionDef {
                    body: self.nodes(body, &body_ctx)?,
                    name,
                    params,
                    by_ref,
                }
            }
            HostAst::UnitDef {
                name,
                parent,
                is_abstract,
                members,
            } => {
                let unit_ctx = ctx.with_unit(&name, parent.as_deref());
                let members = members
                    .into_iter()
                    .map(|member| self.member(member, &unit_ctx))
                    .collect::<RewriteResult<Vec<_>>>()?;
                HostAst::UnitDef {
                    name,
                    parent,
                    is_abstract,
                    members,
                }
            }
            leaf @ (HostAst::Integer(_)
            | HostAst::Float(_)
            | HostAst::String(_)
            | HostAst::Boolean(_)
            | HostAst::Null
            | HostAst::Identifier(_)
            | HostAst::This
            | HostAst::Break
            | HostAst::Continue) => leaf,
        })
    }

    fn member(&mut self, member: UnitMember, ctx: &RewriteContext) -> RewriteResult<UnitMember> {
        if ctx.at_max_depth() {
            return Err(RewriteError::TooDeep {
                max_depth: ctx.max_depth,
            });
        }
        let member = match member {
            UnitMember::Method {
                name,
                params,
                body,
                visibility,
                is_static,
                by_ref,
            } => {
                let body_ctx = ctx.with_function(&name, is_static).descend();
                UnitMember::Method {
                    body: body.map(|b| self.nodes(b, &body_ctx)).transpose()?,
                    name,
                    params,
                    visibility,
                    is_static,
                    by_ref,
                }
            }
            UnitMember::Constructor {
                params,
                body,
                visibility,
            } => {
                let body_ctx = ctx
                    .with_function(crate::ast::CONSTRUCTOR_NAME, false)
                    .descend();
                UnitMember::Constructor {
                    params,
                    body: self.nodes(body, &body_ctx)?,
                    visibility,
                }
            }
            // Constant initializers and property defaults are constant
            // expressions evaluated by the runtime, never rewritten.
            other => other,
        };

        if !self.rule.matches_member(&member, ctx) {
            return Ok(member);
        }
        let start = Instant::now();
        self.stats.applications += 1;
        let result = self.rule.transform_member(member, ctx);
        self.stats.total_time_us += start.elapsed().as_micros() as u64;
        match result {
            Ok(member) => {
                self.stats.transformations += 1;
                Ok(member)
            }
            Err(e) => {
                self.stats.errors += 1;
                Err(e)
            }
        }
    }
}
