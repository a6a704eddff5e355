// Class-constant accessor
//
// Rewritten code reads every class constant through here so that overrides
// installed on any unit of the chain are honoured. Lexical references
// (`self::`, `parent::`, `Named::`) arrive with the resolution unit already
// fixed; late-bound ones (`static::`, `expr::`) with the runtime unit.

use thiserror::Error;
use tracing::debug;

use crate::ast::{HostAst, Scope, ToSource, Visibility};

use super::units::UnitTable;
use super::value::{Value, ValueError};

/// Nested constant references followed before giving up
pub const MAX_CONSTANT_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstantError {
    #[error("Cannot access {visibility} const {unit}::{name}")]
    Visibility {
        visibility: Visibility,
        unit: String,
        name: String,
    },

    #[error("Undefined class constant '{unit}::{name}'")]
    Undefined { unit: String, name: String },

    #[error("Class \"{unit}\" not found")]
    UnknownUnit { unit: String },

    #[error("initializer of {unit}::{name} is not a constant expression: {expression}")]
    NotConstant {
        unit: String,
        name: String,
        expression: String,
    },

    #[error("constant {unit}::{name} refers back to itself")]
    Recursion { unit: String, name: String },

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// One class-constant read as performed by rewritten code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantAccess {
    /// Unit where the referencing code is written
    pub lexical: Option<String>,
    /// Unit the lookup starts from
    pub resolution: String,
    pub name: String,
    /// Unit whose visibility rights apply; defaults to `lexical`
    pub caller: Option<String>,
}

impl ConstantAccess {
    pub fn new(lexical: Option<&str>, resolution: &str, name: &str) -> Self {
        Self {
            lexical: lexical.map(str::to_string),
            resolution: resolution.to_string(),
            name: name.to_string(),
            caller: lexical.map(str::to_string),
        }
    }

    pub fn with_caller(mut self, caller: Option<&str>) -> Self {
        self.caller = caller.map(str::to_string);
        self
    }
}

struct Declaration<'a> {
    unit: String,
    visibility: Visibility,
    initializer: Option<&'a HostAst>,
}

/// Resolves constants against registered records plus installed overrides.
/// `overrides(unit, name)` returns the value installed for that exact pair.
pub struct ConstantResolver<'a, F> {
    units: &'a UnitTable,
    overrides: F,
}

impl<'a, F> ConstantResolver<'a, F>
where
    F: Fn(&str, &str) -> Option<Value>,
{
    pub fn new(units: &'a UnitTable, overrides: F) -> Self {
        Self { units, overrides }
    }

    pub fn resolve(&self, access: &ConstantAccess) -> Result<Value, ConstantError> {
        self.lookup(
            &access.resolution,
            &access.name,
            access.caller.as_deref(),
            0,
        )
    }

    fn lookup(
        &self,
        resolution: &str,
        name: &str,
        caller: Option<&str>,
        depth: usize,
    ) -> Result<Value, ConstantError> {
        let declaration = self.find(resolution, name)?;
        if depth > MAX_CONSTANT_DEPTH {
            return Err(ConstantError::Recursion {
                unit: declaration.unit,
                name: name.to_string(),
            });
        }

        if !self.visible(declaration.visibility, &declaration.unit, caller) {
            return Err(ConstantError::Visibility {
                visibility: declaration.visibility,
                unit: declaration.unit,
                name: name.to_string(),
            });
        }

        if let Some(value) = (self.overrides)(&declaration.unit, name) {
            debug!(unit = %declaration.unit, name, "constant override");
            return Ok(value);
        }

        match declaration.initializer {
            Some(initializer) => self.evaluate(initializer, &declaration.unit, name, depth + 1),
            None => Err(ConstantError::Undefined {
                unit: declaration.unit,
                name: name.to_string(),
            }),
        }
    }

    /// Nearest unit from `resolution` upward that declares the constant or
    /// holds an override for it
    fn find(&self, resolution: &str, name: &str) -> Result<Declaration<'a>, ConstantError> {
        let units = self.units;
        for unit in units.ancestors(resolution) {
            let declared = units.constant_decl(&unit, name);
            if declared.is_some() || (self.overrides)(&unit, name).is_some() {
                return Ok(Declaration {
                    visibility: declared.map_or(Visibility::Public, |c| c.visibility),
                    initializer: declared.map(|c| &c.value),
                    unit,
                });
            }
        }

        if units.contains(resolution) {
            Err(ConstantError::Undefined {
                unit: resolution.to_string(),
                name: name.to_string(),
            })
        } else {
            Err(ConstantError::UnknownUnit {
                unit: resolution.to_string(),
            })
        }
    }

    fn visible(&self, visibility: Visibility, declaring: &str, caller: Option<&str>) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Private => caller == Some(declaring),
            Visibility::Protected => caller.is_some_and(|caller| {
                self.units.is_subunit(caller, declaring) || self.units.is_subunit(declaring, caller)
            }),
        }
    }

    /// Evaluate an initializer written inside `unit`
    fn evaluate(
        &self,
        expr: &HostAst,
        unit: &str,
        name: &str,
        depth: usize,
    ) -> Result<Value, ConstantError> {
        let not_constant = || ConstantError::NotConstant {
            unit: unit.to_string(),
            name: name.to_string(),
            expression: expr.to_source(),
        };
        let eval = |e: &HostAst| self.evaluate(e, unit, name, depth);

        match expr {
            HostAst::Integer(n) => Ok(Value::Integer(*n)),
            HostAst::Float(f) => Ok(Value::Float(*f)),
            HostAst::String(s) => Ok(Value::String(s.clone())),
            HostAst::Boolean(b) => Ok(Value::Boolean(*b)),
            HostAst::Null => Ok(Value::Null),
            HostAst::List { elements } => elements
                .iter()
                .map(eval)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            HostAst::Map { entries } => {
                let mut map = indexmap::IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = eval(key)?.as_key().ok_or_else(not_constant)?;
                    map.insert(key, eval(value)?);
                }
                Ok(Value::Map(map))
            }
            HostAst::Unary { op, operand } => Ok(Value::unary(*op, &eval(operand)?)?),
            HostAst::Binary { op, left, right } => {
                Ok(Value::binary(*op, &eval(left)?, &eval(right)?)?)
            }
            HostAst::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                if eval(condition)?.is_truthy() {
                    eval(then_value)
                } else {
                    eval(else_value)
                }
            }
            HostAst::ClassConstant { scope, name: target } => {
                let resolution = self.lexical_unit(scope, unit).ok_or_else(not_constant)?;
                self.lookup(&resolution, target, Some(unit), depth)
            }
            HostAst::ClassName { scope } => self
                .lexical_unit(scope, unit)
                .map(Value::String)
                .ok_or_else(not_constant),
            _ => Err(not_constant()),
        }
    }

    /// Unit named by a scope that is fixed at compile time
    fn lexical_unit(&self, scope: &Scope, unit: &str) -> Option<String> {
        match scope {
            Scope::SelfUnit => Some(unit.to_string()),
            Scope::Parent => self.units.parent_of(unit).map(str::to_string),
            Scope::Named(name) => Some(name.clone()),
            Scope::Static | Scope::Expr(_) => None,
        }
    }
}
