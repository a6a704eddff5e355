// Interception identities and the behaviors installed against them

use std::fmt;
use std::sync::Arc;

use crate::ast::{HostAst, Parameter, ToSource, CONSTRUCTOR_NAME};
use crate::parser::{parse_parameters, parse_statements};

use super::generator::HostGenerator;
use super::registry::{MockRegistry, RegistryError};
use super::value::Value;

/// Identity of an interception point.
///
/// Callables (functions, methods, constructors, generators) share one
/// namespace per unit; constants have their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterceptionId {
    Callable {
        unit: Option<String>,
        member: String,
    },
    Constant {
        unit: String,
        name: String,
    },
    ProcessExit,
}

impl InterceptionId {
    pub fn function(name: impl Into<String>) -> Self {
        InterceptionId::Callable {
            unit: None,
            member: name.into(),
        }
    }

    pub fn method(unit: impl Into<String>, member: impl Into<String>) -> Self {
        InterceptionId::Callable {
            unit: Some(unit.into()),
            member: member.into(),
        }
    }

    pub fn constructor(unit: impl Into<String>) -> Self {
        Self::method(unit, CONSTRUCTOR_NAME)
    }

    pub fn constant(unit: impl Into<String>, name: impl Into<String>) -> Self {
        InterceptionId::Constant {
            unit: unit.into(),
            name: name.into(),
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            InterceptionId::Callable { unit, .. } => unit.as_deref(),
            InterceptionId::Constant { unit, .. } => Some(unit),
            InterceptionId::ProcessExit => None,
        }
    }
}

impl fmt::Display for InterceptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptionId::Callable {
                unit: Some(unit),
                member,
            } => write!(f, "{unit}::{member}()"),
            InterceptionId::Callable { unit: None, member } => write!(f, "{member}()"),
            InterceptionId::Constant { unit, name } => write!(f, "{unit}::{name}"),
            InterceptionId::ProcessExit => write!(f, "exit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointKind {
    Function,
    Method,
    Constructor,
    Generator,
    Constant,
    ProcessExit,
}

impl PointKind {
    pub fn name(self) -> &'static str {
        match self {
            PointKind::Function => "function",
            PointKind::Method => "method",
            PointKind::Constructor => "constructor",
            PointKind::Generator => "generator",
            PointKind::Constant => "constant",
            PointKind::ProcessExit => "exit",
        }
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type alias for a replacement implemented in Rust
pub type CallableFn =
    Arc<dyn Fn(&MockRegistry, &Invocation) -> anyhow::Result<Value> + Send + Sync>;

/// Type alias for a generator-producing replacement
pub type GeneratorFactory = Arc<
    dyn Fn(&MockRegistry, &Invocation) -> anyhow::Result<Box<dyn HostGenerator>> + Send + Sync,
>;

/// Replacement behavior held by an override entry
#[derive(Clone)]
pub enum Behavior {
    /// Host source compiled at install time, run by the host
    Source(Arc<ReplacementSource>),
    Callable(CallableFn),
    Generator(GeneratorFactory),
    /// A fixed value: the constant's value, or what a callable returns
    Value(Value),
}

impl Behavior {
    /// Compile a replacement from its parameter list and body text
    pub fn source(params: &str, body: &str) -> Result<Self, RegistryError> {
        ReplacementSource::compile(params, body).map(|source| Behavior::Source(Arc::new(source)))
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&MockRegistry, &Invocation) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Behavior::Callable(Arc::new(f))
    }

    pub fn generator<F>(f: F) -> Self
    where
        F: Fn(&MockRegistry, &Invocation) -> anyhow::Result<Box<dyn HostGenerator>>
            + Send
            + Sync
            + 'static,
    {
        Behavior::Generator(Arc::new(f))
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Behavior::Value(value.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Behavior::Source(_) => "source",
            Behavior::Callable(_) => "callable",
            Behavior::Generator(_) => "generator",
            Behavior::Value(_) => "value",
        }
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Source(source) => f.debug_tuple("Source").field(&source.text).finish(),
            Behavior::Callable(_) => f.write_str("Callable(<function>)"),
            Behavior::Generator(_) => f.write_str("Generator(<function>)"),
            Behavior::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// A replacement body in host source, validated at install
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementSource {
    pub params: Vec<Parameter>,
    pub body: Vec<HostAst>,
    /// Canonical source of the whole replacement, for diagnostics
    pub text: String,
}

/// How a replacement parameter gets its value for one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Supplied(Value),
    /// Not supplied; the host evaluates the replacement's own default
    Default(HostAst),
    Variadic(Vec<Value>),
}

impl ReplacementSource {
    pub fn compile(params: &str, body: &str) -> Result<Self, RegistryError> {
        let invalid = |err: crate::parser::ParseError| RegistryError::InvalidReplacement {
            message: err.to_string(),
        };
        let params = parse_parameters(params).map_err(invalid)?;
        let body = parse_statements(body).map_err(invalid)?;

        if let Some(pos) = params.iter().position(|p| p.variadic) {
            if pos + 1 != params.len() {
                return Err(RegistryError::InvalidReplacement {
                    message: format!("variadic parameter `{}` must come last", params[pos].name),
                });
            }
        }

        let text = HostAst::Closure {
            params: params.clone(),
            captures: Vec::new(),
            body: body.clone(),
            by_ref: false,
        }
        .to_source();

        Ok(Self { params, body, text })
    }

    /// Bind the supplied arguments to this replacement's parameters.
    /// Missing arguments fall back to the replacement's defaults.
    pub fn bind_arguments(&self, args: &[Value]) -> Result<Vec<(String, Binding)>, RegistryError> {
        let mut bound = Vec::with_capacity(self.params.len());
        for (position, param) in self.params.iter().enumerate() {
            let binding = if param.variadic {
                Binding::Variadic(args.get(position..).unwrap_or_default().to_vec())
            } else if let Some(arg) = args.get(position) {
                Binding::Supplied(arg.clone())
            } else if let Some(default) = &param.default_value {
                Binding::Default(default.clone())
            } else {
                return Err(RegistryError::MissingArgument {
                    param: param.name.clone(),
                    position,
                });
            };
            bound.push((param.name.clone(), binding));
        }
        Ok(bound)
    }
}

/// Where an intercepted call was made from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Unit whose body holds the prologue; `None` for functions
    pub lexical: Option<String>,
    /// Runtime unit of the call (`static::class`)
    pub dynamic: Option<String>,
    pub member: String,
}

impl CallSite {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            lexical: None,
            dynamic: None,
            member: name.into(),
        }
    }

    pub fn method(
        lexical: impl Into<String>,
        dynamic: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            lexical: Some(lexical.into()),
            dynamic: Some(dynamic.into()),
            member: member.into(),
        }
    }
}

/// Everything a replacement receives
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub site: CallSite,
    /// Identity of the override that matched
    pub id: InterceptionId,
    pub args: Vec<Value>,
    pub this: Option<Value>,
}

impl Invocation {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

/// Result of the `call` hook
#[derive(Debug, Clone)]
pub enum Replacement {
    Returned(Value),
    /// A source replacement the host evaluates itself
    Evaluate {
        source: Arc<ReplacementSource>,
        invocation: Invocation,
    },
}

#[derive(Debug, Clone)]
pub struct OverrideEntry {
    pub id: InterceptionId,
    pub kind: PointKind,
    pub behavior: Behavior,
    pub order: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_and_bind_defaults() {
        let source = Behavior::source("a, b = 3", "return [a, b];").expect("valid replacement");
        let Behavior::Source(source) = source else {
            panic!("expected a source behavior");
        };
        assert_eq!(source.text, "fn (a, b = 3) {\n    return [a, b];\n}");

        let bound = source.bind_arguments(&[Value::Integer(1)]).expect("bindable");
        assert_eq!(
            bound,
            vec![
                ("a".to_string(), Binding::Supplied(Value::Integer(1))),
                ("b".to_string(), Binding::Default(HostAst::Integer(3))),
            ]
        );

        let err = source.bind_arguments(&[]).unwrap_err();
        assert!(matches!(err, RegistryError::MissingArgument { position: 0, .. }));
    }

    #[test]
    fn test_variadic_collects_rest() {
        let source = ReplacementSource::compile("first, ...rest", "return rest;").expect("valid");
        let args: Vec<Value> = (1..=3i64).map(Value::from).collect();
        let bound = source.bind_arguments(&args).expect("bindable");
        assert_eq!(
            bound[1].1,
            Binding::Variadic(vec![Value::Integer(2), Value::Integer(3)])
        );

        let err = ReplacementSource::compile("...rest, last", "").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidReplacement { .. }));
    }

    #[test]
    fn test_invalid_source_is_reported() {
        let err = Behavior::source("", "return 1 +;").unwrap_err();
        assert!(err.to_string().contains("expected an expression"));
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(InterceptionId::method("A", "m").to_string(), "A::m()");
        assert_eq!(InterceptionId::function("f").to_string(), "f()");
        assert_eq!(InterceptionId::constant("A", "X").to_string(), "A::X");
        assert_eq!(InterceptionId::constructor("A").to_string(), "A::new()");
        assert_eq!(InterceptionId::ProcessExit.unit(), None);
    }
}
