//! The call contract between rewritten source and the runtime.
//!
//! Every hook is emitted as a static call on the reserved [`HOOK_NAMESPACE`]
//! unit, e.g. `__shim::intercepted("A", static::class, "m")`. The runtime end
//! of each hook lives on `MockRegistry`.

use std::fmt;

use crate::ast::{HostAst, Scope};

/// Reserved unit name the host routes to the registry
pub const HOOK_NAMESPACE: &str = "__shim";

/// Prefix for locals introduced by rewriting
pub const LOCAL_PREFIX: &str = "__shim_";

/// Host intrinsic returning the arguments actually supplied to the current call
pub const FUNC_ARGS: &str = "func_args";

/// Host intrinsic returning a list's length
pub const COUNT: &str = "count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// declare(records_json)
    Declare,
    /// intercepted(lexical, dynamic, member)
    Intercepted,
    /// call(lexical, dynamic, member, args, this)
    Call,
    /// generator(lexical, dynamic, member, args, this)
    Generator,
    /// constant(lexical, resolution, name)
    Constant,
    /// exit(status)
    Exit,
}

impl Hook {
    pub const ALL: [Hook; 6] = [
        Hook::Declare,
        Hook::Intercepted,
        Hook::Call,
        Hook::Generator,
        Hook::Constant,
        Hook::Exit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Hook::Declare => "declare",
            Hook::Intercepted => "intercepted",
            Hook::Call => "call",
            Hook::Generator => "generator",
            Hook::Constant => "constant",
            Hook::Exit => "exit",
        }
    }

    pub fn from_name(name: &str) -> Option<Hook> {
        Hook::ALL.into_iter().find(|hook| hook.name() == name)
    }

    /// Number of arguments rewritten code passes
    pub fn arity(self) -> usize {
        match self {
            Hook::Declare | Hook::Exit => 1,
            Hook::Intercepted | Hook::Constant => 3,
            Hook::Call | Hook::Generator => 5,
        }
    }

    /// Build the hook invocation expression
    pub fn call(self, args: Vec<HostAst>) -> HostAst {
        HostAst::StaticCall {
            scope: Scope::Named(HOOK_NAMESPACE.to_string()),
            method: self.name().to_string(),
            args,
        }
    }

    /// Recognise a hook invocation in a tree
    pub fn matching(ast: &HostAst) -> Option<Hook> {
        match ast {
            HostAst::StaticCall {
                scope: Scope::Named(scope),
                method,
                ..
            } if scope == HOOK_NAMESPACE => Hook::from_name(method),
            _ => None,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HOOK_NAMESPACE}::{}", self.name())
    }
}

// Small AST builders shared by the rewrite rules

pub fn str_lit(s: &str) -> HostAst {
    HostAst::string(s)
}

/// `static::class`
pub fn static_class() -> HostAst {
    HostAst::ClassName {
        scope: Scope::Static,
    }
}

/// `func_args()`
pub fn func_args() -> HostAst {
    HostAst::FunctionCall {
        name: FUNC_ARGS.to_string(),
        args: Vec::new(),
    }
}

/// Name of a rewrite-introduced local
pub fn local(name: &str) -> String {
    format!("{LOCAL_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ToSource;

    #[test]
    fn test_hook_names_round_trip() {
        for hook in Hook::ALL {
            assert_eq!(Hook::from_name(hook.name()), Some(hook));
        }
        assert_eq!(Hook::from_name("install"), None);
    }

    #[test]
    fn test_hook_call_source() {
        let call = Hook::Intercepted.call(vec![str_lit("A"), static_class(), str_lit("m")]);
        assert_eq!(
            call.to_source(),
            "__shim::intercepted(\"A\", static::class, \"m\")"
        );
        assert_eq!(Hook::matching(&call), Some(Hook::Intercepted));
        assert_eq!(Hook::matching(&func_args()), None);
    }
}
