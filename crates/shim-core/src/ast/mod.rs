// Unified AST for host source files
// This AST is produced by the host parser, rewritten by the rewrite rules and
// printed back to source by `source_gen`.

pub mod source_gen;
pub use source_gen::ToSource;

#[cfg(test)]
mod source_gen_tests;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Visibility of a unit member or constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn keyword(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// The left-hand side of a `::` access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scope {
    /// self:: (lexical unit)
    SelfUnit,
    /// static:: (late-bound unit)
    Static,
    /// parent:: (declared parent of the lexical unit)
    Parent,
    /// Name::
    Named(String),
    /// expr:: (runtime unit of the value)
    Expr(Box<HostAst>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength used by the parser and the printer
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 3,
            BinaryOp::And => 4,
            BinaryOp::Equal | BinaryOp::NotEqual => 5,
            BinaryOp::LessThan
            | BinaryOp::LessEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterEqual => 6,
            BinaryOp::Add | BinaryOp::Subtract => 7,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostAst {
    // Literals
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,

    // Identifiers and references
    Identifier(String),
    This,
    /// &target, only meaningful as an argument or assignment source
    Reference {
        target: Box<HostAst>,
    },

    // Operators
    Binary {
        op: BinaryOp,
        left: Box<HostAst>,
        right: Box<HostAst>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HostAst>,
    },
    Ternary {
        condition: Box<HostAst>,
        then_value: Box<HostAst>,
        else_value: Box<HostAst>,
    },
    Assignment {
        target: Box<HostAst>,
        value: Box<HostAst>,
    },

    // Member and index access
    PropertyAccess {
        object: Box<HostAst>,
        property: String,
    },
    IndexAccess {
        object: Box<HostAst>,
        index: Box<HostAst>,
    },

    // Calls
    FunctionCall {
        name: String,
        args: Vec<HostAst>,
    },
    MethodCall {
        object: Box<HostAst>,
        method: String,
        args: Vec<HostAst>,
    },
    StaticCall {
        scope: Scope,
        method: String,
        args: Vec<HostAst>,
    },
    Call {
        func: Box<HostAst>,
        args: Vec<HostAst>,
    },
    /// ...expr inside an argument list
    Spread(Box<HostAst>),
    New {
        scope: Scope,
        args: Vec<HostAst>,
    },

    // Unit-level access
    ClassConstant {
        scope: Scope,
        name: String,
    },
    ClassName {
        scope: Scope,
    },

    // Collections
    List {
        elements: Vec<HostAst>,
    },
    Map {
        entries: Vec<(HostAst, HostAst)>,
    },

    // Anonymous functions
    Closure {
        params: Vec<Parameter>,
        captures: Vec<Capture>,
        body: Vec<HostAst>,
        by_ref: bool,
    },

    // Suspension and termination
    Yield {
        key: Option<Box<HostAst>>,
        value: Option<Box<HostAst>>,
    },
    Exit {
        status: Option<Box<HostAst>>,
    },

    // Statements
    Let {
        name: String,
        value: Option<Box<HostAst>>,
    },
    Return {
        value: Option<Box<HostAst>>,
    },
    If {
        condition: Box<HostAst>,
        then_branch: Vec<HostAst>,
        else_branch: Option<Vec<HostAst>>,
    },
    While {
        condition: Box<HostAst>,
        body: Vec<HostAst>,
    },
    For {
        key: Option<String>,
        value: String,
        by_ref: bool,
        collection: Box<HostAst>,
        body: Vec<HostAst>,
    },
    Break,
    Continue,
    Throw {
        value: Box<HostAst>,
    },
    Try {
        body: Vec<HostAst>,
        catch: Option<CatchClause>,
        finally: Option<Vec<HostAst>>,
    },
    ExpressionStatement(Box<HostAst>),
    Block(Vec<HostAst>),

    // Declarations
    FunctionDef {
        name: String,
        params: Vec<Parameter>,
        body: Vec<HostAst>,
        by_ref: bool,
    },
    UnitDef {
        name: String,
        parent: Option<String>,
        is_abstract: bool,
        members: Vec<UnitMember>,
    },

    // Top-level program
    Program(Vec<HostAst>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitMember {
    Constant {
        name: String,
        value: HostAst,
        visibility: Visibility,
    },
    Property {
        name: String,
        value: Option<HostAst>,
        visibility: Visibility,
    },
    Method {
        name: String,
        params: Vec<Parameter>,
        /// `None` for abstract declarations
        body: Option<Vec<HostAst>>,
        visibility: Visibility,
        is_static: bool,
        by_ref: bool,
    },
    Constructor {
        params: Vec<Parameter>,
        body: Vec<HostAst>,
        visibility: Visibility,
    },
}

impl UnitMember {
    pub fn name(&self) -> &str {
        match self {
            UnitMember::Constant { name, .. }
            | UnitMember::Property { name, .. }
            | UnitMember::Method { name, .. } => name,
            UnitMember::Constructor { .. } => CONSTRUCTOR_NAME,
        }
    }
}

/// Member name under which constructors are recorded and intercepted
pub const CONSTRUCTOR_NAME: &str = "new";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default_value: Option<HostAst>,
    pub by_ref: bool,
    pub variadic: bool,
}

impl Parameter {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: None,
            by_ref: false,
            variadic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub name: String,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub error_var: String,
    pub body: Vec<HostAst>,
}

// Helper methods
impl HostAst {
    pub fn string(s: impl Into<String>) -> Self {
        HostAst::String(s.into())
    }

    pub fn ident(s: impl Into<String>) -> Self {
        HostAst::Identifier(s.into())
    }

    /// Check if this AST node is a statement (vs expression)
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            HostAst::Let { .. }
                | HostAst::Return { .. }
                | HostAst::If { .. }
                | HostAst::While { .. }
                | HostAst::For { .. }
                | HostAst::Break
                | HostAst::Continue
                | HostAst::Throw { .. }
                | HostAst::Try { .. }
                | HostAst::ExpressionStatement(_)
                | HostAst::Block(_)
                | HostAst::FunctionDef { .. }
                | HostAst::UnitDef { .. }
                | HostAst::Program(_)
        )
    }

    /// Whether a valid assignment target
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            HostAst::Identifier(_) | HostAst::PropertyAccess { .. } | HostAst::IndexAccess { .. }
        )
    }
}

/// Returns true when `body` suspends, i.e. the enclosing declaration is a
/// generator. Nested closures and declarations own their own yields.
pub fn contains_yield(body: &[HostAst]) -> bool {
    body.iter().any(node_yields)
}

fn node_yields(node: &HostAst) -> bool {
    match node {
        HostAst::Yield { .. } => true,
        HostAst::Closure { .. } | HostAst::FunctionDef { .. } | HostAst::UnitDef { .. } => false,

        HostAst::Reference { target } => node_yields(target),
        HostAst::Binary { left, right, .. } => node_yields(left) || node_yields(right),
        HostAst::Unary { operand, .. } => node_yields(operand),
        HostAst::Ternary {
            condition,
            then_value,
            else_value,
        } => node_yields(condition) || node_yields(then_value) || node_yields(else_value),
        HostAst::Assignment { target, value } => node_yields(target) || node_yields(value),
        HostAst::PropertyAccess { object, .. } => node_yields(object),
        HostAst::IndexAccess { object, index } => node_yields(object) || node_yields(index),
        HostAst::FunctionCall { args, .. } => contains_yield(args),
        HostAst::MethodCall { object, args, .. } => node_yields(object) || contains_yield(args),
        HostAst::StaticCall { scope, args, .. } | HostAst::New { scope, args } => {
            scope_yields(scope) || contains_yield(args)
        }
        HostAst::Call { func, args } => node_yields(func) || contains_yield(args),
        HostAst::Spread(inner) | HostAst::ExpressionStatement(inner) => node_yields(inner),
        HostAst::ClassConstant { scope, .. } | HostAst::ClassName { scope } => scope_yields(scope),
        HostAst::List { elements } => contains_yield(elements),
        HostAst::Map { entries } => entries
            .iter()
            .any(|(key, value)| node_yields(key) || node_yields(value)),
        HostAst::Exit { status } => status.as_deref().is_some_and(node_yields),
        HostAst::Let { value, .. } | HostAst::Return { value } => {
            value.as_deref().is_some_and(node_yields)
        }
        HostAst::If {
            condition,
            then_branch,
            else_branch,
        } => {
            node_yields(condition)
                || contains_yield(then_branch)
                || else_branch.as_deref().is_some_and(contains_yield)
        }
        HostAst::While { condition, body } => node_yields(condition) || contains_yield(body),
        HostAst::For {
            collection, body, ..
        } => node_yields(collection) || contains_yield(body),
        HostAst::Throw { value } => node_yields(value),
        HostAst::Try {
            body,
            catch,
            finally,
        } => {
            contains_yield(body)
                || catch.as_ref().is_some_and(|c| contains_yield(&c.body))
                || finally.as_deref().is_some_and(contains_yield)
        }
        HostAst::Block(stmts) | HostAst::Program(stmts) => contains_yield(stmts),

        HostAst::Integer(_)
        | HostAst::Float(_)
        | HostAst::String(_)
        | HostAst::Boolean(_)
        | HostAst::Null
        | HostAst::Identifier(_)
        | HostAst::This
        | HostAst::Break
        | HostAst::Continue => false,
    }
}

fn scope_yields(scope: &Scope) -> bool {
    match scope {
        Scope::Expr(expr) => node_yields(expr),
        _ => false,
    }
}

impl fmt::Display for HostAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAst::Integer(n) => write!(f, "{n}"),
            HostAst::Float(fl) => write!(f, "{fl}"),
            HostAst::String(s) => write!(f, "\"{s}\""),
            HostAst::Boolean(b) => write!(f, "{b}"),
            HostAst::Null => write!(f, "null"),
            HostAst::Identifier(s) => write!(f, "{s}"),
            HostAst::This => write!(f, "this"),
            HostAst::UnitDef { name, .. } => write!(f, "class {name}"),
            HostAst::FunctionDef { name, .. } => write!(f, "fn {name}"),
            _ => write!(f, "<expression>"),
        }
    }
}
