// Source code generation from AST
// Printing is canonical: the same tree always produces the same bytes, which
// is what makes rewritten output cacheable by content.

use super::*;

const INDENT: &str = "    ";

/// Precedence of postfix expressions and primaries
const PREC_POSTFIX: u8 = 10;
const PREC_UNARY: u8 = 9;
const PREC_TERNARY: u8 = 2;
/// Assignment, yield and closures bind loosest
const PREC_LOWEST: u8 = 1;

/// Trait for types that can generate their source code representation
pub trait ToSource {
    fn to_source(&self) -> String;
}

impl ToSource for HostAst {
    fn to_source(&self) -> String {
        if self.is_statement() {
            let mut out = String::new();
            write_statement(self, 0, &mut out);
            if !matches!(self, HostAst::Program(_)) {
                while out.ends_with('\n') {
                    out.pop();
                }
            }
            out
        } else {
            expr(self, 0, 0)
        }
    }
}

impl ToSource for UnitMember {
    fn to_source(&self) -> String {
        let mut out = String::new();
        write_member(self, 0, &mut out);
        while out.ends_with('\n') {
            out.pop();
        }
        out
    }
}

impl ToSource for Parameter {
    fn to_source(&self) -> String {
        format_param(self, 0)
    }
}

impl ToSource for Scope {
    fn to_source(&self) -> String {
        format_scope(self, 0)
    }
}

/// Escape a string literal body
pub fn escape_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn format_float(f: f64) -> String {
    let text = f.to_string();
    if text.contains('.') || text.contains('e') || !f.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}

fn precedence(ast: &HostAst) -> u8 {
    match ast {
        HostAst::Assignment { .. } | HostAst::Yield { .. } | HostAst::Closure { .. } => {
            PREC_LOWEST
        }
        HostAst::Ternary { .. } => PREC_TERNARY,
        HostAst::Binary { op, .. } => op.precedence(),
        HostAst::Unary { .. } | HostAst::Reference { .. } => PREC_UNARY,
        _ => PREC_POSTFIX,
    }
}

/// Print `ast`, parenthesised when it binds looser than `min_prec`
fn expr(ast: &HostAst, min_prec: u8, indent: usize) -> String {
    let text = expr_inner(ast, indent);
    if precedence(ast) < min_prec {
        format!("({text})")
    } else {
        text
    }
}

fn args_list(args: &[HostAst], indent: usize) -> String {
    args.iter()
        .map(|arg| expr(arg, PREC_LOWEST, indent))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_scope(scope: &Scope, indent: usize) -> String {
    match scope {
        Scope::SelfUnit => "self".to_string(),
        Scope::Static => "static".to_string(),
        Scope::Parent => "parent".to_string(),
        Scope::Named(name) => name.clone(),
        Scope::Expr(inner) => expr(inner, PREC_POSTFIX, indent),
    }
}

fn format_param(param: &Parameter, indent: usize) -> String {
    let mut result = String::new();
    if param.by_ref {
        result.push('&');
    }
    if param.variadic {
        result.push_str("...");
    }
    result.push_str(&param.name);
    if let Some(default) = &param.default_value {
        result.push_str(" = ");
        result.push_str(&expr(default, PREC_LOWEST, indent));
    }
    result
}

fn params_list(params: &[Parameter], indent: usize) -> String {
    params
        .iter()
        .map(|p| format_param(p, indent))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `{ ... }` with the body one level deeper than `indent`
fn block(body: &[HostAst], indent: usize) -> String {
    if body.is_empty() {
        return "{}".to_string();
    }
    let mut result = String::from("{\n");
    for stmt in body {
        write_statement(stmt, indent + 1, &mut result);
    }
    result.push_str(&INDENT.repeat(indent));
    result.push('}');
    result
}

fn expr_inner(ast: &HostAst, indent: usize) -> String {
    match ast {
        // Literals
        HostAst::Integer(n) => n.to_string(),
        HostAst::Float(f) => format_float(*f),
        HostAst::String(s) => format!("\"{}\"", escape_string(s)),
        HostAst::Boolean(b) => b.to_string(),
        HostAst::Null => "null".to_string(),

        // Identifiers and references
        HostAst::Identifier(name) => name.clone(),
        HostAst::This => "this".to_string(),
        HostAst::Reference { target } => format!("&{}", expr(target, PREC_POSTFIX, indent)),

        // Operators
        HostAst::Binary { op, left, right } => {
            let prec = op.precedence();
            format!(
                "{} {} {}",
                expr(left, prec, indent),
                op.symbol(),
                expr(right, prec + 1, indent)
            )
        }
        HostAst::Unary { op, operand } => {
            let symbol = match op {
                UnaryOp::Not => "!",
                UnaryOp::Minus => "-",
            };
            format!("{symbol}{}", expr(operand, PREC_UNARY, indent))
        }
        HostAst::Ternary {
            condition,
            then_value,
            else_value,
        } => format!(
            "{} ? {} : {}",
            expr(condition, PREC_TERNARY + 1, indent),
            expr(then_value, PREC_LOWEST, indent),
            expr(else_value, PREC_TERNARY, indent)
        ),
        HostAst::Assignment { target, value } => format!(
            "{} = {}",
            expr(target, PREC_POSTFIX, indent),
            expr(value, PREC_LOWEST, indent)
        ),

        // Member and index access
        HostAst::PropertyAccess { object, property } => {
            format!("{}.{property}", expr(object, PREC_POSTFIX, indent))
        }
        HostAst::IndexAccess { object, index } => format!(
            "{}[{}]",
            expr(object, PREC_POSTFIX, indent),
            expr(index, PREC_LOWEST, indent)
        ),

        // Calls
        HostAst::FunctionCall { name, args } => format!("{name}({})", args_list(args, indent)),
        HostAst::MethodCall {
            object,
            method,
            args,
        } => format!(
            "{}.{method}({})",
            expr(object, PREC_POSTFIX, indent),
            args_list(args, indent)
        ),
        HostAst::StaticCall {
            scope,
            method,
            args,
        } => format!(
            "{}::{method}({})",
            format_scope(scope, indent),
            args_list(args, indent)
        ),
        HostAst::Call { func, args } => format!(
            "{}({})",
            expr(func, PREC_POSTFIX, indent),
            args_list(args, indent)
        ),
        HostAst::Spread(inner) => format!("...{}", expr(inner, PREC_LOWEST, indent)),
        HostAst::New { scope, args } => format!(
            "new {}({})",
            format_scope(scope, indent),
            args_list(args, indent)
        ),

        // Unit-level access
        HostAst::ClassConstant { scope, name } => {
            format!("{}::{name}", format_scope(scope, indent))
        }
        HostAst::ClassName { scope } => format!("{}::class", format_scope(scope, indent)),

        // Collections
        HostAst::List { elements } => format!("[{}]", args_list(elements, indent)),
        HostAst::Map { entries } => {
            if entries.is_empty() {
                return "{}".to_string();
            }
            let entries_str = entries
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{}: {}",
                        expr(key, PREC_TERNARY + 1, indent),
                        expr(value, PREC_LOWEST, indent)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{entries_str}}}")
        }

        // Anonymous functions
        HostAst::Closure {
            params,
            captures,
            body,
            by_ref,
        } => {
            let mut result = String::from("fn ");
            if *by_ref {
                result.push('&');
            }
            result.push_str(&format!("({})", params_list(params, indent)));
            if !captures.is_empty() {
                let captures_str = captures
                    .iter()
                    .map(|c| {
                        if c.by_ref {
                            format!("&{}", c.name)
                        } else {
                            c.name.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                result.push_str(&format!(" use ({captures_str})"));
            }
            result.push(' ');
            result.push_str(&block(body, indent));
            result
        }

        // Suspension and termination
        HostAst::Yield { key, value } => match (key, value) {
            (Some(key), Some(value)) => format!(
                "yield {} => {}",
                expr(key, PREC_TERNARY, indent),
                expr(value, PREC_TERNARY, indent)
            ),
            (None, Some(value)) => format!("yield {}", expr(value, PREC_TERNARY, indent)),
            _ => "yield".to_string(),
        },
        HostAst::Exit { status } => match status {
            Some(status) => format!("exit({})", expr(status, PREC_LOWEST, indent)),
            None => "exit".to_string(),
        },

        // Statements and declarations never appear in expression position;
        // print them as a statement to keep the output inspectable.
        other => {
            let mut out = String::new();
            write_statement(other, indent, &mut out);
            out.trim().to_string()
        }
    }
}

fn write_line(out: &mut String, indent: usize, text: &str) {
    out.push_str(&INDENT.repeat(indent));
    out.push_str(text);
    out.push('\n');
}

fn is_declaration(ast: &HostAst) -> bool {
    matches!(ast, HostAst::FunctionDef { .. } | HostAst::UnitDef { .. })
}

fn write_statement(ast: &HostAst, indent: usize, out: &mut String) {
    match ast {
        HostAst::Program(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 && (is_declaration(item) || is_declaration(&items[i - 1])) {
                    out.push('\n');
                }
                write_statement(item, indent, out);
            }
        }
        HostAst::Let { name, value } => match value {
            Some(value) => write_line(
                out,
                indent,
                &format!("let {name} = {};", expr(value, PREC_LOWEST, indent)),
            ),
            None => write_line(out, indent, &format!("let {name};")),
        },
        HostAst::Return { value } => match value {
            Some(value) => write_line(
                out,
                indent,
                &format!("return {};", expr(value, PREC_LOWEST, indent)),
            ),
            None => write_line(out, indent, "return;"),
        },
        HostAst::If { .. } => {
            let text = format_if(ast, indent);
            write_line(out, indent, &text);
        }
        HostAst::While { condition, body } => write_line(
            out,
            indent,
            &format!(
                "while ({}) {}",
                expr(condition, PREC_LOWEST, indent),
                block(body, indent)
            ),
        ),
        HostAst::For {
            key,
            value,
            by_ref,
            collection,
            body,
        } => {
            let mut binding = String::new();
            if let Some(key) = key {
                binding.push_str(key);
                binding.push_str(", ");
            }
            if *by_ref {
                binding.push('&');
            }
            binding.push_str(value);
            write_line(
                out,
                indent,
                &format!(
                    "for ({binding} in {}) {}",
                    expr(collection, PREC_LOWEST, indent),
                    block(body, indent)
                ),
            )
        }
        HostAst::Break => write_line(out, indent, "break;"),
        HostAst::Continue => write_line(out, indent, "continue;"),
        HostAst::Throw { value } => write_line(
            out,
            indent,
            &format!("throw {};", expr(value, PREC_LOWEST, indent)),
        ),
        HostAst::Try {
            body,
            catch,
            finally,
        } => {
            let mut text = format!("try {}", block(body, indent));
            if let Some(catch) = catch {
                text.push_str(&format!(
                    " catch ({}) {}",
                    catch.error_var,
                    block(&catch.body, indent)
                ));
            }
            if let Some(finally) = finally {
                text.push_str(&format!(" finally {}", block(finally, indent)));
            }
            write_line(out, indent, &text);
        }
        HostAst::ExpressionStatement(inner) => {
            let text = expr(inner, 0, indent);
            // A leading brace would read back as a block
            if text.starts_with('{') {
                write_line(out, indent, &format!("({text});"));
            } else {
                write_line(out, indent, &format!("{text};"));
            }
        }
        HostAst::Block(stmts) => write_line(out, indent, &block(stmts, indent)),
        HostAst::FunctionDef {
            name,
            params,
            body,
            by_ref,
        } => {
            let amp = if *by_ref { "&" } else { "" };
            write_line(
                out,
                indent,
                &format!(
                    "fn {amp}{name}({}) {}",
                    params_list(params, indent),
                    block(body, indent)
                ),
            );
        }
        HostAst::UnitDef {
            name,
            parent,
            is_abstract,
            members,
        } => {
            let mut header = String::new();
            if *is_abstract {
                header.push_str("abstract ");
            }
            header.push_str("class ");
            header.push_str(name);
            if let Some(parent) = parent {
                header.push_str(" extends ");
                header.push_str(parent);
            }
            if members.is_empty() {
                write_line(out, indent, &format!("{header} {{}}"));
                return;
            }
            write_line(out, indent, &format!("{header} {{"));
            for (i, member) in members.iter().enumerate() {
                let callable = matches!(
                    member,
                    UnitMember::Method { .. } | UnitMember::Constructor { .. }
                );
                if i > 0 && callable {
                    out.push('\n');
                }
                write_member(member, indent + 1, out);
            }
            write_line(out, indent, "}");
        }
        // Bare expressions in statement position
        other => {
            let text = expr(other, 0, indent);
            write_line(out, indent, &format!("{text};"));
        }
    }
}

fn format_if(ast: &HostAst, indent: usize) -> String {
    let HostAst::If {
        condition,
        then_branch,
        else_branch,
    } = ast
    else {
        return String::new();
    };
    let mut text = format!(
        "if ({}) {}",
        expr(condition, PREC_LOWEST, indent),
        block(then_branch, indent)
    );
    match else_branch.as_deref() {
        Some([nested @ HostAst::If { .. }]) => {
            text.push_str(" else ");
            text.push_str(&format_if(nested, indent));
        }
        Some(stmts) => {
            text.push_str(" else ");
            text.push_str(&block(stmts, indent));
        }
        None => {}
    }
    text
}

fn write_member(member: &UnitMember, indent: usize, out: &mut String) {
    match member {
        UnitMember::Constant {
            name,
            value,
            visibility,
        } => write_line(
            out,
            indent,
            &format!(
                "{visibility} const {name} = {};",
                expr(value, PREC_LOWEST, indent)
            ),
        ),
        UnitMember::Property {
            name,
            value,
            visibility,
        } => match value {
            Some(value) => write_line(
                out,
                indent,
                &format!(
                    "{visibility} let {name} = {};",
                    expr(value, PREC_LOWEST, indent)
                ),
            ),
            None => write_line(out, indent, &format!("{visibility} let {name};")),
        },
        UnitMember::Method {
            name,
            params,
            body,
            visibility,
            is_static,
            by_ref,
        } => {
            let mut header = format!("{visibility} ");
            if body.is_none() {
                header.push_str("abstract ");
            }
            if *is_static {
                header.push_str("static ");
            }
            header.push_str("fn ");
            if *by_ref {
                header.push('&');
            }
            header.push_str(name);
            header.push_str(&format!("({})", params_list(params, indent)));
            match body {
                Some(body) => {
                    write_line(out, indent, &format!("{header} {}", block(body, indent)))
                }
                None => write_line(out, indent, &format!("{header};")),
            }
        }
        UnitMember::Constructor {
            params,
            body,
            visibility,
        } => write_line(
            out,
            indent,
            &format!(
                "{visibility} new({}) {}",
                params_list(params, indent),
                block(body, indent)
            ),
        ),
    }
}
