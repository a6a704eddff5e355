// Tests for source code generation

use super::*;

fn boxed(ast: HostAst) -> Box<HostAst> {
    Box::new(ast)
}

fn binary(op: BinaryOp, left: HostAst, right: HostAst) -> HostAst {
    HostAst::Binary {
        op,
        left: boxed(left),
        right: boxed(right),
    }
}

#[test]
fn test_literals_to_source() {
    assert_eq!(HostAst::Integer(42).to_source(), "42");
    assert_eq!(HostAst::Float(2.0).to_source(), "2.0");
    assert_eq!(HostAst::Float(1.5).to_source(), "1.5");
    assert_eq!(HostAst::Boolean(true).to_source(), "true");
    assert_eq!(HostAst::Null.to_source(), "null");
    assert_eq!(
        HostAst::string("say \"hi\"\n").to_source(),
        r#""say \"hi\"\n""#
    );
}

#[test]
fn test_binary_parenthesises_only_when_needed() {
    // (1 + 2) * 3
    let grouped = binary(
        BinaryOp::Multiply,
        binary(BinaryOp::Add, HostAst::Integer(1), HostAst::Integer(2)),
        HostAst::Integer(3),
    );
    assert_eq!(grouped.to_source(), "(1 + 2) * 3");

    // 1 + 2 * 3
    let natural = binary(
        BinaryOp::Add,
        HostAst::Integer(1),
        binary(BinaryOp::Multiply, HostAst::Integer(2), HostAst::Integer(3)),
    );
    assert_eq!(natural.to_source(), "1 + 2 * 3");

    // 1 - (2 - 3) keeps its right grouping
    let right_nested = binary(
        BinaryOp::Subtract,
        HostAst::Integer(1),
        binary(BinaryOp::Subtract, HostAst::Integer(2), HostAst::Integer(3)),
    );
    assert_eq!(right_nested.to_source(), "1 - (2 - 3)");
}

#[test]
fn test_scoped_access_to_source() {
    let constant = HostAst::ClassConstant {
        scope: Scope::Static,
        name: "VALUE".to_string(),
    };
    assert_eq!(constant.to_source(), "static::VALUE");

    let class_name = HostAst::ClassName {
        scope: Scope::Expr(boxed(HostAst::ident("obj"))),
    };
    assert_eq!(class_name.to_source(), "obj::class");

    let call = HostAst::StaticCall {
        scope: Scope::Named("__shim".to_string()),
        method: "exit".to_string(),
        args: vec![HostAst::Integer(0)],
    };
    assert_eq!(call.to_source(), "__shim::exit(0)");
}

#[test]
fn test_closure_prints_params_captures_and_body() {
    let closure = HostAst::Closure {
        params: vec![
            Parameter {
                name: "a".to_string(),
                default_value: Some(HostAst::Integer(1)),
                by_ref: true,
                variadic: false,
            },
            Parameter {
                name: "rest".to_string(),
                default_value: None,
                by_ref: false,
                variadic: true,
            },
        ],
        captures: vec![Capture {
            name: "total".to_string(),
            by_ref: true,
        }],
        body: vec![HostAst::Return {
            value: Some(boxed(HostAst::ident("a"))),
        }],
        by_ref: false,
    };
    assert_eq!(
        closure.to_source(),
        "fn (&a = 1, ...rest) use (&total) {\n    return a;\n}"
    );
}

#[test]
fn test_closure_called_immediately_is_grouped() {
    let call = HostAst::Call {
        func: boxed(HostAst::Closure {
            params: vec![],
            captures: vec![],
            body: vec![],
            by_ref: false,
        }),
        args: vec![],
    };
    assert_eq!(call.to_source(), "(fn () {})()");
}

#[test]
fn test_yield_inside_binary_is_grouped() {
    let sum = binary(
        BinaryOp::Add,
        HostAst::Yield {
            key: None,
            value: Some(boxed(HostAst::Integer(1))),
        },
        HostAst::Integer(2),
    );
    assert_eq!(sum.to_source(), "(yield 1) + 2");
}

#[test]
fn test_else_if_chain() {
    let stmt = HostAst::If {
        condition: boxed(HostAst::ident("a")),
        then_branch: vec![HostAst::Return {
            value: Some(boxed(HostAst::Integer(1))),
        }],
        else_branch: Some(vec![HostAst::If {
            condition: boxed(HostAst::ident("b")),
            then_branch: vec![HostAst::Return {
                value: Some(boxed(HostAst::Integer(2))),
            }],
            else_branch: Some(vec![HostAst::Return { value: None }]),
        }]),
    };
    let expected = "\
if (a) {
    return 1;
} else if (b) {
    return 2;
} else {
    return;
}";
    assert_eq!(stmt.to_source(), expected);
}

#[test]
fn test_map_expression_statement_is_not_a_block() {
    let stmt = HostAst::ExpressionStatement(boxed(HostAst::Map {
        entries: vec![(HostAst::string("k"), HostAst::Integer(1))],
    }));
    assert_eq!(stmt.to_source(), "({\"k\": 1});");
}

#[test]
fn test_unit_definition_to_source() {
    let unit = HostAst::UnitDef {
        name: "Child".to_string(),
        parent: Some("Base".to_string()),
        is_abstract: true,
        members: vec![
            UnitMember::Constant {
                name: "LIMIT".to_string(),
                value: HostAst::Integer(3),
                visibility: Visibility::Protected,
            },
            UnitMember::Property {
                name: "count".to_string(),
                value: None,
                visibility: Visibility::Private,
            },
            UnitMember::Constructor {
                params: vec![Parameter::simple("count")],
                body: vec![HostAst::ExpressionStatement(boxed(HostAst::Assignment {
                    target: boxed(HostAst::PropertyAccess {
                        object: boxed(HostAst::This),
                        property: "count".to_string(),
                    }),
                    value: boxed(HostAst::ident("count")),
                }))],
                visibility: Visibility::Public,
            },
            UnitMember::Method {
                name: "describe".to_string(),
                params: vec![],
                body: None,
                visibility: Visibility::Public,
                is_static: true,
                by_ref: false,
            },
        ],
    };
    let expected = "\
abstract class Child extends Base {
    protected const LIMIT = 3;
    private let count;

    public new(count) {
        this.count = count;
    }

    public abstract static fn describe();
}";
    assert_eq!(unit.to_source(), expected);
}

#[test]
fn test_program_separates_declarations() {
    let program = HostAst::Program(vec![
        HostAst::Let {
            name: "x".to_string(),
            value: Some(boxed(HostAst::Integer(1))),
        },
        HostAst::FunctionDef {
            name: "f".to_string(),
            params: vec![],
            body: vec![HostAst::Return {
                value: Some(boxed(HostAst::ident("x"))),
            }],
            by_ref: true,
        },
    ]);
    assert_eq!(
        program.to_source(),
        "let x = 1;\n\nfn &f() {\n    return x;\n}\n"
    );
}

#[test]
fn test_for_loop_binding() {
    let stmt = HostAst::For {
        key: Some("k".to_string()),
        value: "v".to_string(),
        by_ref: true,
        collection: boxed(HostAst::ident("items")),
        body: vec![HostAst::Break],
    };
    assert_eq!(
        stmt.to_source(),
        "for (k, &v in items) {\n    break;\n}"
    );
}
