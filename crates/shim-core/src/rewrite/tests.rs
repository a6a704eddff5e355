use pretty_assertions::assert_eq;

use super::*;
use crate::ast::ToSource;
use crate::bridge::{AstBridge, HostBridge};
use crate::records::CallableKind;

fn rewrite(source: &str) -> RewriteResult<RewriteOutput> {
    let program = HostBridge.parse(source).expect("fixture parses");
    Rewriter::with_default_rules().rewrite(program, Some("fixture.shim"))
}

/// Rewritten text without the leading declare statement
fn rewritten_body(source: &str) -> String {
    let output = rewrite(source).expect("rewrite succeeds");
    let HostAst::Program(items) = output.program else {
        panic!("expected program");
    };
    assert!(matches!(
        items.first(),
        Some(HostAst::ExpressionStatement(first)) if Hook::matching(first) == Some(Hook::Declare)
    ));
    HostAst::Program(items[1..].to_vec()).to_source()
}

#[test]
fn test_method_prologue() {
    let actual = rewritten_body(
        "class A { public fn m(a, b = 2) { return a + b; } }",
    );
    let expected = r#"class A {
    public fn m(a, b = 2) {
        if (__shim::intercepted("A", static::class, "m")) {
            return __shim::call("A", static::class, "m", func_args(), this);
        }
        return a + b;
    }
}
"#;
    assert_eq!(actual, expected);
}

#[test]
fn test_by_reference_parameters_are_rebound() {
    let actual = rewritten_body("class A { public fn swap(&a, x, &b = null) { return 1; } }");
    let expected = r#"class A {
    public fn swap(&a, x, &b = null) {
        if (__shim::intercepted("A", static::class, "swap")) {
            let __shim_args = func_args();
            __shim_args[0] = &a;
            if (count(__shim_args) > 2) {
                __shim_args[2] = &b;
            }
            return __shim::call("A", static::class, "swap", __shim_args, this);
        }
        return 1;
    }
}
"#;
    assert_eq!(actual, expected);
}

#[test]
fn test_static_method_and_constructor() {
    let actual = rewritten_body(
        "class A { public new(v) { this.v = v; } public static fn make() { return new static(1); } }",
    );
    let expected = r#"class A {
    public new(v) {
        if (__shim::intercepted("A", static::class, "new")) {
            __shim::call("A", static::class, "new", func_args(), this);
            return;
        }
        this.v = v;
    }

    public static fn make() {
        if (__shim::intercepted("A", static::class, "make")) {
            return __shim::call("A", static::class, "make", func_args(), null);
        }
        return new static(1);
    }
}
"#;
    assert_eq!(actual, expected);
}

#[test]
fn test_function_prologue_has_no_unit() {
    let actual = rewritten_body("fn add(a, b) { return a + b; }");
    let expected = r#"fn add(a, b) {
    if (__shim::intercepted(null, null, "add")) {
        return __shim::call(null, null, "add", func_args(), null);
    }
    return a + b;
}
"#;
    assert_eq!(actual, expected);
}

#[test]
fn test_generator_is_wrapped() {
    let actual = rewritten_body(
        "class G { public fn &numbers(limit = 10, ...extra) { for (i in limit) { yield i; } } }",
    );
    let expected = r#"class G {
    public fn &numbers(limit = 10, ...extra) {
        if (__shim::intercepted("G", static::class, "numbers")) {
            return __shim::generator("G", static::class, "numbers", func_args(), this);
        }
        let __shim_original = fn &(limit, ...extra) {
            for (i in limit) {
                yield i;
            }
        };
        return __shim_original(limit, ...extra);
    }
}
"#;
    assert_eq!(actual, expected);
}

#[test]
fn test_generator_function_gets_no_call_prologue() {
    let actual = rewritten_body("fn gen() { yield 1; }");
    assert!(actual.contains("__shim::generator(null, null, \"gen\", func_args(), null)"));
    assert!(!actual.contains("__shim::call("));
}

#[test]
fn test_constant_fetches() {
    let actual = rewritten_body(
        r#"class B extends A {
            const OWN = self::OWN_BASE;
            public fn read(d = self::D) {
                return [self::X, static::X, parent::X, Other::X, this.peer::X];
            }
        }"#,
    );
    // Initializers and parameter defaults are left alone
    assert!(actual.contains("public const OWN = self::OWN_BASE;"));
    assert!(actual.contains("public fn read(d = self::D) {"));
    assert!(actual.contains(
        "return [__shim::constant(\"B\", \"B\", \"X\"), \
         __shim::constant(\"B\", static::class, \"X\"), \
         __shim::constant(\"B\", \"A\", \"X\"), \
         __shim::constant(\"B\", \"Other\", \"X\"), \
         __shim::constant(\"B\", this.peer::class, \"X\")];"
    ));
}

#[test]
fn test_constant_outside_unit() {
    let output = rewrite("let v = Config::LIMIT;").expect("rewrite");
    assert_eq!(
        output.program.to_source(),
        "let v = __shim::constant(null, \"Config\", \"LIMIT\");\n"
    );
}

#[test]
fn test_scope_errors() {
    assert!(matches!(
        rewrite("let v = self::X;"),
        Err(RewriteError::ScopeOutsideUnit { scope: "self" })
    ));
    assert!(matches!(
        rewrite("fn f() { return static::X; }"),
        Err(RewriteError::ScopeOutsideUnit { scope: "static" })
    ));
    let err = rewrite("class Root { fn f() { return parent::X; } }").unwrap_err();
    assert!(matches!(&err, RewriteError::NoParent { unit } if unit == "Root"));
    assert_eq!(
        err.to_string(),
        "`parent::` used in class Root, which has no parent"
    );
}

#[test]
fn test_exit_rewritten_everywhere() {
    let actual = rewritten_body(
        "fn stop(code) { let quit = fn () { exit; }; exit(code + 1); }",
    );
    assert!(actual.contains("let quit = fn () {\n        __shim::exit(0);\n    };"));
    assert!(actual.contains("__shim::exit(code + 1);"));
    // The closure itself is not an interception point
    assert_eq!(actual.matches("__shim::intercepted").count(), 1);
}

#[test]
fn test_abstract_method_untouched() {
    let actual = rewritten_body("abstract class S { public abstract fn area(); }");
    assert_eq!(actual, "abstract class S {\n    public abstract fn area();\n}\n");
}

#[test]
fn test_plain_script_gets_no_declare() {
    let program = HostBridge.parse("let x = 1;").expect("parse");
    let output = Rewriter::with_default_rules()
        .rewrite(program, None)
        .expect("rewrite");
    assert!(output.module.is_empty());
    assert_eq!(output.program.to_source(), "let x = 1;\n");
}

#[test]
fn test_declared_records_match_output() {
    let output = rewrite("class A { fn m() {} fn g() { yield 1; } }").expect("rewrite");
    let HostAst::Program(items) = &output.program else {
        panic!("expected program");
    };
    let HostAst::ExpressionStatement(first) = &items[0] else {
        panic!("expected declare statement");
    };
    let HostAst::StaticCall { args, .. } = first.as_ref() else {
        panic!("expected hook call");
    };
    let HostAst::String(json) = &args[0] else {
        panic!("expected json literal");
    };
    let declared = ModuleRecord::from_json(json).expect("valid json");
    assert_eq!(declared, output.module);
    assert_eq!(declared.source.as_deref(), Some("fixture.shim"));
    assert_eq!(
        declared.callable_kind(Some("A"), "g"),
        Some(CallableKind::Generator)
    );
}

#[test]
fn test_rewrite_is_deterministic_and_not_repeated() {
    let source = "class A { const C = 1; fn m(&x) { exit; return self::C; } }";
    let first = HostBridge.print(&rewrite(source).expect("rewrite").program);
    let second = HostBridge.print(&rewrite(source).expect("rewrite").program);
    assert_eq!(first, second);

    // Feeding rewritten output back in leaves it unchanged
    let again = Rewriter::with_default_rules()
        .rewrite(HostBridge.parse(&first).expect("parse"), Some("fixture.shim"))
        .expect("rewrite");
    assert_eq!(HostBridge.print(&again.program), first);
    assert!(again.module.unit("A").is_some());
}

#[test]
fn test_depth_limit() {
    let program = HostBridge.parse("let x = ((((1))));  let y = [[[[[1]]]]];").expect("parse");
    let err = Rewriter::with_default_rules()
        .max_depth(4)
        .rewrite(program, None)
        .unwrap_err();
    assert!(matches!(err, RewriteError::TooDeep { max_depth: 4 }));
}

#[test]
fn test_rules_run_by_priority_and_record_stats() {
    let mut rewriter = Rewriter::with_default_rules();
    assert_eq!(
        rewriter.rule_names(),
        vec![
            "constant-access",
            "process-exit",
            "host-call",
            "generator-wrapper",
            "call-prologue"
        ]
    );

    let program = HostBridge
        .parse("class A { fn a() { return self::X; } fn b() { exit; } }")
        .expect("parse");
    rewriter.rewrite(program, None).expect("rewrite");
    let stats = rewriter.stats();
    assert_eq!(stats["call-prologue"].transformations, 2);
    assert_eq!(stats["constant-access"].transformations, 1);
    assert_eq!(stats["process-exit"].transformations, 1);
    assert_eq!(stats["generator-wrapper"].applications, 0);
}

#[test]
fn test_config_can_disable_optional_rules() {
    let config = ShimConfig {
        rewrite_constants: false,
        rewrite_exit: false,
        ..ShimConfig::default()
    };
    let rewriter = Rewriter::from_config(&config);
    assert_eq!(
        rewriter.rule_names(),
        vec!["host-call", "generator-wrapper", "call-prologue"]
    );

    let config = ShimConfig {
        rewrite_host_calls: false,
        ..ShimConfig::default()
    };
    assert!(!Rewriter::from_config(&config).rule_names().contains(&"host-call"));
}

#[test]
fn test_host_function_call_sites_are_guarded() {
    let actual = rewritten_body(
        "fn resolve(path) { let full = realpath(path, ...rest); return helper(full) + count(func_args()); } fn helper(p) { return p; }",
    );
    assert!(actual.contains(
        r#"let full = __shim::intercepted(null, null, "realpath") ? __shim::call(null, null, "realpath", [path, ...rest], null) : realpath(path, ...rest);"#
    ));
    // Functions declared in the file keep their prologue instead
    assert!(actual.contains("return helper(full) + count(func_args());"));
    assert!(!actual.contains(r#""helper", [full]"#));
}

#[test]
fn test_guarded_script_is_not_guarded_twice() {
    let program = HostBridge.parse("let p = realpath(\"a\");").expect("parse");
    let output = Rewriter::with_default_rules()
        .rewrite(program, None)
        .expect("rewrite");
    assert!(output.module.is_empty());
    let first = output.program.to_source();
    assert!(first.starts_with("__shim::declare("));
    assert_eq!(first.matches("__shim::intercepted").count(), 1);

    let again = Rewriter::with_default_rules()
        .rewrite(HostBridge.parse(&first).expect("parse"), None)
        .expect("rewrite");
    assert_eq!(again.program.to_source(), first);
}
