use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use shim_core::runtime::{Behavior, CallSite, InterceptionId, MockRegistry, Value};
use shim_core::{AstBridge, FileResolver, HostAst, HostBridge, LoadError, Loader, ShimConfig};
use tempfile::TempDir;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Copy the fixture tree into a scratch project so tests can edit sources
fn project() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for sub in ["lib", "app"] {
        let target = dir.path().join(sub);
        fs::create_dir_all(&target).expect("mkdir");
        for entry in fs::read_dir(fixtures().join(sub)).expect("fixture dir") {
            let entry = entry.expect("entry");
            fs::copy(entry.path(), target.join(entry.file_name())).expect("copy fixture");
        }
    }
    dir
}

fn loader(project: &Path, cache: &str) -> Loader {
    let config = ShimConfig {
        cache_dir: project.join(cache),
        search_paths: vec![PathBuf::from("lib")],
        ..ShimConfig::default()
    };
    let resolver = FileResolver::from_config(&config).with_cwd(project);
    Loader::new(config).expect("loader").with_resolver(resolver)
}

#[test]
fn test_fixtures_rewrite_with_every_hook() {
    let project = project();
    let loader = loader(project.path(), "cache");

    let shapes = loader.load("shapes.shim", None).expect("load").expect("ours");
    assert!(shapes.output.starts_with("__shim::declare("));
    assert!(shapes
        .output
        .contains("__shim::intercepted(\"Shape\", static::class, \"describe\")"));
    assert!(shapes
        .output
        .contains("__shim::generator(\"Shape\", static::class, \"corners\", func_args(), null)"));
    assert!(shapes
        .output
        .contains("__shim::constant(\"Shape\", static::class, \"SIDES\")"));
    assert!(shapes.output.contains("__shim::constant(\"Shape\", \"Shape\", \"UNIT\")"));

    let square = shapes.records.unit("Square").expect("Square recorded");
    assert_eq!(square.parent.as_deref(), Some("Shape"));

    let main = loader.load("app/main.shim", None).expect("load").expect("ours");
    assert!(main.output.contains("__shim::exit(code);"));
    assert!(main.output.contains("__shim::constant(null, \"Square\", \"SIDES\")"));
}

#[test]
fn test_output_is_deterministic_across_caches() {
    let project = project();
    let first = loader(project.path(), "cache-a");
    let second = loader(project.path(), "cache-b");

    for reference in ["shapes.shim", "app/main.shim"] {
        let a = first.load(reference, None).expect("load").expect("ours");
        let b = second.load(reference, None).expect("load").expect("ours");
        assert_eq!(a.output, b.output);
        assert_eq!(a.records, b.records);
        assert_eq!(
            a.output_path.strip_prefix(project.path().join("cache-a")).ok(),
            b.output_path.strip_prefix(project.path().join("cache-b")).ok()
        );
    }
}

#[test]
fn test_editing_one_file_invalidates_only_that_file() {
    let project = project();
    let loader = loader(project.path(), "cache");
    let before_shapes = loader.load("shapes.shim", None).expect("load").expect("ours");
    let before_main = loader.load("app/main.shim", None).expect("load").expect("ours");

    let main_path = project.path().join("app/main.shim");
    let edited = fs::read_to_string(&main_path)
        .expect("read")
        .replace("code > 0", "code > 1");
    fs::write(&main_path, edited).expect("edit");

    let after_shapes = loader.load("shapes.shim", None).expect("load").expect("ours");
    let after_main = loader.load("app/main.shim", None).expect("load").expect("ours");

    assert!(after_shapes.cache_hit);
    assert_eq!(after_shapes.output_path, before_shapes.output_path);
    assert!(!after_main.cache_hit);
    assert_ne!(after_main.output_path, before_main.output_path);
    assert!(!before_main.output_path.exists());
    assert_eq!(loader.cache().stats().expect("stats").entries, 2);
}

#[test]
fn test_rewritten_output_passes_through_unchanged() {
    let project = project();
    let loader = loader(project.path(), "cache");
    let shapes = loader.load("shapes.shim", None).expect("load").expect("ours");

    let (again, records) = loader
        .rewrite_source(&shapes.output, None)
        .expect("rewritten output reparses");
    assert_eq!(again, shapes.output);
    assert_eq!(records.units, shapes.records.units);
}

#[test]
fn test_origin_directory_is_searched_last() {
    let project = project();
    let loader = loader(project.path(), "cache");
    let origin = project.path().join("app/main.shim");

    assert!(loader.load("helpers.shim", None).expect("load").is_none());
    let helpers = loader
        .load("helpers.shim", Some(&origin))
        .expect("load")
        .expect("found next to the including file");
    assert!(helpers.source.ends_with("app/helpers.shim"));
}

#[test]
fn test_loaded_records_drive_the_registry() {
    let project = project();
    let loader = loader(project.path(), "cache");
    let shapes = loader.load("shapes.shim", None).expect("load").expect("ours");
    let main = loader.load("app/main.shim", None).expect("load").expect("ours");

    let registry = MockRegistry::new();
    registry.register_module(&shapes.records).expect("register shapes");
    registry.register_module(&main.records).expect("register main");

    registry
        .install(InterceptionId::method("Square", "describe"), Behavior::value("mocked"))
        .expect("inherited method");
    assert!(registry.intercepted(Some("Shape"), Some("Square"), "describe"));
    assert!(!registry.intercepted(Some("Shape"), Some("Shape"), "describe"));

    registry.redefine_constant("Square", "SIDES", 5i64).expect("constant");
    assert_eq!(
        registry.constant(None, "Square", "SIDES").expect("constant"),
        Value::Integer(5)
    );

    let total = registry
        .dispatch(CallSite::function("total"), vec![Value::List(vec![])], None, |_| {
            Ok(Value::Integer(0))
        })
        .expect("original");
    assert_eq!(total, Value::Integer(0));
}

/// The records JSON carried by the declare hook at the top of rewritten output
fn declared_json(output: &str) -> String {
    let HostAst::Program(items) = HostBridge.parse(output).expect("output reparses") else {
        panic!("expected a program");
    };
    match items.first() {
        Some(HostAst::ExpressionStatement(call)) => match call.as_ref() {
            HostAst::StaticCall { args, .. } => match args.first() {
                Some(HostAst::String(json)) => json.clone(),
                other => panic!("declare argument: {other:?}"),
            },
            other => panic!("first statement: {other:?}"),
        },
        other => panic!("first item: {other:?}"),
    }
}

#[test]
fn test_long_constant_initializer_survives_the_cache() {
    let project = project();
    let terms = vec!["1"; 80].join(" + ");
    fs::write(
        project.path().join("lib/totals.shim"),
        format!("class Totals {{ const SUM = {terms}; }}\n"),
    )
    .expect("write");
    let loader = loader(project.path(), "cache");

    let first = loader.load("totals.shim", None).expect("load").expect("ours");
    let second = loader.load("totals.shim", None).expect("cached load").expect("ours");
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.records, first.records);

    let registry = MockRegistry::new();
    registry
        .declare_json(&declared_json(&second.output))
        .expect("declare from cached output");
    assert_eq!(
        registry.constant(None, "Totals", "SUM").expect("constant"),
        Value::Integer(80)
    );
}

#[test]
fn test_deeply_nested_source_is_a_parse_error() {
    let project = project();
    let depth = 10_000;
    fs::write(
        project.path().join("lib/deep.shim"),
        format!("fn deep() {{ return {}1{}; }}\n", "(".repeat(depth), ")".repeat(depth)),
    )
    .expect("write");
    let loader = loader(project.path(), "cache");

    match loader.load("deep.shim", None) {
        Err(LoadError::Parse { source, .. }) => {
            assert!(source.message.contains("nesting too deep"));
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}
