use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shim_core::{
    parser::create_parser,
    runtime::{Behavior, CallSite, InterceptionId, MockRegistry, Value},
    Loader, ModuleRecord, Rewriter, ShimConfig, ToSource,
};
use tempfile::TempDir;

const SOURCE: &str = r#"
class Base {
    const LIMIT = 10;
    protected const DOUBLE = self::LIMIT * 2;

    public new(name) {
        this.name = name;
    }

    public fn value(a, b = 2) {
        return a + b + static::LIMIT;
    }

    public fn &items(limit) {
        for (i in limit) {
            yield i;
        }
    }
}

class Child extends Base {
    const LIMIT = 20;
}

fn main(code) {
    let c = new Child("c");
    if (code > 0) {
        exit(code);
    }
    return c.value(1) + Base::LIMIT;
}
"#;

fn bench_parse(c: &mut Criterion) {
    let mut parser = create_parser("host").unwrap();
    c.bench_function("parse", |b| {
        b.iter(|| black_box(parser.parse_program(black_box(SOURCE)).unwrap()));
    });
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite");
    let mut parser = create_parser("host").unwrap();
    let program = parser.parse_program(SOURCE).unwrap();

    group.bench_function("rules", |b| {
        let mut rewriter = Rewriter::with_default_rules();
        b.iter(|| {
            let output = rewriter.rewrite(program.clone(), Some("bench.shim")).unwrap();
            black_box(output);
        });
    });

    group.bench_function("rules_and_print", |b| {
        let mut rewriter = Rewriter::with_default_rules();
        b.iter(|| {
            let output = rewriter.rewrite(program.clone(), Some("bench.shim")).unwrap();
            black_box(output.program.to_source());
        });
    });

    group.finish();
}

fn bench_loader(c: &mut Criterion) {
    let mut group = c.benchmark_group("loader");
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bench.shim");
    std::fs::write(&path, SOURCE).unwrap();
    let config = ShimConfig {
        cache_dir: temp_dir.path().join("cache"),
        ..ShimConfig::default()
    };
    let loader = Loader::new(config).unwrap();

    group.bench_function("cache_miss", |b| {
        b.iter(|| {
            loader.cache().invalidate(&path).unwrap();
            black_box(loader.rewrite_file(&path).unwrap());
        });
    });

    loader.rewrite_file(&path).unwrap();
    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            let unit = loader.rewrite_file(&path).unwrap();
            assert!(unit.cache_hit);
            black_box(unit);
        });
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let mut parser = create_parser("host").unwrap();
    let program = parser.parse_program(SOURCE).unwrap();
    let registry = MockRegistry::new();
    registry
        .register_module(&ModuleRecord::collect(&program, None))
        .unwrap();

    let call = |registry: &MockRegistry| {
        registry
            .dispatch(
                CallSite::method("Base", "Child", "value"),
                vec![Value::Integer(1)],
                None,
                |_| Ok(Value::Integer(23)),
            )
            .unwrap()
    };

    group.bench_function("not_intercepted", |b| {
        b.iter(|| black_box(call(&registry)));
    });

    registry
        .install(InterceptionId::method("Base", "value"), Behavior::value(1i64))
        .unwrap();
    group.bench_function("intercepted", |b| {
        b.iter(|| black_box(call(&registry)));
    });

    group.bench_function("constant", |b| {
        b.iter(|| black_box(registry.constant(Some("Base"), "Child", "DOUBLE").unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_rewrite,
    bench_loader,
    bench_dispatch
);
criterion_main!(benches);
