use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use shim_core::{init_tracing, FileResolver, Loader, Resolved, ShimConfig};
use tracing::debug;

fn cli() -> Command {
    Command::new("softshim")
        .version(shim_core::VERSION)
        .about("Rewrite host sources so calls, constants and exits can be intercepted")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("cache-dir")
                .long("cache-dir")
                .value_name("DIR")
                .global(true)
                .help("Directory holding rewritten units"),
        )
        .arg(
            Arg::new("include")
                .long("include")
                .short('I')
                .value_name("DIR")
                .global(true)
                .action(ArgAction::Append)
                .help("Search directory for relative references (repeatable)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("rewrite")
                .about("Rewrite files into the cache and report where the output went")
                .arg(
                    Arg::new("files")
                        .value_name("FILE")
                        .required(true)
                        .num_args(1..),
                ),
        )
        .subcommand(
            Command::new("print")
                .about("Print the rewritten form of a file without caching it")
                .arg(Arg::new("file").value_name("FILE").required(true)),
        )
        .subcommand(
            Command::new("resolve")
                .about("Show what a module reference resolves to")
                .arg(Arg::new("reference").value_name("REFERENCE").required(true))
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("FILE")
                        .help("Including file, whose directory is searched last"),
                ),
        )
        .subcommand(
            Command::new("cache")
                .about("Inspect or clear the rewrite cache")
                .subcommand_required(true)
                .subcommand(Command::new("stats").about("Show cache statistics"))
                .subcommand(Command::new("clear").about("Remove every cached unit")),
        )
}

/// Config file, then environment, then command-line flags
fn load_config(matches: &ArgMatches) -> Result<ShimConfig> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => ShimConfig::from_file(path)?,
        None => ShimConfig::default(),
    };
    let mut config = config.with_env();

    if let Some(dir) = matches.get_one::<String>("cache-dir") {
        config.cache_dir = PathBuf::from(dir);
    }
    if let Some(dirs) = matches.get_many::<String>("include") {
        config.search_paths.extend(dirs.map(PathBuf::from));
    }
    if matches.get_flag("debug") {
        config.debug = true;
    }
    Ok(config)
}

fn init_logging(debug: bool) {
    if debug {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(
                "shim_core=debug,softshim=debug",
            ))
            .try_init();
    } else {
        init_tracing();
    }
}

fn rewrite(loader: &Loader, files: Vec<&String>) -> Result<()> {
    for file in files {
        let path = Path::new(file)
            .canonicalize()
            .with_context(|| format!("cannot find {file}"))?;
        let unit = loader.rewrite_file(&path)?;
        let status = if unit.cache_hit { "cached" } else { "rewritten" };
        println!("{} -> {} ({status})", path.display(), unit.output_path.display());
    }
    Ok(())
}

fn print(loader: &Loader, file: &str) -> Result<()> {
    let path = Path::new(file);
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let (output, records) = loader.rewrite_source(&content, Some(path))?;
    debug!(
        units = records.units.len(),
        functions = records.functions.len(),
        "rewrote for printing"
    );
    print!("{output}");
    Ok(())
}

fn resolve(config: &ShimConfig, reference: &str, from: Option<&String>) -> Result<()> {
    let resolver = FileResolver::from_config(config);
    match resolver.resolve(reference, from.map(Path::new)) {
        Some(Resolved::File(path)) => {
            let handled = if config.handles(&path) { "rewritten" } else { "native" };
            println!("{} ({handled})", path.display());
        }
        Some(Resolved::Stream(stream)) => println!("{stream} (stream)"),
        None => anyhow::bail!("{reference} does not resolve; the host would load it natively"),
    }
    Ok(())
}

fn cache(loader: &Loader, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("stats", _)) => {
            let stats = loader.cache().stats()?;
            println!("Cache: {}", loader.cache().root().display());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Some(("clear", _)) => {
            loader.cache().clear()?;
            println!("Cleared {}", loader.cache().root().display());
        }
        _ => unreachable!("clap requires a cache subcommand"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    init_logging(config.debug);
    debug!(?config, "configuration");

    match matches.subcommand() {
        Some(("resolve", sub)) => {
            let reference = sub
                .get_one::<String>("reference")
                .context("missing reference")?;
            resolve(&config, reference, sub.get_one::<String>("from"))
        }
        Some((name, sub)) => {
            let loader = Loader::new(config).context("opening the rewrite cache")?;
            match name {
                "rewrite" => {
                    let files = sub.get_many::<String>("files").into_iter().flatten();
                    rewrite(&loader, files.collect())
                }
                "print" => {
                    let file = sub.get_one::<String>("file").context("missing file")?;
                    print(&loader, file)
                }
                "cache" => cache(&loader, sub),
                other => anyhow::bail!("unknown command {other}"),
            }
        }
        None => unreachable!("clap requires a subcommand"),
    }
}
