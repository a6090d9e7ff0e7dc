use super::args::*;
use ddrcheck_core::config::{write_sample_scope, AppConfig, DDR_FILE, METADATA_FILE};
use ddrcheck_core::scope::ScopeStore;
use std::path::Path;

pub mod cache;
pub mod import;
pub mod query;
pub mod run;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TEST_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli, cfg: AppConfig) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args, &cfg),
        Command::Scopes => cmd_scopes(&cfg),
        Command::Versions(args) => cmd_versions(args, &cfg),
        Command::Run(args) => run::cmd_run(args, &cfg).await,
        Command::Query(args) => query::cmd_query(args, &cfg).await,
        Command::Cache(args) => match args.cmd {
            CacheSub::Build(build_args) => cache::cmd_cache_build(build_args, &cfg).await,
            CacheSub::Clear(clear_args) => cache::cmd_cache_clear(clear_args),
        },
        Command::Import(args) => import::cmd_import(args, &cfg).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let store = ScopeStore::new(&cfg.scopes_dir);
    let metadata = store.metadata_path("demo");
    if metadata.exists() {
        eprintln!("note: {} already exists (skipped)", metadata.display());
    } else {
        let dir = write_sample_scope(&cfg.scopes_dir)?;
        eprintln!("created {}", dir.display());
    }
    write_file_if_missing(
        &store.scope_dir("demo").join(DDR_FILE),
        crate::templates::DDR_YAML,
    )?;

    write_file_if_missing(
        &args.input.join("CUSTOMERS_20240101.csv"),
        crate::templates::DEMO_CUSTOMERS,
    )?;
    write_file_if_missing(
        &args.input.join("ORDERS_20240101.csv"),
        crate::templates::DEMO_ORDERS,
    )?;

    eprintln!(
        "next: ddrcheck --scopes-dir {} run --scope demo --version v1 --input {}",
        cfg.scopes_dir.display(),
        args.input.display()
    );
    Ok(exit_codes::OK)
}

fn cmd_scopes(cfg: &AppConfig) -> anyhow::Result<i32> {
    let store = ScopeStore::new(&cfg.scopes_dir);
    let scopes = store.list_scopes()?;
    if scopes.is_empty() {
        eprintln!("no scopes under {}", cfg.scopes_dir.display());
    }
    for scope in scopes {
        let marker = if store.scope_dir(&scope).join(METADATA_FILE).exists() {
            ""
        } else {
            "  (missing metadata.yaml)"
        };
        println!("{}{}", scope, marker);
    }
    Ok(exit_codes::OK)
}

fn cmd_versions(args: VersionsArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let store = ScopeStore::new(&cfg.scopes_dir);
    if !store.scope_dir(&args.scope).is_dir() {
        eprintln!("config error: unknown scope '{}'", args.scope);
        return Ok(exit_codes::CONFIG_ERROR);
    }
    for version in store.list_versions(&args.scope)? {
        let files = store.expected_files(&args.scope, &version)?;
        println!("{}\t{} file(s)", version, files.len());
    }
    Ok(exit_codes::OK)
}

fn write_file_if_missing(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::write(path, content)?;
        eprintln!("created {}", path.display());
    } else {
        eprintln!("note: {} already exists (skipped)", path.display());
    }
    Ok(())
}
