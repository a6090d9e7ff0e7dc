use super::exit_codes;
use crate::cli::args::{CacheBuildArgs, CacheClearArgs};
use ddrcheck_core::config::AppConfig;
use ddrcheck_core::scope::ScopeStore;
use ddrcheck_core::storage::{clear_cache, CacheBuild, ExtractorFile};

pub async fn cmd_cache_build(args: CacheBuildArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let store = ScopeStore::new(&cfg.scopes_dir);
    let names = match store.expected_files(&args.scope, &args.scope_version) {
        Ok(names) => names,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let files: Vec<ExtractorFile> = names
        .iter()
        .map(|name| {
            ExtractorFile::new(&store, &args.scope, &args.scope_version, name, &args.input)
        })
        .collect();

    let results = tokio::task::spawn_blocking(move || {
        files
            .iter()
            .map(|f| (f.name().to_string(), f.ensure_cached()))
            .collect::<Vec<_>>()
    })
    .await?;

    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(CacheBuild::Built { rows }) => eprintln!("built {} ({} rows)", name, rows),
            Ok(CacheBuild::Reused) => eprintln!("reused {}", name),
            Err(e) => {
                failed += 1;
                eprintln!("failed {}: {}", name, e);
            }
        }
    }

    if failed > 0 {
        Ok(exit_codes::TEST_FAILED)
    } else {
        Ok(exit_codes::OK)
    }
}

pub fn cmd_cache_clear(args: CacheClearArgs) -> anyhow::Result<i32> {
    let removed = clear_cache(&args.input)?;
    eprintln!("removed {} cache file(s) from {}", removed, args.input.display());
    Ok(exit_codes::OK)
}
