use super::exit_codes;
use crate::cli::args::ImportArgs;
use ddrcheck_core::config::AppConfig;
use ddrcheck_core::ddr::import_sheets;
use ddrcheck_core::scope::ScopeStore;

pub async fn cmd_import(args: ImportArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    if !args.sheets.exists() {
        eprintln!(
            "config error: {} does not exist",
            args.sheets.display()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }

    let store = ScopeStore::new(&cfg.scopes_dir);
    let summary = match import_sheets(&store, &args.scope, &args.scope_version, &args.sheets) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    for (sheet, fields) in &summary.written {
        eprintln!(
            "created {} ({} fields)",
            store
                .structure_path(&args.scope, &args.scope_version, sheet)
                .display(),
            fields
        );
    }
    if !summary.skipped_sheets.is_empty() {
        eprintln!("skipped sheets: {}", summary.skipped_sheets.join(", "));
    }
    for (sheet, field, format) in &summary.unknown_formats {
        eprintln!("warning: {}.{}: unknown format '{}'", sheet, field, format);
    }
    eprintln!(
        "imported {} sheet(s) into {}/{}",
        summary.written.len(),
        args.scope,
        args.scope_version
    );
    Ok(exit_codes::OK)
}
