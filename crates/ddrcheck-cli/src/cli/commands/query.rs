use super::exit_codes;
use crate::cli::args::QueryArgs;
use ddrcheck_core::config::AppConfig;
use ddrcheck_core::errors::LoaderError;
use ddrcheck_core::scope::ScopeStore;
use ddrcheck_core::storage::{ExtractorFile, Page, PagedQuery};

pub async fn cmd_query(args: QueryArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let json_out = match args.format.as_str() {
        "text" => false,
        "json" => true,
        other => {
            eprintln!("config error: unknown --format '{}' (expected text or json)", other);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let store = ScopeStore::new(&cfg.scopes_dir);
    let file = ExtractorFile::new(
        &store,
        &args.scope,
        &args.scope_version,
        &args.file,
        &args.input,
    );
    let mut paged = PagedQuery::new(args.page_size.unwrap_or(cfg.page_size));
    paged.set_query(args.sql.clone());
    let page_no = args.page;

    let result = tokio::task::spawn_blocking(move || paged.fetch(&file, page_no)).await?;
    let page = match result {
        Ok(page) => page,
        Err(e @ LoaderError::Sqlite(_)) => {
            eprintln!("query error: {}", e);
            return Ok(exit_codes::TEST_FAILED);
        }
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    if json_out {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_page(&page);
    }
    Ok(exit_codes::OK)
}

fn print_page(page: &Page) {
    println!("{}", page.columns.join("\t"));
    for row in &page.rows {
        println!("{}", row.join("\t"));
    }
    eprintln!(
        "page {}/{} ({} row(s) total, {} per page)",
        page.page + 1,
        page.total_pages.max(1),
        page.total_rows,
        page.page_size
    );
}
