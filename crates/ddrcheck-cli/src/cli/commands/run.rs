use super::exit_codes;
use crate::cli::args::RunArgs;
use chrono::Utc;
use ddrcheck_core::config::AppConfig;
use ddrcheck_core::engine::{ControllerEvent, TestController};
use ddrcheck_core::model::TestStatus;
use ddrcheck_core::report::{console, errors, json, RunReport};
use ddrcheck_core::scope::ScopeStore;
use ddrcheck_core::storage::ContentCache;
use ddrcheck_validators::default_registry;
use std::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn cmd_run(args: RunArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let json_out = match args.format.as_str() {
        "text" => false,
        "json" => true,
        other => {
            eprintln!("config error: unknown --format '{}' (expected text or json)", other);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    if !args.input.is_dir() {
        eprintln!(
            "config error: input directory {} does not exist",
            args.input.display()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }

    let store = ScopeStore::new(&cfg.scopes_dir);
    if let Err(e) = store.load_metadata(&args.scope) {
        eprintln!("config error: {}", e);
        return Ok(exit_codes::CONFIG_ERROR);
    }

    let mut ctl = TestController::new(store, default_registry())
        .with_concurrency(args.parallel.unwrap_or(cfg.workers))
        .with_content_cache(ContentCache::new(cfg.content_cache_bytes));
    if let Err(e) = ctl.build_pending_matrix(&args.scope, &args.scope_version, &args.input) {
        eprintln!("config error: {:#}", e);
        return Ok(exit_codes::CONFIG_ERROR);
    }

    let started_at = Utc::now();
    if !ctl.start() {
        eprintln!(
            "config error: scope {} version {} declares no files",
            args.scope, args.scope_version
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }

    let mut interrupted = false;
    let mut watch_signal = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            ev = ctl.next_event() => match ev {
                Some(ControllerEvent::ItemCompleted { row, col, status }) => {
                    if !json_out {
                        if let Some(test) = ctl.test(row, col) {
                            let progress = ctl.progress();
                            eprintln!(
                                "[{}/{}] {} / {}: {}",
                                progress.executed(),
                                progress.total(),
                                test.file().name(),
                                test.name(),
                                status.label()
                            );
                        }
                    }
                }
                Some(ControllerEvent::Progress { .. }) => {}
                Some(ControllerEvent::RunFinished) | None => break,
            },
            res = &mut ctrl_c, if watch_signal => match res {
                Ok(()) => {
                    interrupted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(event = "signal_unavailable", error = %e);
                    watch_signal = false;
                }
            },
        }
    }

    if interrupted {
        eprintln!("interrupted: aborting run");
        let left = ctl.shutdown(SHUTDOWN_GRACE).await;
        if left > 0 {
            eprintln!("warning: {} test(s) still running at exit", left);
        }
    }

    let report = RunReport::from_controller(
        &ctl,
        &args.scope,
        &args.scope_version,
        args.input.clone(),
        started_at,
        interrupted,
    );

    if json_out {
        println!("{}", json::to_json(&report)?);
    } else {
        console::print_summary(&report, args.show_errors, args.max_lines);
    }
    if let Some(path) = &args.out {
        json::write_report(&report, path)?;
        eprintln!("wrote {}", path.display());
    }
    if let Some(dir) = &args.export_errors {
        let written = errors::export_run_errors(&report, dir)?;
        eprintln!("exported {} error file(s) to {}", written.len(), dir.display());
    }

    Ok(exit_code(&report, args.strict))
}

fn exit_code(report: &RunReport, strict: bool) -> i32 {
    let failed = report.aborted
        || report.cells.iter().any(|c| match c.status {
            TestStatus::Error | TestStatus::Pending => true,
            TestStatus::Warning => strict,
            TestStatus::Ok => false,
        });
    if failed {
        exit_codes::TEST_FAILED
    } else {
        exit_codes::OK
    }
}
