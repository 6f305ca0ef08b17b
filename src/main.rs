// Copyright 2026 Folio Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod chat;
mod cli;
mod config;
mod extract;
mod filter;
mod intent;
mod model;
mod oracle;
mod output;
mod sanitize;
mod sql;
mod store;
mod summarize;
mod transfer;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use anyhow::Result;
use clap::Parser;
use serde_json::json;

use crate::chat::ChatOptions;
use crate::chat::ChatPipeline;
use crate::cli::BooksArgs;
use crate::cli::Cli;
use crate::cli::Commands;
use crate::config::ConfigCtx;
use crate::filter::Filter;
use crate::oracle::LazyOracle;
use crate::output::JsonResponse;
use crate::output::QueryOut;
use crate::output::StatsOut;
use crate::output::print_books;
use crate::output::print_json;
use crate::store::BookSearchStore;
use crate::store::Store;
use crate::store::StoreMode;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init { path } => cmd_init(path),
        Commands::Import(args) => handle_result(cmd_import(args.path, args.json), args.json),
        Commands::Export(args) => handle_result(cmd_export(args.out, args.json), args.json),
        Commands::Books(args) => {
            let json = args.json;
            handle_result(cmd_books(args), json)
        }
        Commands::Chat(args) => handle_result(cmd_chat(args.query, args.json), args.json),
        Commands::Stats { json } => handle_result(cmd_stats(json), json),
        Commands::Doctor { json } => handle_result(cmd_doctor(json), json),
    }
}

fn handle_result(result: Result<()>, json: bool) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if json {
                let resp = JsonResponse::error("error", &err.to_string());
                print_json(&resp)?;
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn cmd_init(path: Option<PathBuf>) -> Result<()> {
    let root = path.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&root).with_context(|| format!("create dir {root:?}"))?;

    let config = config::load_global_config()?;
    let store_path = if config.store_path.is_absolute() {
        config.store_path.clone()
    } else {
        root.join(&config.store_path)
    };
    Store::init(&store_path)?;

    println!("Initialized folio store at {}", store_path.display());
    Ok(())
}

fn cmd_import(path: PathBuf, json: bool) -> Result<()> {
    let ctx = ConfigCtx::load_from_cwd()?;
    let start = Instant::now();
    let store = Store::open(&ctx.store_path(), StoreMode::ReadWrite)?;
    let file = std::fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let stats = transfer::import_store(&store, file)?;

    if json {
        let resp = JsonResponse::ok().with_stats(StatsOut {
            took_ms: start.elapsed().as_millis() as i64,
            transferred: Some(stats.books),
            catalog: Some(store.stats()?),
        });
        print_json(&resp)?;
    } else {
        println!("Imported {} books", stats.books);
    }
    Ok(())
}

fn cmd_export(out: Option<PathBuf>, json: bool) -> Result<()> {
    if json && out.is_none() {
        anyhow::bail!("--json requires --out for export");
    }
    let ctx = ConfigCtx::load_from_cwd()?;
    let start = Instant::now();
    let store = Store::open(&ctx.store_path(), StoreMode::ReadOnly)?;

    let stats = if let Some(path) = out {
        let file =
            std::fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
        transfer::export_store(&store, std::io::BufWriter::new(file))?
    } else {
        let stdout = std::io::stdout();
        let handle = stdout.lock();
        transfer::export_store(&store, handle)?
    };

    if json {
        let resp = JsonResponse::ok().with_stats(StatsOut {
            took_ms: start.elapsed().as_millis() as i64,
            transferred: Some(stats.books),
            catalog: None,
        });
        print_json(&resp)?;
    }
    Ok(())
}

/// Trimmed, non-blank entries; blank query parameters count as absent.
fn present(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn cmd_books(args: BooksArgs) -> Result<()> {
    let ctx = ConfigCtx::load_from_cwd()?;
    let max_limit = ctx.config.max_limit;
    let limit = args.limit.unwrap_or(ctx.config.default_limit);
    if limit == 0 || limit > max_limit {
        anyhow::bail!("limit must be between 1 and {max_limit}, got {limit}");
    }
    if i64::try_from(args.skip).is_err() {
        anyhow::bail!("skip must be at most {}, got {}", i64::MAX, args.skip);
    }

    let filter = Filter {
        author: present(args.author),
        title: present(args.title),
        language: present(args.language)
            .into_iter()
            .map(|code| code.to_lowercase())
            .collect(),
        topic: present(args.topic),
        mime_type: args
            .mime_type
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        ids: args.ids,
        sort: None,
        limit: None,
    };

    let start = Instant::now();
    let store = Store::open(&ctx.store_path(), StoreMode::ReadOnly)?;
    let page = store.query(&filter, args.skip, limit)?;

    if args.json {
        let resp = JsonResponse::ok()
            .with_query(QueryOut {
                text: None,
                strategy: None,
                skip: args.skip,
                limit,
            })
            .with_filters(filter.to_json())
            .with_page(page.total, page.books, args.skip)
            .with_stats(StatsOut {
                took_ms: start.elapsed().as_millis() as i64,
                ..Default::default()
            });
        print_json(&resp)?;
    } else {
        print_books(page.total, &page.books);
    }
    Ok(())
}

fn cmd_chat(query: String, json: bool) -> Result<()> {
    let ctx = ConfigCtx::load_from_cwd()?;
    let start = Instant::now();
    let store = Store::open(&ctx.store_path(), StoreMode::ReadOnly)?;
    let oracle = LazyOracle::from_config(&ctx.config.oracle);
    let pipeline = ChatPipeline::new(&oracle, ChatOptions::from_config(&ctx.config));
    let resp = pipeline.run(&store, &query)?;

    if json {
        let out = JsonResponse::ok()
            .with_query(QueryOut {
                text: Some(query),
                strategy: Some(resp.strategy.to_string()),
                skip: 0,
                limit: resp.limit,
            })
            .with_filters(resp.filters.to_json())
            .with_page(resp.count, resp.results, 0)
            .with_summary(resp.summary)
            .with_warnings(resp.warnings)
            .with_stats(StatsOut {
                took_ms: start.elapsed().as_millis() as i64,
                ..Default::default()
            });
        print_json(&out)?;
    } else {
        println!("{}", resp.summary);
        println!("filters: {}", resp.filters.to_json());
        print_books(resp.count, &resp.results);
        for warn in resp.warnings {
            eprintln!("warning: {warn}");
        }
    }
    Ok(())
}

fn cmd_stats(json: bool) -> Result<()> {
    let ctx = ConfigCtx::load_from_cwd()?;
    let store = Store::open(&ctx.store_path(), StoreMode::ReadOnly)?;
    let stats = store.stats()?;

    if json {
        let resp = JsonResponse::ok().with_stats(StatsOut {
            took_ms: 0,
            transferred: None,
            catalog: Some(stats),
        });
        print_json(&resp)?;
    } else {
        println!("Books: {}", stats.book_count);
        println!("Authors: {}", stats.author_count);
        println!("Subjects: {}", stats.subject_count);
        println!("Languages: {}", stats.language_count);
        println!("DB size: {} bytes", stats.db_size_bytes);
        if let Some(at) = &stats.imported_at {
            println!("Last import: {at}");
        }
        println!("Model: {}", ctx.config.oracle.model);
    }

    Ok(())
}

fn cmd_doctor(json: bool) -> Result<()> {
    let ctx = ConfigCtx::load_from_cwd()?;
    let store = Store::open(&ctx.store_path(), StoreMode::ReadOnly)?;
    let report = store.integrity_check()?;

    let oracle = LazyOracle::from_config(&ctx.config.oracle);
    let oracle_status = match oracle.handle() {
        Ok(_) => "ok".to_string(),
        Err(err) => err.to_string(),
    };
    let mut warnings = Vec::new();
    if report.status != "ok" {
        warnings.push(format!("integrity check reported: {}", report.status));
    }
    if oracle_status != "ok" {
        warnings.push("chat will run without filter extraction or summaries".to_string());
    }

    if json {
        let resp = JsonResponse::ok()
            .with_stats(StatsOut {
                took_ms: 0,
                transferred: None,
                catalog: Some(report.stats),
            })
            .with_diagnostics(json!({
                "integrity": report.status,
                "oracle": {
                    "backend": ctx.config.oracle.backend,
                    "model": ctx.config.oracle.model,
                    "status": oracle_status,
                    "connected": oracle.is_connected(),
                },
            }))
            .with_warnings(warnings);
        print_json(&resp)?;
    } else {
        println!("Integrity: {}", report.status);
        println!("Oracle: {oracle_status}");
        for warn in warnings {
            eprintln!("warning: {warn}");
        }
    }

    Ok(())
}
