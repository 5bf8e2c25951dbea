mod catalog;
mod config;
mod download;
mod episode;
mod history;
mod library;
mod media;
mod poster;
mod server;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::{Cli, Command, ServeArgs};

use self::catalog::{AllAnimeCatalog, Catalog, SearchResult};
use self::config::Settings;
use self::download::{AniCli, DownloadRoot, DownloadService};
use self::episode::TranslationMode;
use self::history::HistoryStore;
use self::library::LibraryIndexer;
use self::poster::PosterCache;
use self::server::AppState;

pub fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Command::Search { query, mode }) => run_search(&query, &mode),
        Some(Command::Serve(args)) => run_serve(&args),
        None => run_serve(&ServeArgs::default()),
    }
}

fn run_search(query: &str, mode: &str) -> Result<i32> {
    let mode = mode.parse::<TranslationMode>()?;
    match AllAnimeCatalog::default().search(query, mode) {
        Ok(results) => {
            for line in format_search_lines(&results) {
                println!("{line}");
            }
            Ok(0)
        }
        Err(err) => {
            println!("{err}");
            Ok(1)
        }
    }
}

fn format_search_lines(results: &[SearchResult]) -> Vec<String> {
    if results.is_empty() {
        return vec!["no results".to_string()];
    }
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "{:>2}. {} ({} episodes)",
                i + 1,
                result.title,
                result.episode_count
            )
        })
        .collect()
}

fn run_serve(args: &ServeArgs) -> Result<i32> {
    let settings = Settings::from_env(args)?;
    tracing::info!(
        download_dir = %settings.download_dir.display(),
        data_dir = %settings.data_dir.display(),
        downloader = %settings.downloader_bin.display(),
        "starting anishelf"
    );
    let state = build_state(&settings)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(server::serve(settings.bind, state))?;
    Ok(0)
}

fn build_state(settings: &Settings) -> Result<AppState> {
    let catalog = Arc::new(AllAnimeCatalog::default());
    let root = Arc::new(DownloadRoot::open(settings.download_dir.clone()).with_context(|| {
        format!(
            "unable to create download directory {}",
            settings.download_dir.display()
        )
    })?);
    let posters = Arc::new(
        PosterCache::open(settings.poster_dir.clone(), catalog.clone()).with_context(|| {
            format!(
                "unable to create poster directory {}",
                settings.poster_dir.display()
            )
        })?,
    );
    let history = Arc::new(HistoryStore::new(settings.history_path.clone()));
    let downloads = DownloadService::new(
        root.clone(),
        Arc::new(AniCli::new(settings.downloader_bin.clone())),
    );
    let library = Arc::new(LibraryIndexer::new(
        root,
        history.clone(),
        catalog.clone(),
        posters.clone(),
    ));

    Ok(AppState {
        downloads,
        history,
        library,
        catalog,
        posters,
    })
}
