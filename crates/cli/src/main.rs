mod config;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use livediff_core::{RowKind, TreeModel};
use livediff_view::{
    git_diff_plain_spec, git_diff_spec, git_log_plain_spec, git_log_spec, CommandSpec,
    MemorySink, PanelRegistry, RawCommandView, Sink, SinkFactory, StdoutSink, TreeCommandView,
};
use serde::Serialize;
use tracing::error;

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "livediff",
    about = "Live, collapsible tree views over long-running git diff/log output"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a worktree or index diff as a collapsible tree
    Diff {
        /// Diff the index instead of the worktree
        #[arg(long)]
        cached: bool,

        /// Stream the raw diff lines instead of the tree
        #[arg(long)]
        raw: bool,

        /// Print the final flattened structure as JSON
        #[arg(long)]
        json: bool,

        /// Extra arguments passed through to git
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        extra: Vec<String>,
    },

    /// Stream `git log`, one tree per commit parent
    Log {
        /// Stream the raw log lines instead of the trees
        #[arg(long)]
        raw: bool,

        /// Print the final flattened structures as JSON
        #[arg(long)]
        json: bool,

        /// Extra arguments passed through to git
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        extra: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("config error: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Diff {
            cached,
            raw,
            json,
            extra,
        } => run_diff(cfg, cached, raw, json, extra).await,
        Commands::Log { raw, json, extra } => run_log(cfg, raw, json, extra).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run_diff(
    cfg: Config,
    cached: bool,
    raw: bool,
    json: bool,
    extra: Vec<String>,
) -> Result<()> {
    let registry = Arc::new(PanelRegistry::new());
    if raw {
        let spec = git_diff_plain_spec(&cfg.git_binary, cached, &extra);
        return run_raw(&spec, &cfg, &registry).await;
    }
    let spec = git_diff_spec(&cfg.git_binary, cached, &extra, None);
    // A diff stream has a single implicit group, so live stdout output
    // stays ordered; snapshots are only needed for --json.
    run_tree(&spec, &cfg, &registry, json, !json).await
}

async fn run_log(cfg: Config, raw: bool, json: bool, extra: Vec<String>) -> Result<()> {
    let registry = Arc::new(PanelRegistry::new());
    if raw {
        let spec = git_log_plain_spec(&cfg.git_binary, &extra);
        return run_raw(&spec, &cfg, &registry).await;
    }
    let spec = git_log_spec(&cfg.git_binary, &extra);
    // Merge commits fan records out to several groups concurrently, which
    // would interleave on a terminal; collect panes and print at the end.
    run_tree(&spec, &cfg, &registry, json, false).await
}

async fn run_raw(spec: &CommandSpec, cfg: &Config, registry: &Arc<PanelRegistry>) -> Result<()> {
    let view = RawCommandView::open(
        spec,
        Box::new(StdoutSink::new()),
        Duration::from_millis(cfg.tick_interval_ms),
        registry,
    );
    while !view.lock().expect("view poisoned").is_done() {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let stream_error = view.lock().expect("view poisoned").stream_error();
    registry.cleanup_all().await;
    if let Some(stream_error) = stream_error {
        bail!("{} failed: {stream_error}", spec.command_line());
    }
    Ok(())
}

type PaneList = Arc<Mutex<Vec<(String, Arc<Mutex<MemorySink>>)>>>;

async fn run_tree(
    spec: &CommandSpec,
    cfg: &Config,
    registry: &Arc<PanelRegistry>,
    json: bool,
    live: bool,
) -> Result<()> {
    let panes: PaneList = Arc::new(Mutex::new(Vec::new()));
    let factory: SinkFactory = if live {
        Box::new(|_parent: &str| Box::new(StdoutSink::new()) as Box<dyn Sink>)
    } else {
        let panes = Arc::clone(&panes);
        Box::new(move |parent: &str| {
            let sink = Arc::new(Mutex::new(MemorySink::new()));
            panes
                .lock()
                .expect("pane list poisoned")
                .push((parent.to_string(), Arc::clone(&sink)));
            Box::new(sink) as Box<dyn Sink>
        })
    };

    let view = TreeCommandView::open(
        spec,
        factory,
        cfg.preopen_threshold,
        Duration::from_millis(cfg.tick_interval_ms),
        registry,
    );
    while !view.lock().expect("view poisoned").is_done() {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let stream_error = view.lock().expect("view poisoned").stream_error();
    if let Some(stream_error) = stream_error {
        registry.cleanup_all().await;
        bail!("{} failed: {stream_error}", spec.command_line());
    }

    if json {
        let model = view.lock().expect("view poisoned").model();
        let model = model.lock().expect("model poisoned");
        print_json(&model)?;
    } else if !live {
        let panes = panes.lock().expect("pane list poisoned");
        for (parent, sink) in panes.iter() {
            println!("# parent {parent}");
            for line in sink.lock().expect("pane sink poisoned").lines() {
                println!("{line}");
            }
            println!();
        }
    }

    registry.cleanup_all().await;
    Ok(())
}

#[derive(Serialize)]
struct RowSnapshot<'a> {
    level: usize,
    is_dir: bool,
    name: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<char>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stat: Option<&'a str>,
}

#[derive(Serialize)]
struct GroupSnapshot<'a> {
    parent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_stat: Option<&'a str>,
    rows: Vec<RowSnapshot<'a>>,
}

fn print_json(model: &TreeModel) -> Result<()> {
    let groups: Vec<GroupSnapshot> = model
        .groups()
        .iter()
        .map(|group| GroupSnapshot {
            parent: group.parent_key(),
            short_stat: group.short_stat(),
            rows: group
                .rows()
                .iter()
                .map(|row| {
                    let (is_dir, status) = match &row.kind {
                        RowKind::Dir(_) => (true, None),
                        RowKind::File(record) => (false, Some(record.status.letter())),
                    };
                    let stat = if is_dir {
                        None
                    } else {
                        group.stat_for(&row.path)
                    };
                    RowSnapshot {
                        level: row.level,
                        is_dir,
                        name: &row.name,
                        path: &row.path,
                        status,
                        stat,
                    }
                })
                .collect(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&groups)?);
    Ok(())
}
