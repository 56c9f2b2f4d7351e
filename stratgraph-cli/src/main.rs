//! StratGraph CLI — manage stored strategy graphs from the terminal.
//!
//! Commands:
//! - `import` — import a `.json` / `.tls` / `.tlsu` file into a user's strategies
//! - `export` — write a stored strategy in one of the export formats
//! - `list` — list a user's strategies
//! - `lint` — report reachability and re-entry problems in a strategy file
//! - `preview` — print condition previews for each node of a strategy file
//! - `migrate` — migrate every stored strategy of a user in place

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use stratgraph_core::ast::{expression_to_string, group_condition_to_string, RenderContext};
use stratgraph_core::domain::StrategyId;
use stratgraph_core::graph::{Node, NodeData};
use stratgraph_core::lint::{lint, Severity};
use stratgraph_store::{
    export_document, import_strategy, prepare_import, resolve_conflict, ConflictChoice,
    ExportFormat, FileStore, ImportOutcome, LocalStrategyStore, Requester, StoreConfig,
    StrategyDocument, TransferError,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stratgraph",
    about = "StratGraph CLI — strategy graph storage and inspection"
)]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage directory. Overrides the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a strategy file.
    Import {
        file: PathBuf,

        /// Importing user.
        #[arg(long)]
        user: String,

        /// What to do when a strategy with the same name exists: replace, keep-both, cancel.
        #[arg(long)]
        on_conflict: Option<ConflictChoice>,
    },
    /// Export a stored strategy.
    Export {
        strategy_id: String,

        #[arg(long)]
        user: String,

        /// json, tls or tlsu.
        #[arg(long, default_value = "tls")]
        format: ExportFormat,

        /// Allow plain JSON export.
        #[arg(long, default_value_t = false)]
        privileged: bool,

        /// Output file. Defaults to `<strategy-id>.<format>`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List a user's strategies.
    List {
        #[arg(long)]
        user: String,
    },
    /// Report reachability and re-entry findings.
    Lint {
        file: PathBuf,

        /// User to open `.tlsu` files as.
        #[arg(long, default_value = "")]
        user: String,
    },
    /// Render condition previews.
    Preview {
        file: PathBuf,

        /// Only this node.
        #[arg(long)]
        node: Option<String>,

        /// User to open `.tlsu` files as.
        #[arg(long, default_value = "")]
        user: String,
    },
    /// Migrate all stored strategies of a user in place.
    Migrate {
        #[arg(long)]
        user: String,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    let data_dir = resolve_data_dir(cli.data_dir, &config);
    debug!(data_dir = %data_dir.display(), "using storage directory");

    match cli.command {
        Commands::Import {
            file,
            user,
            on_conflict,
        } => run_import(&data_dir, &file, &user, on_conflict),
        Commands::Export {
            strategy_id,
            user,
            format,
            privileged,
            out,
        } => run_export(&data_dir, &strategy_id, &user, format, privileged, out),
        Commands::List { user } => run_list(&data_dir, &user),
        Commands::Lint { file, user } => run_lint(&file, &user),
        Commands::Preview { file, node, user } => run_preview(&file, node.as_deref(), &user),
        Commands::Migrate { user } => run_migrate(&data_dir, &user),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// `--data-dir`, then `storage_dir` from config, then the platform data dir.
fn resolve_data_dir(flag: Option<PathBuf>, config: &StoreConfig) -> PathBuf {
    flag.or_else(|| config.storage_dir.clone())
        .or_else(|| dirs::data_dir().map(|d| d.join("stratgraph")))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn repository(data_dir: &Path) -> LocalStrategyStore<FileStore> {
    LocalStrategyStore::new(FileStore::new(data_dir))
}

fn user_facing(e: TransferError) -> anyhow::Error {
    let message = e.user_message();
    anyhow::Error::new(e).context(message)
}

fn run_import(
    data_dir: &Path,
    file: &Path,
    user: &str,
    on_conflict: Option<ConflictChoice>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let mut repo = repository(data_dir);

    let outcome = import_strategy(&mut repo, &text, user, Utc::now()).map_err(user_facing)?;
    let outcome = match outcome {
        ImportOutcome::NameConflict {
            candidate,
            existing,
        } => {
            let Some(choice) = on_conflict else {
                bail!(
                    "a strategy named \"{}\" already exists ({}); rerun with --on-conflict replace|keep-both|cancel",
                    existing.name,
                    existing.id
                );
            };
            resolve_conflict(&mut repo, user, *candidate, &existing, choice)
                .map_err(user_facing)?
        }
        other => other,
    };

    if let ImportOutcome::Imported(summary) = outcome {
        info!(strategy = %summary.id, "import complete");
        println!("Imported \"{}\" as {}", summary.name, summary.id);
    } else {
        println!("Import cancelled");
    }
    Ok(())
}

fn run_export(
    data_dir: &Path,
    strategy_id: &str,
    user: &str,
    format: ExportFormat,
    privileged: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut repo = repository(data_dir);
    let doc = repo
        .load(user, &StrategyId::new(strategy_id))
        .with_context(|| format!("loading strategy {strategy_id}"))?;

    let text = export_document(
        &doc,
        format,
        Requester {
            user_id: user,
            privileged,
        },
    )
    .map_err(user_facing)?;

    let out = out.unwrap_or_else(|| PathBuf::from(format!("{strategy_id}.{}", format.extension())));
    std::fs::write(&out, text).with_context(|| format!("writing {}", out.display()))?;
    println!("Exported \"{}\" to {}", doc.name, out.display());
    Ok(())
}

fn run_list(data_dir: &Path, user: &str) -> Result<()> {
    let strategies = repository(data_dir).list(user)?;
    if strategies.is_empty() {
        println!("No strategies for {user}");
        return Ok(());
    }
    println!("{:<38} {:<28} {:<20}", "ID", "Name", "Last modified");
    println!("{}", "-".repeat(88));
    for s in &strategies {
        println!(
            "{:<38} {:<28} {:<20}",
            s.id,
            s.name,
            s.last_modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("\n{} strategies", strategies.len());
    Ok(())
}

/// Read a strategy file the way an import would, without storing it.
fn read_strategy(file: &Path, user: &str) -> Result<StrategyDocument> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    prepare_import(&text, user, Utc::now()).map_err(user_facing)
}

fn run_lint(file: &Path, user: &str) -> Result<()> {
    let doc = read_strategy(file, user)?;
    let report = lint(&doc.nodes, &doc.edges, &doc.global_variables);
    if report.is_clean() {
        println!("{}: no findings", file.display());
        return Ok(());
    }
    for finding in &report.findings {
        let level = match finding.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!("{level}: {finding}");
    }
    let errors = report
        .findings
        .iter()
        .filter(|f| f.severity() == Severity::Error)
        .count();
    if errors > 0 {
        bail!("{}: {errors} lint error(s)", file.display());
    }
    Ok(())
}

fn run_preview(file: &Path, only: Option<&str>, user: &str) -> Result<()> {
    let doc = read_strategy(file, user)?;
    let ctx = doc
        .nodes
        .iter()
        .find_map(|n| match &n.data {
            NodeData::Start(start) => Some(RenderContext::from_start(start)),
            _ => None,
        })
        .unwrap_or_else(RenderContext::empty)
        .with_global_variables(&doc.global_variables);

    let nodes: Vec<&Node> = doc
        .nodes
        .iter()
        .filter(|n| only.map_or(true, |id| n.id.as_str() == id))
        .collect();
    if nodes.is_empty() {
        if let Some(id) = only {
            bail!("no node {id} in {}", file.display());
        }
    }

    for node in nodes {
        let label = if node.label().is_empty() {
            node.kind().display_name()
        } else {
            node.label()
        };
        println!("{} [{}] {}", node.id, node.kind(), label);
        if let Some(conditions) = node.data.conditions() {
            let rendered = group_condition_to_string(conditions, &ctx);
            if rendered.is_empty() {
                println!("  when: (always)");
            } else {
                println!("  when: {rendered}");
            }
        }
        for var in node.data.variables().into_iter().flatten() {
            println!("  let {} = {}", var.name, expression_to_string(&var.expression, &ctx));
        }
        for update in node.data.global_variable_updates().into_iter().flatten() {
            println!(
                "  set {} = {}",
                update.global_variable_name,
                expression_to_string(&update.expression, &ctx)
            );
        }
    }
    Ok(())
}

fn run_migrate(data_dir: &Path, user: &str) -> Result<()> {
    let mut repo = repository(data_dir);
    let migrated = repo.migrate_all(user)?;
    for id in &migrated {
        println!("migrated {id}");
    }
    println!("{} of {} strategies migrated", migrated.len(), repo.list(user)?.len());
    Ok(())
}
