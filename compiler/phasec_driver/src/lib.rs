use clap::Parser;
use colored::Colorize;
use manifest::Manifest;
use phasec_resolve::{LazyResolverRegistry, RecordingCollector, ResolveSession};
use phasec_tree::{ResolvePhase, pretty::TreePrinter};
use std::{path::PathBuf, process::exit, sync::Arc};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod manifest;
mod report;
mod resolve;

pub use config::Config;
pub use error::{DriverError, DriverResult};

#[derive(Parser, Clone, Debug)]
#[command(name = "phasec", about = "Resolve a declaration tree lazily, phase by phase")]
pub struct CommandLineArguments {
    /// Declaration tree manifest (TOML)
    pub manifest: PathBuf,
    /// Phase every target is brought to
    #[arg(long, default_value = "body-resolve")]
    pub phase: ResolvePhase,
    /// Qualified name of a declaration to resolve; every declaration when absent
    #[arg(long = "target")]
    pub targets: Vec<String>,
    /// Worker threads resolving targets concurrently
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Check every phase after it ran
    #[arg(long, conflicts_with = "no_verify")]
    pub verify: bool,
    #[arg(long = "no-verify", conflicts_with = "verify")]
    pub no_verify: bool,
    /// Record the scopes seen while resolving
    #[arg(long = "collect-context")]
    pub collect_context: bool,
    /// Print the resolved tree
    #[arg(long)]
    pub dump: bool,
    #[arg(short, long)]
    pub verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "phasec=debug" } else { "phasec=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn run() {
    let arguments = CommandLineArguments::parse();
    init_logging(arguments.verbose);
    match execute(&arguments) {
        Ok(()) => exit(0),
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            exit(1)
        }
    }
}

pub fn execute(arguments: &CommandLineArguments) -> DriverResult<()> {
    let manifest = Manifest::parse(&arguments.manifest)?;
    let config = Config::new(arguments, manifest.session.clone());
    let tree = Arc::new(manifest.build()?);
    tracing::info!(nodes = tree.len(), files = tree.files().len(), "loaded {}", arguments.manifest.display());

    let targets = resolve::targets(&tree, &config.targets)?;
    let mut session = ResolveSession::new(tree, LazyResolverRegistry::standard(), config.session.clone());
    let collector = config.session.collect_context.then(|| Arc::new(RecordingCollector::new()));
    if let Some(collector) = &collector {
        session = session.with_collector(collector.clone());
    }

    let outcome = resolve::resolve_targets(&session, &targets, config.phase, config.threads);
    if let Some(collector) = &collector {
        tracing::info!(snapshots = collector.len(), "collected resolution context");
    }
    if outcome.retried > 0 {
        tracing::info!(retried = outcome.retried, "targets retried after cross-thread cycles");
    }

    if config.dump {
        print!("{}", TreePrinter::new(session.tree()).print());
    }
    let report = report::Report::new(session.tree(), config.phase, &outcome);
    print!("{}", report.render());

    if outcome.failures.is_empty() {
        Ok(())
    } else {
        Err(DriverError::Unresolved {
            failed: outcome.failures.len(),
            total: targets.len(),
        })
    }
}

/// Resolves an in-memory manifest and returns the rendered report.
pub fn check_manifest(content: &str, phase: ResolvePhase, threads: usize) -> DriverResult<String> {
    let manifest = Manifest::from_toml(content).map_err(|source| DriverError::Parse {
        path: PathBuf::from("<memory>"),
        source,
    })?;
    let tree = Arc::new(manifest.build()?);
    let targets = resolve::targets(&tree, &[])?;
    let session = ResolveSession::new(tree, LazyResolverRegistry::standard(), manifest.session);
    let outcome = resolve::resolve_targets(&session, &targets, phase, threads);
    Ok(report::Report::new(session.tree(), phase, &outcome).render())
}
