//! golite command-line runner.
//!
//! Commands:
//! - `golite run <program.json>` - Run a program given as a JSON syntax tree
//! - `golite config` - Print the effective engine configuration

use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use golite_ast::Node;
use golite_vm::{run_program, EngineConfig, HostContext};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod output;

#[derive(Parser)]
#[command(name = "golite")]
#[command(about = "golite program runner", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Heap size in words, overriding the configuration file
    #[arg(long, global = true)]
    heap_words: Option<usize>,

    /// Scheduler seed, overriding the configuration file
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program
    Run {
        /// Syntax tree of the program, as JSON
        program: PathBuf,

        /// Print the result tag after the program output
        #[arg(long)]
        tag: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = load_config(&cli).and_then(|config| match &cli.command {
        Commands::Run { program, tag } => cmd_run(program, &config, *tag),
        Commands::Config => cmd_config(&config),
    });

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(2);
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(words) = cli.heap_words {
        config.heap_words = words;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate()?;
    Ok(config)
}

fn load_program(path: &Path) -> Result<Rc<Node>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let node: Node =
        serde_json::from_str(&text).with_context(|| format!("parsing syntax tree {}", path.display()))?;
    Ok(Rc::new(node))
}

/// Run a program. Returns whether it finished without diagnostics.
fn cmd_run(path: &Path, config: &EngineConfig, tag: bool) -> Result<bool> {
    let program = load_program(path)?;
    debug!(path = %path.display(), heap_words = config.heap_words, "loaded program");
    let mut host = HostContext::new();
    let outcome = run_program(&program, config, &mut host);
    for diagnostic in &host.errors {
        eprintln!("{}", diagnostic);
    }
    if tag {
        println!("{}", output::result_tag(outcome, &host.errors));
    }
    Ok(host.errors.is_empty())
}

fn cmd_config(config: &EngineConfig) -> Result<bool> {
    print!("{}", toml::to_string(config).context("serializing configuration")?);
    Ok(true)
}
