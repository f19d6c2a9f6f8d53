mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use formulary::catalog::Catalog;
use formulary::config::Config;
use formulary::error::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "formulary")]
#[command(author, version, about = "Install vendor toolkits and source builds from formula records", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install prefix (defaults to FORMULARY_PREFIX, then HOMEBREW_PREFIX)
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,

    /// Target architecture (x86_64 or arm64) instead of the host's
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a formula
    Info {
        /// Formula name
        formula: String,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the artifact a formula resolves to for an architecture
    Resolve {
        /// Formula name
        formula: String,

        /// Resolve every declared architecture
        #[arg(long)]
        all: bool,
    },

    /// Download and verify artifacts without installing
    Fetch {
        /// Formula names
        formulae: Vec<String>,

        /// Fetch the source artifact even when a bottle exists
        #[arg(short = 's', long)]
        build_from_source: bool,
    },

    /// Install a formula
    Install {
        /// Formula name
        formula: String,

        /// Enable a build option (e.g. --with docs)
        #[arg(long = "with", value_name = "OPTION")]
        with: Vec<String>,

        /// Use a local artifact instead of downloading it (still verified)
        #[arg(long, value_name = "PATH")]
        artifact: Option<PathBuf>,

        /// Build from source even when a bottle exists
        #[arg(short = 's', long)]
        build_from_source: bool,

        /// Run the formula's tests after installing
        #[arg(long)]
        test: bool,

        /// Reinstall if this version is already installed
        #[arg(short, long)]
        force: bool,
    },

    /// Run a formula's tests against its installed keg
    Test {
        /// Formula name
        formula: String,
    },

    /// Uninstall formulae
    Uninstall {
        /// Formula names
        formulae: Vec<String>,
    },

    /// List installed formulae
    List {
        /// Show all installed versions
        #[arg(long)]
        versions: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show caveats for a formula
    Caveats {
        /// Formula name
        formula: String,
    },

    /// Check upstream for newer versions
    Livecheck {
        /// Formula names (all with a livecheck if empty)
        formulae: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    formulary::colors::init_colors();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        commands::completions(shell);
        return Ok(());
    }

    let config = Config::from_env(cli.prefix, cli.arch)?;
    let catalog = Catalog::load(&config)?;

    match cli.command {
        Commands::Info { formula, json } => commands::info(&config, &catalog, &formula, json),
        Commands::Resolve { formula, all } => commands::resolve(&config, &catalog, &formula, all),
        Commands::Fetch {
            formulae,
            build_from_source,
        } => commands::fetch(&config, &catalog, &formulae, build_from_source).await,
        Commands::Install {
            formula,
            with,
            artifact,
            build_from_source,
            test,
            force,
        } => {
            let options = commands::InstallOptions {
                with,
                artifact,
                build_from_source,
                test,
                force,
            };
            commands::install(&config, &catalog, &formula, options).await
        }
        Commands::Test { formula } => commands::test(&config, &catalog, &formula),
        Commands::Uninstall { formulae } => commands::uninstall(&config, &formulae),
        Commands::List { versions, json } => commands::list(&config, versions, json),
        Commands::Caveats { formula } => commands::caveats(&config, &catalog, &formula),
        Commands::Livecheck { formulae, json } => {
            commands::livecheck(&config, &catalog, &formulae, json).await
        }
        Commands::Config => commands::config(&config, &catalog),
        Commands::Completions { .. } => Ok(()),
    }
}
