use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

use commands::ReportFormat;

#[derive(Parser)]
#[command(
    name = "shipgate",
    about = "shipgate — ordered, health-gated service rollouts",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Rollout config file
    #[arg(short, long, global = true, default_value = "shipgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and pre-flight check the config, then print the bring-up order
    Validate,
    /// Print the bring-up order, one service per line
    Plan,
    /// Render env files, start every service in order, and wait for health.
    ///
    /// Exits 0 when every service is healthy, 1 when any is not, and 2 when
    /// the config is unusable. Ctrl-C cancels the remaining services.
    Rollout {
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
        /// Do not write [[env_file]] entries before starting services
        #[arg(long)]
        skip_env_files: bool,
    },
    /// Probe every service once, without starting anything
    Status {
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Write the [[env_file]] entries and exit
    Render {
        /// Directory to write into (default: the config file's directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shipgate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate => commands::validate::validate(&cli.config),
        Commands::Plan => commands::plan::plan(&cli.config),
        Commands::Rollout {
            format,
            skip_env_files,
        } => commands::rollout::rollout(&cli.config, format, skip_env_files).await,
        Commands::Status { format } => commands::status::status(&cli.config, format).await,
        Commands::Render { out_dir } => commands::render::render(&cli.config, out_dir.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(commands::exit_code_for(&e))
        }
    }
}
