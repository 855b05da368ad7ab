// idrecon - CPF/CNPJ divergence reconciliation between accounts and management

mod exit_codes;
mod pipeline;
mod recon;
mod sources;
mod summary;
mod tunnel;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::EXIT_SUCCESS;
use idrecon_recon::EmailTieBreak;
use recon::ReportArgs;
use sources::CsvPaths;

#[derive(Parser)]
#[command(name = "idrecon")]
#[command(about = "Classify tax-ID divergences between the accounts and management stores")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile against the live databases
    #[command(after_help = "\
Examples:
  idrecon run
  idrecon run --config idrecon.toml --out-dir reports/
  idrecon run --json --summary-out summary.json
  idrecon run --no-tunnel")]
    Run {
        /// TOML settings file (environment variables overlay it)
        #[arg(long, short = 'c', env = "IDRECON_CONFIG")]
        config: Option<PathBuf>,

        /// Connect directly even when [tunnel] is configured
        #[arg(long)]
        no_tunnel: bool,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Reconcile from CSV exports instead of the databases
    #[command(after_help = "\
Examples:
  idrecon offline --divergences div.csv --insured segurado.csv --contacts contato.csv
  idrecon offline --divergences div.csv --insured segurado.csv --contacts contato.csv \\
      --email-tie-break smallest --out-dir reports/")]
    Offline {
        /// Divergent pairs: account_id, management_id, tax_id_accounts, tax_id_management
        #[arg(long, value_name = "CSV")]
        divergences: PathBuf,

        /// Insured parties: cpf_cnpj
        #[arg(long, value_name = "CSV")]
        insured: PathBuf,

        /// Contact e-mails: cpf_cnpj, email
        #[arg(long, value_name = "CSV")]
        contacts: PathBuf,

        /// Which e-mail wins when a tax ID has several (last, smallest)
        #[arg(long, default_value = "last", env = "IDRECON_EMAIL_TIE_BREAK")]
        email_tie_break: EmailTieBreak,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Settings commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Load and validate settings, print the connection targets (no passwords)
    Check {
        #[arg(long, short = 'c', env = "IDRECON_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  idrecon-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    // A missing .env is the normal case
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, no_tunnel, report } => recon::cmd_run(config, no_tunnel, report),
        Commands::Offline { divergences, insured, contacts, email_tie_break, report } => recon::cmd_offline(
            CsvPaths { divergences, insured, contacts },
            email_tie_break,
            report,
        ),
        Commands::Config(ConfigCommands::Check { config }) => recon::cmd_config_check(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
