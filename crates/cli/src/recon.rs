//! `idrecon run` / `idrecon offline` / `idrecon config check`.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use idrecon_config::{ConfigError, Settings};
use idrecon_io::{json, write_reports, ReportOptions};
use idrecon_recon::{EmailTieBreak, ReconResult};

use crate::exit_codes::{
    pipeline_exit_code, EXIT_CONFIG, EXIT_CONNECTIVITY, EXIT_ERROR, EXIT_REPORT_PARTIAL, EXIT_USAGE,
};
use crate::pipeline::{reconcile, with_deadline, PipelineError};
use crate::sources::{CsvPaths, CsvSources, PgSources};
use crate::summary;
use crate::tunnel::Tunnel;
use crate::CliError;

/// Report flags shared by `run` and `offline`.
#[derive(Args, Debug, Clone, Default)]
pub struct ReportArgs {
    /// Directory for the CSV reports and the workbook
    #[arg(long, value_name = "DIR", env = "IDRECON_OUTPUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// Print the JSON summary to stdout
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON summary to a file
    #[arg(long, value_name = "PATH")]
    pub summary_out: Option<PathBuf>,

    /// Render tax IDs as 000.000.000-00 / 00.000.000/0000-00 in reports
    #[arg(long)]
    pub mask_tax_ids: bool,

    /// Suppress progress lines
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

fn config_err(e: ConfigError) -> CliError {
    let hint = match e {
        ConfigError::Missing(_) => {
            Some("set them in the --config file or via DB_GESTAO_*, DB_CONTRATO_*, DB_PESSOA_*, DB_ACCOUNTS_*".into())
        }
        _ => None,
    };
    CliError { code: EXIT_CONFIG, message: e.to_string(), hint }
}

fn pipeline_err(e: PipelineError) -> CliError {
    let hint = match e {
        PipelineError::OverallTimeout(_) => Some("raise timeouts.overall_secs (IDRECON_OVERALL_TIMEOUT_SECS)".into()),
        _ => None,
    };
    CliError { code: pipeline_exit_code(&e), message: e.to_string(), hint }
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError { code: EXIT_ERROR, message: format!("cannot start async runtime: {e}"), hint: None })
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(config: Option<PathBuf>, no_tunnel: bool, report: ReportArgs) -> Result<(), CliError> {
    let mut settings = Settings::load(config.as_deref()).map_err(config_err)?;

    // Held until the end of the command; dropping it stops ssh
    let mut _tunnel = None;
    if let Some(tunnel_config) = settings.tunnel.clone().filter(|_| !no_tunnel) {
        if !report.quiet {
            eprintln!("opening tunnel via {}", tunnel_config.destination());
        }
        let tunnel = Tunnel::open(&tunnel_config, &settings.store_targets()).map_err(|e| CliError {
            code: EXIT_CONNECTIVITY,
            message: e.to_string(),
            hint: Some("check the [tunnel] settings, or pass --no-tunnel".into()),
        })?;
        settings = settings.rerouted(|host, port| tunnel.route(host, port));
        _tunnel = Some(tunnel);
    }

    let result = runtime()?
        .block_on(with_deadline(settings.timeouts.overall(), read_live(&settings, report.quiet)))
        .map_err(pipeline_err)?;

    let out_dir = report.out_dir.clone().unwrap_or_else(|| settings.output.dir.clone());
    let options = ReportOptions { mask_tax_ids: report.mask_tax_ids || settings.output.mask_tax_ids };
    finish(result, &out_dir, &options, &report)
}

async fn read_live(settings: &Settings, quiet: bool) -> Result<Option<ReconResult>, PipelineError> {
    let sources = PgSources::connect(settings).await?;
    let result = reconcile(&sources, settings.email_tie_break, quiet).await;
    sources.close().await;
    result
}

// ============================================================================
// offline
// ============================================================================

pub fn cmd_offline(paths: CsvPaths, tie_break: EmailTieBreak, report: ReportArgs) -> Result<(), CliError> {
    for path in [&paths.divergences, &paths.insured, &paths.contacts] {
        if !path.is_file() {
            return Err(CliError {
                code: EXIT_USAGE,
                message: format!("input file not found: {}", path.display()),
                hint: None,
            });
        }
    }

    let sources = CsvSources::new(paths);
    let result = runtime()?
        .block_on(reconcile(&sources, tie_break, report.quiet))
        .map_err(pipeline_err)?;

    let out_dir = report.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let options = ReportOptions { mask_tax_ids: report.mask_tax_ids };
    finish(result, &out_dir, &options, &report)
}

// ============================================================================
// Shared tail: reports, summaries, exit status
// ============================================================================

fn finish(
    result: Option<ReconResult>,
    out_dir: &Path,
    options: &ReportOptions,
    report: &ReportArgs,
) -> Result<(), CliError> {
    let Some(result) = result else {
        eprintln!("no divergences found");
        return Ok(());
    };

    let mut outcome = write_reports(out_dir, &result, options);

    if let Some(ref path) = report.summary_out {
        match json::export_summary(path, &result) {
            Ok(()) => outcome.written.push(path.clone()),
            Err(e) => outcome.failures.push(e),
        }
    }

    if !report.quiet {
        eprint!("{}", summary::render_outcome(&outcome));
    }
    eprint!("{}", summary::render(&result.summary));

    if report.json {
        let json_str = json::summary_string(&result).map_err(|e| CliError {
            code: EXIT_ERROR,
            message: format!("JSON serialization error: {e}"),
            hint: None,
        })?;
        println!("{json_str}");
    }

    if !outcome.is_complete() {
        let attempted = outcome.written.len() + outcome.failures.len();
        return Err(CliError {
            code: EXIT_REPORT_PARTIAL,
            message: format!("{} of {} report file(s) could not be written", outcome.failures.len(), attempted),
            hint: Some(format!("check that {} is writable", out_dir.display())),
        });
    }

    info!(files = outcome.written.len(), "reports complete");
    Ok(())
}

// ============================================================================
// config check
// ============================================================================

pub fn cmd_config_check(config: Option<PathBuf>) -> Result<(), CliError> {
    let settings = Settings::load(config.as_deref()).map_err(config_err)?;
    print!("{}", describe_settings(&settings));
    Ok(())
}

/// Connection targets and run parameters, passwords never included.
fn describe_settings(settings: &Settings) -> String {
    let mut lines = vec![
        format!("management: {}", settings.management.describe()),
        format!("contract:   {}", settings.contract.describe()),
        format!("person:     {}", settings.person.describe()),
        format!("accounts:   {}", settings.accounts.describe()),
    ];
    match settings.tunnel {
        Some(ref tunnel) => {
            lines.push(format!("tunnel:     {} (port {})", tunnel.destination(), tunnel.ssh_port));
            for forward in crate::tunnel::plan(tunnel, &settings.store_targets()) {
                lines.push(format!(
                    "            127.0.0.1:{} -> {}:{}",
                    forward.local_port, forward.remote_host, forward.remote_port
                ));
            }
        }
        None => lines.push("tunnel:     none".to_string()),
    }
    lines.push(format!("output:     {}", settings.output.dir.display()));
    lines.push(format!("email tie-break: {}", settings.email_tie_break));
    let t = &settings.timeouts;
    lines.push(format!(
        "timeouts:   connect {}s, query {}s, overall {}s",
        t.connect_secs, t.query_secs, t.overall_secs
    ));
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
