use std::path::PathBuf;

use clap::Args;
use migr_core::config::MigrConfig;
use migr_core::models::target::ImportFile;
use migr_log::category::SUBMITTED_TARGETS_LOG;
use migr_sync::{run_import, ImportContext, ImportSummary};

#[derive(Args)]
pub struct ImportArgs {
    /// Import file: {"targets": [...]}
    #[arg(long)]
    file: PathBuf,
    /// Submitted-targets log of an earlier run; targets found there are skipped
    #[arg(long)]
    previous_log: Option<PathBuf>,
    /// Targets submitted per batch (1-20)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Directory for this run's logs (overrides config and MIGR_LOG_PATH)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

pub async fn run(args: ImportArgs) -> anyhow::Result<()> {
    let mut config = MigrConfig::load()?;
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    if let Some(dir) = args.log_dir {
        config.log_dir = Some(dir);
    }

    let input = ImportFile::load_from(&args.file)?;
    if input.targets.is_empty() {
        println!("No targets in {}", args.file.display());
        return Ok(());
    }

    let (api, log_dir) = super::api_client(&config)?;
    let mut ctx = ImportContext::from_config(api, &config);
    ctx.previous_log = args
        .previous_log
        .or_else(|| Some(log_dir.join(SUBMITTED_TARGETS_LOG)));
    ctx.cancel = super::cancel_on_ctrl_c();
    ctx.progress = Some(super::batch_progress());

    println!(
        "Importing {} targets from {} (concurrency {})",
        input.targets.len(),
        args.file.display(),
        config.effective_concurrency()
    );
    let summary = run_import(input.targets, &ctx).await?;
    print_summary(&summary, &log_dir);
    Ok(())
}

fn print_summary(summary: &ImportSummary, log_dir: &std::path::Path) {
    println!(
        "\nImport complete: {} submitted | {} failed to submit | {} polls failed",
        summary.submitted, summary.failed_targets, summary.failed_polls
    );
    println!(
        "Projects: {} imported | {} failed",
        summary.succeeded_projects, summary.failed_projects
    );
    if summary.cancelled {
        println!("Run interrupted; re-run with the same log directory to continue.");
    }
    println!("{}", summary.summary_line(log_dir));
}
