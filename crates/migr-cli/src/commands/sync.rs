use std::path::PathBuf;

use clap::Args;
use comfy_table::{Cell, Color, Table};
use migr_core::config::MigrConfig;
use migr_core::models::source::SourceType;
use migr_core::models::sync_state::SyncStatus;
use migr_discover::manifests::{parse_glob_list, types_for_entitlements};
use migr_discover::CloneSettings;
use migr_sync::{sync_org, BatchScheduler, SyncOutcome, SyncRunSummary, SyncSettings};

#[derive(Args)]
pub struct SyncArgs {
    /// Org whose monitored projects are synced
    #[arg(long)]
    org_id: String,
    /// Integration new manifests are imported through
    #[arg(long)]
    integration_id: String,
    /// Source type of the projects (github, github-enterprise, gitlab, ...)
    #[arg(long)]
    source: SourceType,
    /// Only sync repositories under this owner or group
    #[arg(long)]
    namespace: Option<String>,
    /// Report what would change without changing anything
    #[arg(long)]
    dry_run: bool,
    /// Extra comma-separated exclusion globs
    #[arg(long)]
    exclusion_globs: Option<String>,
    /// Comma-separated entitlements (openSource, infrastructureAsCode)
    #[arg(long)]
    entitlements: Option<String>,
    /// List files from shallow clones in this directory instead of the host API
    #[arg(long)]
    clone_dir: Option<PathBuf>,
    /// Host API URL, required for self-hosted sources
    #[arg(long)]
    host_url: Option<url::Url>,
    /// Repositories synced per batch (1-20)
    #[arg(long)]
    concurrency: Option<usize>,
}

pub async fn run(args: SyncArgs) -> anyhow::Result<()> {
    let mut config = MigrConfig::load()?;
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }

    let entitlements = match &args.entitlements {
        Some(raw) => parse_glob_list(raw),
        None => config.entitlements.clone(),
    };
    let allowed_types = types_for_entitlements(&entitlements);
    if allowed_types.is_empty() {
        anyhow::bail!("no project types enabled by entitlements {entitlements:?}");
    }

    let mut exclusion_globs = config.exclusion_globs.clone();
    if let Some(raw) = &args.exclusion_globs {
        exclusion_globs.extend(parse_glob_list(raw));
    }

    let host_token = super::host_token(args.source)?;
    let provider = migr_host::create_provider(args.source, args.host_url.as_ref(), &host_token)?;
    let clone = match args.clone_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Some(CloneSettings {
                dir,
                token: host_token.clone(),
            })
        }
        None => None,
    };

    let settings = SyncSettings {
        org_id: args.org_id,
        integration_id: args.integration_id,
        source: args.source,
        namespace: args.namespace,
        dry_run: args.dry_run,
        allowed_types,
        exclusion_globs,
        clone,
    };

    let (api, log_dir) = super::api_client(&config)?;
    let scheduler = BatchScheduler::new(config.effective_concurrency())
        .with_cancel(super::cancel_on_ctrl_c())
        .with_progress(super::batch_progress());

    println!(
        "Syncing {} projects of org {}{}",
        settings.source,
        settings.org_id,
        if settings.dry_run { " (dry run)" } else { "" }
    );
    let summary = sync_org(&api, provider.as_ref(), &settings, &scheduler).await?;

    print_summary(&summary);
    println!("See logs at {}", log_dir.display());
    Ok(())
}

fn branch_cell(outcome: &SyncOutcome) -> String {
    match outcome.branch_updates.iter().find(|u| u.updated) {
        Some(update) => format!(
            "{} -> {}",
            update.from.as_deref().unwrap_or("?"),
            update.to
        ),
        None => "—".to_string(),
    }
}

fn print_summary(summary: &SyncRunSummary) {
    if summary.outcomes.is_empty() && summary.failed == 0 {
        println!("No repositories to sync.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["REPO", "BRANCH", "IMPORTED", "DEACTIVATED", "STATUS"]);

    let mut changed = 0usize;
    for outcome in &summary.outcomes {
        let (status_str, status_color) = match outcome.record.status {
            SyncStatus::Success => ("synced", Color::Green),
            SyncStatus::PartialSuccess => ("partial", Color::Yellow),
            SyncStatus::Failed => ("failed", Color::Red),
            SyncStatus::Skipped => ("unchanged", Color::White),
        };
        if !outcome.imported.is_empty()
            || !outcome.deactivated.is_empty()
            || outcome.branches_updated() > 0
        {
            changed += 1;
        }

        table.add_row(vec![
            Cell::new(&outcome.target),
            Cell::new(branch_cell(outcome)),
            Cell::new(outcome.imported.len().to_string()),
            Cell::new(outcome.deactivated.len().to_string()),
            Cell::new(status_str).fg(status_color),
        ]);
    }

    println!("{table}");
    println!(
        "Summary: {} repos | {} changed | {} failed{}",
        summary.total,
        changed,
        summary.failed,
        if summary.cancelled { " | interrupted" } else { "" }
    );

    for outcome in &summary.outcomes {
        if !outcome.record.errors.is_empty() {
            println!("\nErrors for {}:", outcome.target);
            for err in &outcome.record.errors {
                println!("  {err}");
            }
        }
    }
}
