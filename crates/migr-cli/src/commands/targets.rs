use std::path::PathBuf;

use clap::Subcommand;
use migr_core::models::source::SourceType;
use migr_core::models::target::{ImportFile, ImportTarget};
use migr_host::RemoteRepo;

#[derive(Subcommand)]
pub enum TargetsAction {
    /// List a namespace's repositories and write them as an import file
    Generate {
        /// Source type of the host
        #[arg(long)]
        source: SourceType,
        /// Owner, org or group to list
        #[arg(long)]
        namespace: String,
        /// Org the targets are imported into
        #[arg(long)]
        org_id: String,
        /// Integration the targets are imported through
        #[arg(long)]
        integration_id: String,
        /// Output file
        #[arg(long)]
        out: PathBuf,
        /// Leave forks out
        #[arg(long)]
        skip_forks: bool,
        /// Host API URL, required for self-hosted sources
        #[arg(long)]
        host_url: Option<url::Url>,
    },
}

pub async fn run(action: TargetsAction) -> anyhow::Result<()> {
    match action {
        TargetsAction::Generate {
            source,
            namespace,
            org_id,
            integration_id,
            out,
            skip_forks,
            host_url,
        } => {
            let token = super::host_token(source)?;
            let provider = migr_host::create_provider(source, host_url.as_ref(), &token)?;
            let repos = provider.list_repos(&namespace).await?;
            tracing::info!(namespace = %namespace, repos = repos.len(), "listed repositories");

            let file = build_import_file(&repos, source, &org_id, &integration_id, skip_forks)?;
            file.save_to(&out)?;
            println!(
                "Wrote {} targets ({} repositories listed) to {}",
                file.targets.len(),
                repos.len(),
                out.display()
            );
            Ok(())
        }
    }
}

/// One import target per live repository. Archived repos are left out.
pub fn build_import_file(
    repos: &[RemoteRepo],
    source: SourceType,
    org_id: &str,
    integration_id: &str,
    skip_forks: bool,
) -> anyhow::Result<ImportFile> {
    let mut targets = Vec::with_capacity(repos.len());
    for repo in repos {
        if repo.is_archived || (skip_forks && repo.is_fork) {
            continue;
        }
        let target = repo.to_target(source)?;
        targets.push(ImportTarget::new(org_id, integration_id, target));
    }
    Ok(ImportFile { targets })
}
