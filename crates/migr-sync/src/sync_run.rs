use std::collections::{BTreeMap, HashSet};

use migr_api::{ApiClient, PendingJob};
use migr_core::error::MigrError;
use migr_core::models::job::PollingHandle;
use migr_core::models::project::SnykProject;
use migr_core::models::source::SourceType;
use migr_core::models::sync_state::SyncRecord;
use migr_core::models::target::{ImportFileRef, ImportTarget};
use migr_discover::reconcile::{diff, ReconciliationResult};
use migr_discover::CloneSettings;
use migr_host::{HostProvider, RemoteRepo};
use migr_log::ops::{self, UpdateAction};

use crate::branch::{update_branch_if_drifted, BranchUpdate};
use crate::engine::BatchScheduler;

/// Settings shared by every repository of one sync run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub org_id: String,
    pub integration_id: String,
    pub source: SourceType,
    /// Only sync repositories under this owner / group.
    pub namespace: Option<String>,
    pub dry_run: bool,
    pub allowed_types: Vec<&'static str>,
    pub exclusion_globs: Vec<String>,
    pub clone: Option<CloneSettings>,
}

/// What the host says about one repository.
#[derive(Debug, Clone)]
pub struct RepoState {
    pub full_name: String,
    /// `None` when the repository no longer exists.
    pub repo: Option<RemoteRepo>,
    /// Files on the default branch; empty for missing or archived repos.
    pub files: Vec<String>,
}

/// Everything one repository's sync did (or would do, in a dry run).
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub target: String,
    pub reconciliation: ReconciliationResult,
    pub branch_updates: Vec<BranchUpdate>,
    /// Ids of deactivated projects.
    pub deactivated: Vec<String>,
    /// Manifest paths imported.
    pub imported: Vec<String>,
    pub import_handle: Option<PollingHandle>,
    pub record: SyncRecord,
}

impl SyncOutcome {
    fn new(target: &str, settings: &SyncSettings) -> Self {
        Self {
            target: target.to_string(),
            reconciliation: ReconciliationResult::default(),
            branch_updates: Vec::new(),
            deactivated: Vec::new(),
            imported: Vec::new(),
            import_handle: None,
            record: SyncRecord::new(&settings.org_id, target, settings.dry_run),
        }
    }

    pub fn branches_updated(&self) -> usize {
        self.branch_updates.iter().filter(|u| u.updated).count()
    }
}

/// Totals of a sync run over an org.
#[derive(Debug)]
pub struct SyncRunSummary {
    pub outcomes: Vec<SyncOutcome>,
    pub total: usize,
    /// Repositories that could not be synced at all.
    pub failed: usize,
    pub cancelled: bool,
}

async fn deactivate(
    api: &ApiClient,
    settings: &SyncSettings,
    project: &SnykProject,
    outcome: &mut SyncOutcome,
) {
    let sink = api.sink();
    if !settings.dry_run {
        if let Err(e) = api.deactivate_project(&settings.org_id, &project.id).await {
            tracing::warn!(project = %project.name, "deactivation failed: {e}");
            ops::log_failed_update(
                sink.as_ref(),
                &settings.org_id,
                project,
                UpdateAction::Deactivate,
                &e,
            )
            .await;
            outcome
                .record
                .errors
                .push(format!("deactivate {}: {e}", project.id));
            return;
        }
    }
    ops::log_project_update(
        sink.as_ref(),
        &settings.org_id,
        project,
        UpdateAction::Deactivate,
        None,
        settings.dry_run,
    )
    .await;
    outcome.deactivated.push(project.id.clone());
    outcome.record.projects_deactivated += 1;
}

async fn import_manifests(
    api: &ApiClient,
    settings: &SyncSettings,
    repo: &RemoteRepo,
    paths: &[String],
    outcome: &mut SyncOutcome,
) {
    let sink = api.sink();
    for path in paths {
        ops::log_manifest_import(
            sink.as_ref(),
            &settings.org_id,
            &repo.full_name,
            path,
            settings.dry_run,
        )
        .await;
    }
    if settings.dry_run {
        outcome.imported = paths.to_vec();
        outcome.record.projects_imported += paths.len() as u32;
        return;
    }

    let target = match repo.to_target(settings.source) {
        Ok(target) => target,
        Err(e) => {
            outcome.record.errors.push(format!("import: {e}"));
            return;
        }
    };
    let mut request = ImportTarget::new(&settings.org_id, &settings.integration_id, target);
    request.files = Some(
        paths
            .iter()
            .map(|p| ImportFileRef { path: p.clone() })
            .collect(),
    );

    let handle = match api.submit_import(&request).await {
        Ok(handle) => handle,
        Err(e) => {
            outcome.record.errors.push(format!("import: {e}"));
            return;
        }
    };
    let report = api
        .poll_all(
            vec![PendingJob {
                org_id: settings.org_id.clone(),
                handle: handle.clone(),
            }],
            1,
        )
        .await;

    for failed in &report.outcome.failed {
        let reason = failed.user_message.as_deref().unwrap_or("import failed");
        outcome
            .record
            .errors
            .push(format!("import {}: {reason}", failed.target_file));
    }
    if !report.failed.is_empty() {
        outcome
            .record
            .errors
            .push(format!("import job {handle} did not complete"));
    }
    outcome.imported = report
        .outcome
        .succeeded
        .iter()
        .map(|p| p.target_file.clone())
        .collect();
    outcome.record.projects_imported += outcome.imported.len() as u32;
    outcome.import_handle = Some(handle);
}

async fn finish(api: &ApiClient, mut outcome: SyncOutcome) -> SyncOutcome {
    outcome.record.finish();
    ops::log_sync_record(api.sink().as_ref(), &outcome.record).await;
    tracing::info!(
        repo = %outcome.target,
        status = %outcome.record.status,
        branches = outcome.record.branch_updated,
        imported = outcome.record.projects_imported,
        deactivated = outcome.record.projects_deactivated,
        dry_run = outcome.record.dry_run,
        "repository synced"
    );
    outcome
}

/// Bring the projects monitoring one repository in line with it.
///
/// Missing or archived repositories get every live project deactivated.
/// Otherwise drifted branches are updated on projects that stay, new
/// manifests imported as one job and vanished manifests deactivated. Failures of single actions land
/// in the outcome's record; the run goes on.
pub async fn run_sync(
    api: &ApiClient,
    repo_state: &RepoState,
    projects: &[SnykProject],
    settings: &SyncSettings,
) -> SyncOutcome {
    let mut outcome = SyncOutcome::new(&repo_state.full_name, settings);
    let live: Vec<&SnykProject> = projects
        .iter()
        .filter(|p| p.is_active() && !p.is_sast())
        .collect();

    let repo = match &repo_state.repo {
        Some(repo) if !repo.is_archived => repo,
        other => {
            let reason = if other.is_some() { "archived" } else { "not found" };
            tracing::info!(
                repo = %repo_state.full_name,
                projects = live.len(),
                "repository {reason}, deactivating its projects"
            );
            for project in live {
                deactivate(api, settings, project, &mut outcome).await;
            }
            return finish(api, outcome).await;
        }
    };

    let reconciliation = diff(
        &repo_state.files,
        projects,
        &settings.allowed_types,
        &settings.exclusion_globs,
    );
    let removed: HashSet<&str> = match &reconciliation {
        Ok(result) => result.remove.iter().map(|p| p.id.as_str()).collect(),
        Err(_) => HashSet::new(),
    };

    for project in live.iter().filter(|p| !removed.contains(p.id.as_str())) {
        match update_branch_if_drifted(
            api,
            &settings.org_id,
            project,
            &repo.default_branch,
            settings.dry_run,
        )
        .await
        {
            Ok(update) => {
                if update.updated {
                    outcome.record.branch_updated += 1;
                }
                outcome.branch_updates.push(update);
            }
            Err(e) => outcome
                .record
                .errors
                .push(format!("branch {}: {e}", project.id)),
        }
    }

    let reconciliation = match reconciliation {
        Ok(result) => result,
        Err(e) => {
            outcome.record.errors.push(e.to_string());
            return finish(api, outcome).await;
        }
    };

    if !reconciliation.import.is_empty() {
        import_manifests(api, settings, repo, &reconciliation.import, &mut outcome).await;
    }
    for project in &reconciliation.remove {
        deactivate(api, settings, project, &mut outcome).await;
    }
    outcome.reconciliation = reconciliation;
    finish(api, outcome).await
}

/// Group projects by `<owner>/<repo>`, keeping those under `namespace`.
pub fn group_by_repo(
    projects: Vec<SnykProject>,
    namespace: Option<&str>,
) -> BTreeMap<String, Vec<SnykProject>> {
    let prefix = namespace.map(|ns| format!("{}/", ns.trim_end_matches('/').to_lowercase()));
    let mut groups: BTreeMap<String, Vec<SnykProject>> = BTreeMap::new();
    for project in projects {
        let full_name = project.repo_full_name().to_string();
        if let Some(prefix) = &prefix {
            if !full_name.to_lowercase().starts_with(prefix.as_str()) {
                continue;
            }
        }
        groups.entry(full_name).or_default().push(project);
    }
    groups
}

/// Look a repository up on its host and list its files.
pub async fn load_repo_state(
    provider: &dyn HostProvider,
    full_name: &str,
    clone: Option<&CloneSettings>,
) -> Result<RepoState, MigrError> {
    let (owner, name) = full_name
        .rsplit_once('/')
        .ok_or_else(|| MigrError::InvalidTarget {
            message: format!("{full_name} is not <owner>/<repo>"),
        })?;

    let repo = provider.get_repo(owner, name).await?;
    let files = match &repo {
        Some(repo) if !repo.is_archived => {
            let branch = if repo.default_branch.is_empty() {
                "HEAD"
            } else {
                repo.default_branch.as_str()
            };
            migr_discover::repo_files(provider, repo, branch, clone).await?
        }
        _ => Vec::new(),
    };
    Ok(RepoState {
        full_name: full_name.to_string(),
        repo,
        files,
    })
}

/// Sync every repository of an org that has monitored projects from
/// `settings.source`.
///
/// Refuses orgs with custom branches enabled before changing anything.
pub async fn sync_org(
    api: &ApiClient,
    provider: &dyn HostProvider,
    settings: &SyncSettings,
    scheduler: &BatchScheduler,
) -> Result<SyncRunSummary, MigrError> {
    if api.custom_branch_enabled(&settings.org_id).await? {
        return Err(MigrError::CustomBranchEnabled {
            org_id: settings.org_id.clone(),
        });
    }

    let origin = settings.source.to_string();
    let projects = api.list_projects(&settings.org_id, Some(&origin)).await?;
    let groups = group_by_repo(projects, settings.namespace.as_deref());
    tracing::info!(
        org_id = %settings.org_id,
        repos = groups.len(),
        dry_run = settings.dry_run,
        "syncing repositories"
    );

    let report = scheduler
        .run(
            groups.into_iter().collect(),
            0,
            |(full_name, projects): (String, Vec<SnykProject>)| async move {
                match load_repo_state(provider, &full_name, settings.clone.as_ref()).await {
                    Ok(state) => Ok(run_sync(api, &state, &projects, settings).await),
                    Err(e) => {
                        tracing::warn!(repo = %full_name, "could not read repository: {e}");
                        let mut record =
                            SyncRecord::new(&settings.org_id, &full_name, settings.dry_run);
                        record.errors.push(e.to_string());
                        record.finish();
                        ops::log_sync_record(api.sink().as_ref(), &record).await;
                        Err(e)
                    }
                }
            },
        )
        .await?;

    Ok(SyncRunSummary {
        total: report.total,
        failed: report.failed,
        cancelled: report.cancelled,
        outcomes: report.outputs,
    })
}
