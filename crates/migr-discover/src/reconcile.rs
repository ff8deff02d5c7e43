use std::collections::{BTreeSet, HashSet};

use migr_core::error::MigrError;
use migr_core::models::project::SnykProject;

use crate::manifests::{ExclusionMatcher, ManifestMatcher};

/// Changes needed to make monitored projects match a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// Manifest paths present in the repo with no project yet, sorted.
    pub import: Vec<String>,
    /// Active projects whose manifest is gone from the repo.
    pub remove: Vec<SnykProject>,
}

impl ReconciliationResult {
    pub fn is_empty(&self) -> bool {
        self.import.is_empty() && self.remove.is_empty()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// Diff a repository's files against the projects monitoring it.
///
/// `repo_paths` may contain any file; only unexcluded manifests of an
/// allowed type take part.
pub fn diff(
    repo_paths: &[String],
    projects: &[SnykProject],
    allowed_types: &[&str],
    exclusion_globs: &[String],
) -> Result<ReconciliationResult, MigrError> {
    let manifests = ManifestMatcher::for_types(allowed_types)?;
    let exclusions = ExclusionMatcher::new(exclusion_globs)?;
    Ok(diff_with(repo_paths, projects, allowed_types, &manifests, &exclusions))
}

/// [`diff`] with prebuilt matchers, for reuse across many repositories.
pub fn diff_with(
    repo_paths: &[String],
    projects: &[SnykProject],
    allowed_types: &[&str],
    manifests: &ManifestMatcher,
    exclusions: &ExclusionMatcher,
) -> ReconciliationResult {
    let present: BTreeSet<&str> = repo_paths
        .iter()
        .map(|p| normalize(p))
        .filter(|p| !p.is_empty())
        .filter(|p| !exclusions.is_excluded(p))
        .filter(|p| manifests.is_manifest(p))
        .collect();

    let monitored: HashSet<&str> = projects.iter().filter_map(|p| p.manifest_path()).collect();

    let import = present
        .iter()
        .filter(|p| !monitored.contains(*p))
        .map(|p| p.to_string())
        .collect();

    let remove = projects
        .iter()
        .filter(|p| p.is_active() && !p.is_sast())
        .filter(|p| allowed_types.contains(&p.project_type.as_str()))
        .filter(|p| match p.manifest_path() {
            Some(path) => !present.contains(path),
            None => false,
        })
        .cloned()
        .collect();

    ReconciliationResult { import, remove }
}
