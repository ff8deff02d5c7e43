use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use migr_core::error::MigrError;

/// Directories that never hold production manifests.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "fixtures",
    "tests",
    "__tests__",
    "test",
    "node_modules",
    ".eggs",
    ".venv",
    "venv",
];

/// Product area a manifest type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestClass {
    OpenSource,
    InfrastructureAsCode,
    Container,
}

impl ManifestClass {
    /// Entitlement name that unlocks this class.
    pub fn entitlement(&self) -> &'static str {
        match self {
            ManifestClass::OpenSource => "openSource",
            ManifestClass::InfrastructureAsCode => "infrastructureAsCode",
            ManifestClass::Container => "dockerfileFromScm",
        }
    }
}

/// A project type and the file patterns that produce it.
#[derive(Debug, Clone, Copy)]
pub struct ManifestType {
    pub name: &'static str,
    pub class: ManifestClass,
    /// Matched against the path relative to the repo root, at any depth.
    pub patterns: &'static [&'static str],
}

const fn os(name: &'static str, patterns: &'static [&'static str]) -> ManifestType {
    ManifestType {
        name,
        class: ManifestClass::OpenSource,
        patterns,
    }
}

const fn iac(name: &'static str, patterns: &'static [&'static str]) -> ManifestType {
    ManifestType {
        name,
        class: ManifestClass::InfrastructureAsCode,
        patterns,
    }
}

pub const CATALOGUE: &[ManifestType] = &[
    os("npm", &["package.json"]),
    os("yarn", &["yarn.lock"]),
    os("rubygems", &["Gemfile.lock"]),
    os("maven", &["pom.xml"]),
    os("gradle", &["build.gradle", "build.gradle.kts"]),
    os("sbt", &["build.sbt"]),
    os("pip", &["*req*.txt", "requirements/*.txt"]),
    os("poetry", &["pyproject.toml", "poetry.lock"]),
    os("pipenv", &["Pipfile"]),
    os("gomodules", &["go.mod"]),
    os("golangdep", &["Gopkg.lock"]),
    os("govendor", &["vendor.json"]),
    os(
        "nuget",
        &[
            "packages.config",
            "*.csproj",
            "*.fsproj",
            "*.vbproj",
            "project.json",
            "project.assets.json",
            "packages*.lock.json",
        ],
    ),
    os("paket", &["paket.dependencies"]),
    os("composer", &["composer.lock"]),
    os("cocoapods", &["Podfile", "Podfile.lock"]),
    os("hex", &["mix.exs"]),
    os("cargo", &["Cargo.lock"]),
    os("swift", &["Package.swift"]),
    iac("terraformconfig", &["*.tf"]),
    iac("cloudformationconfig", &["*.yaml", "*.yml", "*.json"]),
    iac("k8sconfig", &["*.yaml", "*.yml", "*.json"]),
    iac("helmconfig", &["templates/*.yaml", "templates/*.yml", "Chart.yaml"]),
    iac("armconfig", &["*.json"]),
    ManifestType {
        name: "dockerfile",
        class: ManifestClass::Container,
        patterns: &["*[dD][oO][cC][kK][eE][rR][fF][iI][lL][eE]*"],
    },
];

/// Project types unlocked by the given entitlements, in catalogue order.
/// Unknown entitlements are ignored with a warning.
pub fn types_for_entitlements(entitlements: &[String]) -> Vec<&'static str> {
    for entitlement in entitlements {
        if !CATALOGUE
            .iter()
            .any(|t| t.class.entitlement() == entitlement.as_str())
        {
            tracing::warn!(entitlement = %entitlement, "unknown entitlement, ignoring");
        }
    }
    CATALOGUE
        .iter()
        .filter(|t| entitlements.iter().any(|e| e == t.class.entitlement()))
        .map(|t| t.name)
        .collect()
}

fn glob(pattern: &str) -> Result<globset::Glob, MigrError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| MigrError::Config {
            message: format!("invalid glob {pattern:?}: {e}"),
        })
}

fn build(builder: GlobSetBuilder) -> Result<GlobSet, MigrError> {
    builder.build().map_err(|e| MigrError::Config {
        message: format!("failed to compile globs: {e}"),
    })
}

/// Matches repo paths against the manifest patterns of a set of types.
#[derive(Debug, Clone)]
pub struct ManifestMatcher {
    set: GlobSet,
}

impl ManifestMatcher {
    pub fn for_types(types: &[&str]) -> Result<Self, MigrError> {
        let mut builder = GlobSetBuilder::new();
        for manifest in CATALOGUE.iter().filter(|t| types.contains(&t.name)) {
            for pattern in manifest.patterns {
                builder.add(glob(&format!("**/{pattern}"))?);
            }
        }
        Ok(Self {
            set: build(builder)?,
        })
    }

    pub fn is_manifest(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

/// Matches paths that sit under (or are) an excluded directory or file.
#[derive(Debug, Clone)]
pub struct ExclusionMatcher {
    set: GlobSet,
}

impl ExclusionMatcher {
    /// Defaults plus `user_globs`. Each glob matches as a whole path, as any
    /// path segment, or as a directory prefix.
    pub fn new(user_globs: &[String]) -> Result<Self, MigrError> {
        let mut builder = GlobSetBuilder::new();
        let user = user_globs
            .iter()
            .map(|g| g.trim().trim_matches('/'))
            .filter(|g| !g.is_empty());
        for pattern in DEFAULT_EXCLUSIONS.iter().copied().chain(user) {
            for expanded in [
                pattern.to_string(),
                format!("**/{pattern}"),
                format!("{pattern}/**"),
                format!("**/{pattern}/**"),
            ] {
                builder.add(glob(&expanded)?);
            }
        }
        Ok(Self {
            set: build(builder)?,
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

/// Split a comma-separated glob list, as carried on import targets.
pub fn parse_glob_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}
