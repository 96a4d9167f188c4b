//! Project profiling: what kind of code is in scope.
//!
//! The profile is a pure function of the file list (plus the declared
//! `project.type`, which replaces detection entirely).

use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A detected project characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Characteristic {
    /// Any source code at all.
    Source,
    /// Browser-facing UI (markup, styles, components).
    Frontend,
    /// Server-side or service code.
    Backend,
    /// SQL, migrations, ORM schemas.
    Database,
    /// Languages with first-class threads/async.
    Concurrent,
    /// Test sources.
    Tests,
    /// Prose documentation.
    Docs,
    /// Package manifests and lockfiles.
    Manifests,
}

/// Language by file extension.
static LANGUAGES: phf::Map<&'static str, &'static str> = phf_map! {
    "rs" => "rust",
    "go" => "go",
    "py" => "python",
    "js" => "javascript",
    "mjs" => "javascript",
    "cjs" => "javascript",
    "jsx" => "javascript",
    "ts" => "typescript",
    "tsx" => "typescript",
    "java" => "java",
    "kt" => "kotlin",
    "swift" => "swift",
    "c" => "c",
    "h" => "c",
    "cpp" => "cpp",
    "hpp" => "cpp",
    "cs" => "csharp",
    "rb" => "ruby",
    "php" => "php",
    "scala" => "scala",
    "vue" => "vue",
    "svelte" => "svelte",
    "html" => "html",
    "css" => "css",
    "scss" => "css",
    "sql" => "sql",
    "md" => "markdown",
};

const FRONTEND_EXTENSIONS: &[&str] = &["html", "css", "scss", "jsx", "tsx", "vue", "svelte"];
const BACKEND_LANGUAGES: &[&str] = &[
    "rust", "go", "python", "java", "kotlin", "csharp", "ruby", "php", "scala",
];
const CONCURRENT_LANGUAGES: &[&str] = &["rust", "go", "java", "kotlin", "csharp", "scala", "cpp"];
const MANIFEST_NAMES: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "go.mod",
    "go.sum",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pyproject.toml",
    "requirements.txt",
    "uv.lock",
    "pom.xml",
    "build.gradle",
    "Gemfile",
];

/// Inferred project characteristics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Declared `project.type`, when detection was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    pub languages: BTreeSet<String>,
    pub characteristics: BTreeSet<Characteristic>,
}

impl Profile {
    pub fn has(&self, c: Characteristic) -> bool {
        self.characteristics.contains(&c)
    }

    pub fn has_language(&self, lang: &str) -> bool {
        self.languages.contains(lang)
    }

    /// Profile implied by a declared project type.
    pub fn from_project_type(project_type: &str) -> Self {
        use Characteristic::*;
        let characteristics: &[Characteristic] = match project_type.to_lowercase().as_str() {
            "web" | "frontend" => &[Source, Frontend, Tests, Docs],
            "fullstack" => &[Source, Frontend, Backend, Database, Concurrent, Tests, Docs],
            "backend" | "service" | "api" => &[Source, Backend, Database, Concurrent, Tests, Docs],
            "data" => &[Source, Backend, Database, Tests, Docs],
            "cli" | "library" => &[Source, Concurrent, Tests, Docs],
            "docs" => &[Docs],
            _ => &[Source, Tests, Docs],
        };
        Self {
            project_type: Some(project_type.to_string()),
            languages: BTreeSet::new(),
            characteristics: characteristics.iter().copied().collect(),
        }
    }
}

/// Build a profile for the given scope.
pub fn profile<P: AsRef<Path>>(files: &[P], project_type: Option<&str>) -> Profile {
    if let Some(t) = project_type {
        return Profile::from_project_type(t);
    }

    let mut profile = Profile::default();
    for file in files {
        let path = file.as_ref();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if MANIFEST_NAMES.contains(&name) {
            profile.characteristics.insert(Characteristic::Manifests);
        }
        if is_test_path(path) {
            profile.characteristics.insert(Characteristic::Tests);
        }
        if is_migration_path(path) {
            profile.characteristics.insert(Characteristic::Database);
        }

        let Some(lang) = LANGUAGES.get(ext.as_str()) else {
            continue;
        };
        profile.languages.insert((*lang).to_string());

        match *lang {
            "markdown" => {
                profile.characteristics.insert(Characteristic::Docs);
            }
            "sql" => {
                profile.characteristics.insert(Characteristic::Database);
            }
            _ => {
                profile.characteristics.insert(Characteristic::Source);
            }
        }
        if FRONTEND_EXTENSIONS.contains(&ext.as_str()) {
            profile.characteristics.insert(Characteristic::Frontend);
        }
        if BACKEND_LANGUAGES.contains(lang) {
            profile.characteristics.insert(Characteristic::Backend);
        }
        if CONCURRENT_LANGUAGES.contains(lang) {
            profile.characteristics.insert(Characteristic::Concurrent);
        }
    }

    profile
}

fn is_test_path(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with("_test.go")
        || stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with(".test")
        || stem.ends_with(".spec")
        || path
            .components()
            .any(|c| matches!(c.as_os_str().to_str(), Some("tests" | "test" | "__tests__")))
}

fn is_migration_path(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c.as_os_str().to_str(), Some("migrations" | "migrate")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/repo/{n}"))).collect()
    }

    #[test]
    fn test_detects_languages_and_traits() {
        let p = profile(
            &paths(&["app/server.go", "web/App.tsx", "README.md", "db/migrations/001.sql"]),
            None,
        );
        assert!(p.has_language("go"));
        assert!(p.has_language("typescript"));
        assert!(p.has(Characteristic::Backend));
        assert!(p.has(Characteristic::Frontend));
        assert!(p.has(Characteristic::Docs));
        assert!(p.has(Characteristic::Database));
        assert!(p.has(Characteristic::Concurrent));
        assert!(!p.has(Characteristic::Tests));
    }

    #[test]
    fn test_detects_tests_and_manifests() {
        let p = profile(&paths(&["Cargo.toml", "tests/api.rs", "pkg/x_test.go"]), None);
        assert!(p.has(Characteristic::Tests));
        assert!(p.has(Characteristic::Manifests));
    }

    #[test]
    fn test_project_type_short_circuits() {
        let p = profile(&paths(&["app/server.go"]), Some("web"));
        assert_eq!(p.project_type.as_deref(), Some("web"));
        assert!(p.has(Characteristic::Frontend));
        assert!(!p.has(Characteristic::Backend));
        assert!(p.languages.is_empty());
    }

    #[test]
    fn test_empty_scope() {
        let p = profile::<PathBuf>(&[], None);
        assert!(p.characteristics.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let files = paths(&["a.py", "b.rs", "c.html"]);
        let mut reversed = files.clone();
        reversed.reverse();
        assert_eq!(profile(&files, None), profile(&reversed, None));
    }
}
