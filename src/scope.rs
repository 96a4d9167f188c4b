//! Resolution of the CLI scope argument into a concrete file list.
//!
//! - empty: files changed against the base ref (plus untracked files)
//! - `full`: every file under the project root that git does not ignore
//!   (a plain walk outside a work tree), minus skipped directories
//! - anything else: a path (file or directory) or a glob, relative to the root

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use crate::config::EffectiveConfig;
use crate::error::{Result, ReviewError};

/// Directories never descended into when walking.
const IGNORED_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "vendor",
    "dist",
    "build",
    "__pycache__",
];

/// What the user asked to review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "arg", rename_all = "lowercase")]
pub enum ScopeSpec {
    /// Changed files against `base` (defaults to `HEAD`).
    Diff { base: Option<String> },
    Full,
    /// A path or glob relative to the root.
    Path(String),
}

impl ScopeSpec {
    /// Interpret the raw CLI scope argument.
    pub fn parse(arg: Option<&str>, base: Option<String>) -> Self {
        match arg.map(str::trim) {
            None | Some("") => ScopeSpec::Diff { base },
            Some("full") => ScopeSpec::Full,
            Some(p) => ScopeSpec::Path(p.to_string()),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            ScopeSpec::Diff { .. } => "diff",
            ScopeSpec::Full => "full",
            ScopeSpec::Path(_) => "path",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ScopeSpec::Diff { base } => format!("diff ({})", base.as_deref().unwrap_or("HEAD")),
            ScopeSpec::Full => "full".to_string(),
            ScopeSpec::Path(p) => p.clone(),
        }
    }
}

/// A resolved, ordered, duplicate-free set of absolute file paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub spec: ScopeSpec,
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
}

impl Scope {
    pub fn new(spec: ScopeSpec, root: PathBuf, files: impl IntoIterator<Item = PathBuf>) -> Self {
        let files: BTreeSet<PathBuf> = files.into_iter().collect();
        Self {
            spec,
            root,
            files: files.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path relative to the root, with forward slashes.
    pub fn relative(&self, file: &Path) -> String {
        relative_to(&self.root, file)
    }
}

pub(crate) fn relative_to(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| file.to_string_lossy().to_string())
}

/// Turns a [`ScopeSpec`] into a [`Scope`].
pub struct ScopeResolver<'a> {
    root: PathBuf,
    config: &'a EffectiveConfig,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(config: &'a EffectiveConfig) -> Self {
        Self {
            root: config.root.clone(),
            config,
        }
    }

    pub fn resolve(&self, spec: &ScopeSpec) -> Result<Scope> {
        let excluded = self.config.exclude_set()?;
        let files = match spec {
            ScopeSpec::Diff { base } => self.changed_files(base.as_deref().unwrap_or("HEAD"))?,
            ScopeSpec::Full => self.list_files(&self.root)?,
            ScopeSpec::Path(arg) => self.resolve_path_or_glob(arg)?,
        };

        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| !excluded.is_match(relative_to(&self.root, f)))
            .collect();

        tracing::debug!(scope = %spec.describe(), files = files.len(), "resolved scope");
        Ok(Scope::new(spec.clone(), self.root.clone(), files))
    }

    fn resolve_path_or_glob(&self, arg: &str) -> Result<Vec<PathBuf>> {
        if is_glob(arg) {
            return self.resolve_glob(arg);
        }

        let candidate = if Path::new(arg).is_absolute() {
            PathBuf::from(arg)
        } else {
            self.root.join(arg)
        };
        let normalized = normalize(&candidate);
        if !normalized.starts_with(&self.root) {
            return Err(ReviewError::ScopeResolution(format!(
                "{:?} is outside the project root {}",
                arg,
                self.root.display()
            )));
        }

        let metadata = std::fs::metadata(&normalized).map_err(|_| {
            ReviewError::ScopeResolution(format!("{:?} does not match any file", arg))
        })?;

        let files = if metadata.is_dir() {
            self.list_files(&normalized)?
        } else {
            vec![normalized]
        };

        if files.is_empty() {
            return Err(ReviewError::ScopeResolution(format!(
                "{:?} does not match any file",
                arg
            )));
        }
        Ok(files)
    }

    fn resolve_glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        if Path::new(pattern)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
            || Path::new(pattern).is_absolute()
        {
            return Err(ReviewError::ScopeResolution(format!(
                "glob {:?} escapes the project root",
                pattern
            )));
        }

        let matcher = globset::Glob::new(pattern)
            .map_err(|e| ReviewError::ScopeResolution(format!("invalid glob {:?}: {}", pattern, e)))?
            .compile_matcher();

        let files: Vec<PathBuf> = self
            .list_files(&self.root)?
            .into_iter()
            .filter(|f| matcher.is_match(relative_to(&self.root, f)))
            .collect();

        if files.is_empty() {
            return Err(ReviewError::ScopeResolution(format!(
                "glob {:?} does not match any file",
                pattern
            )));
        }
        Ok(files)
    }

    /// Files under `dir`. Inside a git work tree this is what git tracks or
    /// would track, so `.gitignore` applies; elsewhere the directory is walked.
    /// Hidden and heavy directories are skipped either way.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !is_work_tree(dir) {
            return self.walk(dir);
        }

        // `ls-files` prints paths relative to its working directory.
        let listed = run_git(
            dir,
            &["ls-files", "-z", "--cached", "--others", "--exclude-standard"],
        )?;
        Ok(split_nul(&listed)
            .map(|rel| dir.join(rel))
            .filter(|p| !in_skipped_dir(dir, p) && p.is_file())
            .collect())
    }

    /// Walk a directory, skipping hidden and heavy directories.
    fn walk(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                !is_skipped_dir(&e.file_name().to_string_lossy())
            })
        {
            let entry = entry.map_err(|e| {
                ReviewError::ScopeResolution(format!("walking {}: {}", dir.display(), e))
            })?;
            if entry.file_type().is_file() {
                files.push(entry.path().to_path_buf());
            }
        }

        Ok(files)
    }

    /// Files changed against `base`, plus untracked files. Deleted files are dropped.
    fn changed_files(&self, base: &str) -> Result<Vec<PathBuf>> {
        let toplevel = run_git(&self.root, &["rev-parse", "--show-toplevel"])?;
        let toplevel = PathBuf::from(toplevel.trim());

        // -z turns off path quoting, which would mangle non-ASCII names.
        let changed = run_git(
            &self.root,
            &["diff", "--name-only", "-z", "--diff-filter=ACMR", base, "--"],
        )?;
        let untracked = run_git(
            &self.root,
            &["ls-files", "-z", "--others", "--exclude-standard"],
        )?;

        // `git diff` prints paths relative to the repository top level,
        // `ls-files` relative to the working directory.
        let files = split_nul(&changed)
            .map(|l| toplevel.join(l))
            .chain(split_nul(&untracked).map(|l| self.root.join(l)))
            .map(|p| normalize(&p))
            .filter(|p| p.starts_with(&self.root) && p.is_file())
            .collect();

        Ok(files)
    }
}

fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || IGNORED_DIRS.contains(&name)
}

/// True if any directory between `dir` and `file` is skipped.
fn in_skipped_dir(dir: &Path, file: &Path) -> bool {
    let Ok(rel) = file.strip_prefix(dir) else {
        return false;
    };
    let Some(parent) = rel.parent() else {
        return false;
    };
    parent
        .components()
        .any(|c| is_skipped_dir(&c.as_os_str().to_string_lossy()))
}

fn is_work_tree(dir: &Path) -> bool {
    run_git(dir, &["rev-parse", "--is-inside-work-tree"])
        .map(|out| out.trim() == "true")
        .unwrap_or(false)
}

fn split_nul(output: &str) -> impl Iterator<Item = &str> {
    output.split('\0').filter(|p| !p.is_empty())
}

fn is_glob(arg: &str) -> bool {
    arg.contains(['*', '?', '[', '{'])
}

/// Lexically normalize `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| ReviewError::ScopeResolution(format!("failed to execute git: {}", e)))?;

    if !output.status.success() {
        return Err(ReviewError::ScopeResolution(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> (TempDir, EffectiveConfig) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("src/api")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(root.join("src/api/server.go"), "package api").unwrap();
        std::fs::write(root.join("README.md"), "# readme").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(root.join(".git/config"), "x").unwrap();
        let config = EffectiveConfig::defaults(&root);
        (temp, config)
    }

    #[test]
    fn test_parse_spec() {
        assert_eq!(ScopeSpec::parse(None, None), ScopeSpec::Diff { base: None });
        assert_eq!(ScopeSpec::parse(Some(""), None), ScopeSpec::Diff { base: None });
        assert_eq!(ScopeSpec::parse(Some("full"), None), ScopeSpec::Full);
        assert_eq!(
            ScopeSpec::parse(Some("src/"), None),
            ScopeSpec::Path("src/".to_string())
        );
    }

    #[test]
    fn test_full_skips_ignored_dirs() {
        let (_temp, config) = project();
        let scope = ScopeResolver::new(&config).resolve(&ScopeSpec::Full).unwrap();
        let rel: Vec<_> = scope.files.iter().map(|f| scope.relative(f)).collect();
        assert_eq!(rel, vec!["README.md", "src/api/server.go", "src/main.rs"]);
    }

    #[test]
    fn test_exclude_globs() {
        let (_temp, mut config) = project();
        config.exclude = vec!["**/*.md".to_string()];
        let scope = ScopeResolver::new(&config).resolve(&ScopeSpec::Full).unwrap();
        assert_eq!(scope.files.len(), 2);
    }

    #[test]
    fn test_directory_path() {
        let (_temp, config) = project();
        let scope = ScopeResolver::new(&config)
            .resolve(&ScopeSpec::Path("src/api".to_string()))
            .unwrap();
        assert_eq!(scope.files.len(), 1);
        assert!(scope.files[0].ends_with("server.go"));
        assert!(scope.files[0].is_absolute());
    }

    #[test]
    fn test_glob() {
        let (_temp, config) = project();
        let scope = ScopeResolver::new(&config)
            .resolve(&ScopeSpec::Path("src/**/*.rs".to_string()))
            .unwrap();
        assert_eq!(scope.files.len(), 1);
        assert!(scope.files[0].ends_with("main.rs"));
    }

    #[test]
    fn test_no_match_is_error() {
        let (_temp, config) = project();
        let resolver = ScopeResolver::new(&config);
        assert!(matches!(
            resolver.resolve(&ScopeSpec::Path("missing.rs".to_string())),
            Err(ReviewError::ScopeResolution(_))
        ));
        assert!(matches!(
            resolver.resolve(&ScopeSpec::Path("**/*.py".to_string())),
            Err(ReviewError::ScopeResolution(_))
        ));
    }

    #[test]
    fn test_escape_is_error() {
        let (_temp, config) = project();
        let resolver = ScopeResolver::new(&config);
        let err = resolver
            .resolve(&ScopeSpec::Path("../".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("outside the project root"));
        assert!(resolver
            .resolve(&ScopeSpec::Path("../**/*.rs".to_string()))
            .is_err());
    }

    #[test]
    fn test_diff_outside_git_is_error() {
        let (_temp, config) = project();
        // The fake .git directory is not a repository.
        let err = ScopeResolver::new(&config)
            .resolve(&ScopeSpec::Diff { base: None })
            .unwrap_err();
        assert!(matches!(err, ReviewError::ScopeResolution(_)));
    }

    fn git(root: &Path, args: &[&str]) {
        let status = Command::new("git")
            .current_dir(root)
            .args(["-c", "user.name=revgate", "-c", "user.email=revgate@example.com"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn git_repo(files: &[(&str, &str)]) -> (TempDir, EffectiveConfig) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        git(&root, &["init", "-q"]);
        for (rel, content) in files {
            write(&root, rel, content);
        }
        git(&root, &["add", "-A"]);
        git(&root, &["commit", "-q", "-m", "initial"]);
        let config = EffectiveConfig::defaults(&root);
        (temp, config)
    }

    fn relative_files(scope: &Scope) -> Vec<String> {
        scope.files.iter().map(|f| scope.relative(f)).collect()
    }

    #[test]
    fn test_diff_lists_changed_and_untracked() {
        let (_temp, config) = git_repo(&[
            (".gitignore", "*.log\n"),
            ("a.go", "package a\n"),
            ("café.go", "package a\n"),
            ("gone.go", "package a\n"),
            ("same.go", "package a\n"),
        ]);
        let root = config.root.clone();
        write(&root, "a.go", "package a\n// edited\n");
        write(&root, "café.go", "package a\n// edited\n");
        std::fs::remove_file(root.join("gone.go")).unwrap();
        write(&root, "added.go", "package a\n");
        git(&root, &["add", "added.go"]);
        write(&root, "naïve.go", "package a\n");
        write(&root, "debug.log", "noise");

        let scope = ScopeResolver::new(&config)
            .resolve(&ScopeSpec::Diff { base: None })
            .unwrap();
        assert_eq!(
            relative_files(&scope),
            vec!["a.go", "added.go", "café.go", "naïve.go"]
        );
        assert!(scope.files.iter().all(|f| f.is_absolute()));
    }

    #[test]
    fn test_diff_against_base() {
        let (_temp, config) = git_repo(&[("a.go", "package a\n")]);
        let root = config.root.clone();
        write(&root, "b.go", "package a\n");
        git(&root, &["add", "b.go"]);
        git(&root, &["commit", "-q", "-m", "second"]);

        let resolver = ScopeResolver::new(&config);
        let clean = resolver.resolve(&ScopeSpec::Diff { base: None }).unwrap();
        assert!(clean.is_empty(), "a clean tree is an empty, valid scope");

        let scope = resolver
            .resolve(&ScopeSpec::Diff {
                base: Some("HEAD~1".to_string()),
            })
            .unwrap();
        assert_eq!(relative_files(&scope), vec!["b.go"]);
    }

    #[test]
    fn test_full_honors_gitignore() {
        let (_temp, config) = git_repo(&[
            (".gitignore", "generated/\n*.log\n"),
            ("main.go", "package main\n"),
            ("src/lib.go", "package src\n"),
        ]);
        let root = config.root.clone();
        write(&root, "new.go", "package main\n");
        write(&root, "debug.log", "noise");
        write(&root, "generated/api.go", "package generated\n");
        write(&root, "src/out.log", "noise");
        write(&root, "node_modules/pkg/index.js", "x");

        let resolver = ScopeResolver::new(&config);
        let scope = resolver.resolve(&ScopeSpec::Full).unwrap();
        assert_eq!(
            relative_files(&scope),
            vec![".gitignore", "main.go", "new.go", "src/lib.go"]
        );

        let dir = resolver.resolve(&ScopeSpec::Path("src".to_string())).unwrap();
        assert_eq!(relative_files(&dir), vec!["src/lib.go"]);
    }

    #[test]
    fn test_scope_dedups_and_sorts() {
        let scope = Scope::new(
            ScopeSpec::Full,
            PathBuf::from("/r"),
            vec![
                PathBuf::from("/r/b"),
                PathBuf::from("/r/a"),
                PathBuf::from("/r/b"),
            ],
        );
        assert_eq!(scope.files, vec![PathBuf::from("/r/a"), PathBuf::from("/r/b")]);
    }
}
