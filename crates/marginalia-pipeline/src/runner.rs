//! Five-step publication run.
//!
//! Before each step the run row's `step` annotation advances; the first
//! step error marks the run `failed` with that step and a redacted
//! message, and nothing after it executes. A run against an unchanged
//! approved set ends in `success` with no commit.

use anyhow::{bail, Context, Result};
use marginalia_core::{Config, SiteConfig, ThemeConfig};
use marginalia_state::{RunStep, Store};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::generator;
use crate::gitcli::{self, CloneOptions};
use crate::hugocli;

pub const DEFAULT_COMMIT_MESSAGE: &str = "Update generated content";

/// Executes pipeline runs against the store and site config.
#[derive(Clone)]
pub struct Runner {
    store: Store,
    config: Arc<Config>,
}

impl Runner {
    pub fn new(store: Store, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Create a run row and execute it immediately (CLI path).
    pub async fn run_new(&self, site_key: &str, trigger_comment_id: Option<&str>) -> Result<i64> {
        let site_id = self
            .store
            .site_id_by_key(site_key)?
            .with_context(|| format!("unknown site key {site_key:?}"))?;
        let run_id = self.store.create_run(site_id, trigger_comment_id)?;
        self.run_existing(run_id, site_key).await?;
        Ok(run_id)
    }

    /// Execute an already-created run. The run row always ends in a
    /// terminal state when this returns.
    pub async fn run_existing(&self, run_id: i64, site_key: &str) -> Result<()> {
        let Some(site) = self.config.site(site_key) else {
            let msg = format!("unknown site key {site_key:?}");
            self.store.mark_run_failed(run_id, RunStep::Pipeline, &msg)?;
            bail!(msg);
        };
        let Some(site_id) = self.store.site_id_by_key(site_key)? else {
            let msg = format!("site {site_key:?} not present in store");
            self.store.mark_run_failed(run_id, RunStep::Pipeline, &msg)?;
            bail!(msg);
        };

        self.store.mark_run_running(run_id)?;
        info!(run_id, site_key, "pipeline run started");

        // 1) Checkout (fresh clone).
        self.store.mark_run_step(run_id, RunStep::Checkout)?;
        if let Err(e) = checkout(site_key, site).await {
            return Err(self.fail(run_id, RunStep::Checkout, e)?);
        }

        // 2) Generate comment files.
        self.store.mark_run_step(run_id, RunStep::Generate)?;
        if let Err(e) = generator::generate(&self.store, site_id, site_key, site) {
            return Err(self.fail(run_id, RunStep::Generate, e)?);
        }

        // 3) Build (optional).
        if !site.hugo.disabled {
            self.store.mark_run_step(run_id, RunStep::Hugo)?;
            let opts = hugocli::RunOptions {
                bin: site.hugo_bin().to_string(),
                ..Default::default()
            };
            if let Err(e) = hugocli::run(&site.workdir(site_key), &opts).await {
                return Err(self.fail(run_id, RunStep::Hugo, e)?);
            }
        }

        // 4) Commit, if the tree changed.
        self.store.mark_run_step(run_id, RunStep::Commit)?;
        if let Err(e) = commit_if_changed(&site.workdir(site_key), DEFAULT_COMMIT_MESSAGE).await {
            return Err(self.fail(run_id, RunStep::Commit, e)?);
        }

        // 5) Push.
        self.store.mark_run_step(run_id, RunStep::Push)?;
        if let Err(e) = gitcli::push(&site.workdir(site_key), gitcli::PUSH_TIMEOUT).await {
            return Err(self.fail(run_id, RunStep::Push, e)?);
        }

        self.store.mark_run_success(run_id)?;
        info!(run_id, site_key, "pipeline run succeeded");
        Ok(())
    }

    fn fail(&self, run_id: i64, step: RunStep, err: anyhow::Error) -> Result<anyhow::Error> {
        let msg = gitcli::redact(&format!("{err:#}"));
        self.store.mark_run_failed(run_id, step, &msg)?;
        Ok(err.context(step.as_str().to_string()))
    }
}

/// Remove and recreate the working directory, clone the site repo, then
/// make sure every configured theme repo is present. No local state is
/// trusted across runs.
pub async fn checkout(site_key: &str, site: &SiteConfig) -> Result<()> {
    let workdir = site.workdir(site_key);

    if workdir.exists() {
        std::fs::remove_dir_all(&workdir)
            .with_context(|| format!("remove {}", workdir.display()))?;
    }
    std::fs::create_dir_all(&workdir).with_context(|| format!("create {}", workdir.display()))?;

    info!(site_key, workdir = %workdir.display(), "cloning site repository");
    let opts = CloneOptions {
        repo_url: site.git.repo_url.clone(),
        branch: site.git.branch.clone(),
        access_token: site.git.access_token.clone(),
        depth: site.git.depth,
        recurse_submodules: site.git.recurse_submodules,
    };
    gitcli::clone(&opts, &workdir, gitcli::CLONE_TIMEOUT).await?;

    ensure_themes(&site.git.themes, &workdir).await
}

/// Clone each auxiliary theme repo into its validated target path,
/// skipping targets that already exist (e.g. vendored into the site
/// repo). Theme clones never recurse submodules.
async fn ensure_themes(themes: &[ThemeConfig], workdir: &Path) -> Result<()> {
    for theme in themes {
        if theme.repo_url.trim().is_empty() {
            bail!("theme repo_url must be set");
        }
        let target_rel = sanitize_relative_path(&theme.target_path)
            .with_context(|| format!("invalid theme target_path {:?}", theme.target_path))?;
        let target = workdir.join(&target_rel);

        if target.is_dir() {
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }

        info!(target = %target.display(), "cloning theme repository");
        let opts = CloneOptions {
            repo_url: theme.repo_url.clone(),
            branch: theme.branch.clone(),
            access_token: theme.access_token.clone(),
            depth: theme.depth,
            recurse_submodules: false,
        };
        gitcli::clone(&opts, &target, gitcli::CLONE_TIMEOUT)
            .await
            .with_context(|| {
                let name = theme.name.as_deref().unwrap_or(&theme.repo_url);
                format!("failed to clone theme {name:?}")
            })?;
    }
    Ok(())
}

/// Commit everything in the working tree, or do nothing when
/// `git status --porcelain` reports a clean tree.
pub async fn commit_if_changed(workdir: &Path, message: &str) -> Result<()> {
    let status = gitcli::status_porcelain(workdir, gitcli::GIT_OP_TIMEOUT).await?;
    if status.trim().is_empty() {
        info!("nothing to commit");
        return Ok(());
    }
    gitcli::add_all(workdir, gitcli::GIT_OP_TIMEOUT).await?;
    gitcli::commit(workdir, message, gitcli::GIT_OP_TIMEOUT).await?;
    info!("commit created");
    Ok(())
}

/// Reject absolute paths and anything that escapes the working directory.
pub fn sanitize_relative_path(p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        bail!("path is empty");
    }
    let path = Path::new(p);
    if path.is_absolute() {
        bail!("absolute paths are not allowed");
    }

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => bail!("path escapes repository (.. is not allowed)"),
            Component::Normal(part) => clean.push(part),
            Component::RootDir | Component::Prefix(_) => bail!("absolute paths are not allowed"),
        }
    }
    if clean.as_os_str().is_empty() {
        bail!("invalid relative path");
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_accepted_and_normalized() {
        assert_eq!(sanitize_relative_path("themes/paper").unwrap(), PathBuf::from("themes/paper"));
        assert_eq!(sanitize_relative_path("./themes/paper").unwrap(), PathBuf::from("themes/paper"));
    }

    #[test]
    fn escaping_paths_rejected() {
        for bad in ["..", "../x", "themes/../../etc", "/abs/path", "."] {
            assert!(sanitize_relative_path(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn interior_dotdot_rejected_even_when_it_stays_inside() {
        // "a/../b" resolves inside the tree, but .. components are
        // rejected wholesale before any filesystem operation.
        assert!(sanitize_relative_path("a/../b").is_err());
    }
}
