//! Out-of-band pipeline commands: full runs, individual stages, and run
//! inspection.

use anyhow::{bail, Context as _, Result};
use marginalia_core::{Config, SiteConfig};
use marginalia_pipeline::{gitcli, hugocli, runner, Runner};
use marginalia_state::Store;
use std::sync::Arc;

fn resolve_site<'a>(config: &'a Config, site_key: &str) -> Result<(&'a str, &'a SiteConfig)> {
    let site_key = site_key.trim();
    if site_key.is_empty() {
        bail!("site key is required (use --site-key)");
    }
    match config.comment_sites.get_key_value(site_key) {
        Some((key, site)) => Ok((key.as_str(), site)),
        None => bail!("unknown site key {site_key:?} (not found in comment_sites)"),
    }
}

pub async fn pipeline_run(config: Arc<Config>, store: Store, site_key: &str) -> Result<()> {
    let (site_key, _) = resolve_site(&config, site_key)?;
    store.sync_sites(&config.site_titles())?;

    let site_key = site_key.to_string();
    let runner = Runner::new(store, config);
    let run_id = runner.run_new(&site_key, None).await?;
    println!("Pipeline finished (run_id={run_id})");
    Ok(())
}

pub fn generate(config: Arc<Config>, store: Store, site_key: &str) -> Result<()> {
    let (site_key, site) = resolve_site(&config, site_key)?;
    let site_id = store
        .site_id_by_key(site_key)?
        .with_context(|| format!("site {site_key:?} not present in store (run serve or site sync first)"))?;
    marginalia_pipeline::generator::generate(&store, site_id, site_key, site)?;
    println!("Comment files generated.");
    Ok(())
}

pub async fn git_checkout(config: Arc<Config>, site_key: &str) -> Result<()> {
    let (site_key, site) = resolve_site(&config, site_key)?;
    runner::checkout(site_key, site).await?;
    println!("Checkout complete: {}", site.workdir(site_key).display());
    Ok(())
}

pub async fn git_commit(config: Arc<Config>, site_key: &str, message: Option<&str>) -> Result<()> {
    let (site_key, site) = resolve_site(&config, site_key)?;
    let message = message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(runner::DEFAULT_COMMIT_MESSAGE);
    runner::commit_if_changed(&site.workdir(site_key), message).await?;
    Ok(())
}

pub async fn git_push(config: Arc<Config>, site_key: &str) -> Result<()> {
    let (site_key, site) = resolve_site(&config, site_key)?;
    gitcli::push(&site.workdir(site_key), gitcli::PUSH_TIMEOUT).await?;
    println!("Push completed.");
    Ok(())
}

pub async fn hugo_run(config: Arc<Config>, site_key: &str) -> Result<()> {
    let (site_key, site) = resolve_site(&config, site_key)?;
    let opts = hugocli::RunOptions {
        bin: site.hugo_bin().to_string(),
        ..Default::default()
    };
    hugocli::run(&site.workdir(site_key), &opts).await?;
    println!("Build completed.");
    Ok(())
}

pub fn show_runs(store: Store, site_key: Option<&str>, limit: u32) -> Result<()> {
    let site_id = match site_key {
        Some(key) => Some(
            store
                .site_id_by_key(key)?
                .with_context(|| format!("unknown site key {key:?}"))?,
        ),
        None => None,
    };

    let runs = store.list_runs(site_id, limit)?;
    if runs.is_empty() {
        println!("No pipeline runs recorded.");
        return Ok(());
    }

    println!(
        "{:>6}  {:>7}  {:<8}  {:<9}  {:>10}  {:>10}  error",
        "id", "site", "state", "step", "created", "finished"
    );
    for run in runs {
        println!(
            "{:>6}  {:>7}  {:<8}  {:<9}  {:>10}  {:>10}  {}",
            run.id,
            run.site_id,
            run.state.as_str(),
            run.step.map(|s| s.as_str()).unwrap_or("-"),
            run.created_at,
            run.finished_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
            run.error_message.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}
