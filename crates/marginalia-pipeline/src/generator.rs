//! Comment file generation.
//!
//! Materializes the approved comment set into the site working copy:
//! each page bundle gets a `comments/` directory whose files exactly
//! mirror the database. The directory is removed and recreated on every
//! run, so stale files from previous runs cannot survive.
//!
//! File naming: `YYYY-MM-DD-NNN.md`, where the date is the comment's
//! creation time in the site's configured timezone and NNN is a 1-based
//! counter per local day per bundle.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use marginalia_core::SiteConfig;
use marginalia_state::{Comment, Store};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Generate `comments/` directories for every approved comment of a site.
///
/// Bundles that do not exist in the working copy are skipped with a
/// warning (non-strict mode): the repo may simply not carry that page
/// anymore.
pub fn generate(store: &Store, site_id: i64, site_key: &str, site: &SiteConfig) -> Result<()> {
    let workdir = site.workdir(site_key);
    let tz = resolve_timezone(site.timezone.as_deref())?;

    let comments = store.list_approved_comments(site_id)?;

    // Group by normalized post path. BTreeMap gives deterministic bundle
    // order; within a bundle the rows are re-sorted because two raw paths
    // can normalize to the same bundle.
    let mut by_post_path: BTreeMap<String, Vec<Comment>> = BTreeMap::new();
    for comment in comments {
        let normalized = normalize_post_path(&comment.post_path);
        if normalized.is_empty() {
            bail!("invalid post_path in store (empty after normalization)");
        }
        by_post_path.entry(normalized).or_default().push(comment);
    }

    for (post_path, mut group) in by_post_path {
        group.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let bundle_dir = bundle_dir(&workdir, &post_path);
        if !bundle_dir.is_dir() {
            warn!(%post_path, bundle = %bundle_dir.display(), "bundle directory not found, skipping");
            continue;
        }

        let comments_dir = bundle_dir.join("comments");
        if comments_dir.exists() {
            std::fs::remove_dir_all(&comments_dir)
                .with_context(|| format!("remove {}", comments_dir.display()))?;
        }
        std::fs::create_dir_all(&comments_dir)
            .with_context(|| format!("create {}", comments_dir.display()))?;

        let mut day_counters: BTreeMap<String, u32> = BTreeMap::new();
        for comment in &group {
            let local: DateTime<Tz> = match tz.timestamp_opt(comment.created_at, 0).single() {
                Some(ts) => ts,
                None => bail!("comment {} has an unrepresentable timestamp", comment.id),
            };
            let day = local.format("%Y-%m-%d").to_string();

            let counter = day_counters.entry(day.clone()).or_insert(0);
            *counter += 1;
            if *counter > 999 {
                bail!("too many comments on {day} for post_path {post_path:?}");
            }

            let filename = format!("{day}-{counter:03}.md");
            let out_path = comments_dir.join(&filename);
            let markdown = render_comment_markdown(comment, local);
            std::fs::write(&out_path, markdown)
                .with_context(|| format!("write {}", out_path.display()))?;
        }

        info!(%post_path, count = group.len(), "bundle comments generated");
    }

    Ok(())
}

fn resolve_timezone(tz: Option<&str>) -> Result<Tz> {
    match tz.map(str::trim) {
        None | Some("") => Ok(Tz::UTC),
        Some(name) if name.eq_ignore_ascii_case("utc") => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("invalid timezone {name:?}")),
    }
}

/// "/posts/foo/" → "posts/foo"; backslashes are folded to forward slashes
/// before trimming.
pub fn normalize_post_path(p: &str) -> String {
    p.trim().replace('\\', "/").trim_matches('/').to_string()
}

fn bundle_dir(workdir: &Path, normalized_post_path: &str) -> PathBuf {
    let mut dir = workdir.join("content");
    for segment in normalized_post_path.split('/') {
        dir.push(segment);
    }
    dir
}

fn render_comment_markdown(comment: &Comment, local: DateTime<Tz>) -> String {
    let reply_to = comment.parent_id.as_deref().unwrap_or("").trim();
    let author_url = comment.author_url.as_deref().unwrap_or("").trim();

    let mut body = comment.body.replace("\r\n", "\n");
    body.truncate(body.trim_end_matches('\n').len());
    body.push('\n');

    format!(
        "---\n\
         comment_id: {id:?}\n\
         date: {date}\n\
         author_name: {author:?}\n\
         author_url: {author_url:?}\n\
         status: \"approved\"\n\
         reply_to: {reply_to:?}\n\
         ---\n\
         \n\
         {body}",
        id = comment.id,
        date = local.to_rfc3339(),
        author = comment.author.trim(),
    )
}
