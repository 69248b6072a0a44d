//! `marginalia site` — site administration.

use anyhow::Result;
use clap::Subcommand;
use marginalia_core::Config;
use marginalia_state::Store;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum SiteCommand {
    /// List persisted sites and their status.
    List,
    /// Reconcile configured site keys with the store (normally done by
    /// `serve` at startup).
    Sync,
}

pub fn run(command: SiteCommand, config: Arc<Config>, store: Store) -> Result<()> {
    match command {
        SiteCommand::List => {
            let sites = store.list_sites()?;
            if sites.is_empty() {
                println!("No sites registered.");
                return Ok(());
            }
            println!("{:>4}  {:<20}  {:<8}  title", "id", "site_key", "status");
            for site in sites {
                println!(
                    "{:>4}  {:<20}  {:<8}  {}",
                    site.id,
                    site.site_key,
                    site.status.as_str(),
                    site.title
                );
            }
            Ok(())
        }
        SiteCommand::Sync => {
            store.sync_sites(&config.site_titles())?;
            println!("Sites synchronized ({} configured).", config.comment_sites.len());
            Ok(())
        }
    }
}
