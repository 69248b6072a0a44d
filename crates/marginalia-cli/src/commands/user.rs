//! `marginalia user` — admin user management.

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use marginalia_core::password::hash_password;
use marginalia_state::Store;

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create an admin user.
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// List admin users.
    List,
    /// Change a user's password.
    Passwd {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Delete a user (grants are removed with it).
    Rm {
        #[arg(long)]
        email: String,
    },
    /// Grant a user access to a site.
    Grant {
        #[arg(long)]
        email: String,
        #[arg(long)]
        site_key: String,
    },
    /// Revoke a user's access to a site.
    Revoke {
        #[arg(long)]
        email: String,
        #[arg(long)]
        site_key: String,
    },
}

fn user_id_by_email(store: &Store, email: &str) -> Result<i64> {
    store
        .get_user_by_email(email)?
        .map(|u| u.id)
        .with_context(|| format!("no user with email {email:?}"))
}

fn site_id_by_key(store: &Store, site_key: &str) -> Result<i64> {
    store
        .site_id_by_key(site_key)?
        .with_context(|| format!("unknown site key {site_key:?}"))
}

pub fn run(command: UserCommand, store: Store) -> Result<()> {
    match command {
        UserCommand::Add { email, password, first_name, last_name } => {
            let hash = hash_password(&password)?;
            let id = store.create_user(&email, &hash, &first_name, &last_name)?;
            println!("User created (id={id}).");
            Ok(())
        }
        UserCommand::List => {
            let users = store.list_users()?;
            if users.is_empty() {
                println!("No users.");
                return Ok(());
            }
            println!("{:>4}  {:<30}  name", "id", "email");
            for user in users {
                println!(
                    "{:>4}  {:<30}  {} {}",
                    user.id, user.email, user.first_name, user.last_name
                );
            }
            Ok(())
        }
        UserCommand::Passwd { email, password } => {
            let user_id = user_id_by_email(&store, &email)?;
            let hash = hash_password(&password)?;
            if !store.update_user_password(user_id, &hash)? {
                bail!("password update changed no rows");
            }
            println!("Password updated.");
            Ok(())
        }
        UserCommand::Rm { email } => {
            let user_id = user_id_by_email(&store, &email)?;
            store.delete_user(user_id)?;
            println!("User removed.");
            Ok(())
        }
        UserCommand::Grant { email, site_key } => {
            let user_id = user_id_by_email(&store, &email)?;
            let site_id = site_id_by_key(&store, &site_key)?;
            store.assign_user_site(user_id, site_id)?;
            println!("Granted {email} access to {site_key}.");
            Ok(())
        }
        UserCommand::Revoke { email, site_key } => {
            let user_id = user_id_by_email(&store, &email)?;
            let site_id = site_id_by_key(&store, &site_key)?;
            if store.remove_user_site(user_id, site_id)? {
                println!("Revoked {email} access to {site_key}.");
            } else {
                println!("No such grant.");
            }
            Ok(())
        }
    }
}
