//! Configuration file parser.
//!
//! The config is a single TOML file loaded once at startup and threaded
//! into constructors as an immutable value. Per-site settings live under
//! `[comment_sites.<key>]`; the key doubles as the public site identifier
//! in URLs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sqlite: SqliteConfig,
    pub smtp: Option<SmtpConfig>,
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub comment_sites: BTreeMap<String, SiteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server, e.g. ":8080" or "0.0.0.0:8080".
    pub listen: String,
    /// Upstreams whose X-Forwarded-For / X-Real-IP headers are honored.
    /// Entries are plain IPs or CIDRs.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the durable store file.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    /// 0 or absent means the transport default for the TLS policy.
    pub port: Option<u16>,
    pub from: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub tls_policy: TlsPolicy,
}

/// TLS policy for the outbound SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsPolicy {
    /// Plain SMTP, no TLS (e.g. a local relay on port 25).
    None,
    /// STARTTLS when the server offers it, plain otherwise.
    Opportunistic,
    /// Require TLS/STARTTLS, fail if unsupported.
    #[default]
    Mandatory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// HMAC key for session cookies.
    pub session_secret: String,
    /// Cookie name; defaults to "marginalia_session".
    pub session_name: Option<String>,
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl AuthConfig {
    pub fn session_name(&self) -> &str {
        match self.session_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "marginalia_session",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Human-readable label, synced into the sites table.
    #[serde(default)]
    pub title: String,
    /// Exact-match CORS allowlist for the public intake endpoint.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    /// Recipients of the moderation mail.
    #[serde(default)]
    pub admin_recipients: Vec<String>,
    /// HMAC key for decision tokens. Never logged.
    pub token_secret: String,
    /// IANA timezone used for generated filenames; defaults to UTC.
    pub timezone: Option<String>,
    pub captcha: Option<CaptchaConfig>,
    #[serde(default)]
    pub hugo: HugoConfig,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "turnstile" or "hcaptcha".
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HugoConfig {
    /// Skip the build step entirely when true.
    #[serde(default)]
    pub disabled: bool,
    /// Binary name or full path; defaults to "hugo".
    pub bin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    pub repo_url: String,
    pub branch: Option<String>,
    /// Embedded into the HTTPS clone URL as x-access-token auth.
    pub access_token: Option<String>,
    /// Working directory for the clone; defaults to ./website/<site_key>.
    pub clone_dir: Option<PathBuf>,
    /// Shallow-clone depth; 0 means full history.
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub recurse_submodules: bool,
    #[serde(default)]
    pub themes: Vec<ThemeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    pub repo_url: String,
    pub branch: Option<String>,
    /// Relative path inside the working directory; validated against
    /// absolute paths and `..` escapes before any filesystem operation.
    pub target_path: String,
    pub access_token: Option<String>,
    #[serde(default)]
    pub depth: u32,
    pub name: Option<String>,
}

impl SiteConfig {
    /// Resolve the working directory for this site's clone.
    pub fn workdir(&self, site_key: &str) -> PathBuf {
        match &self.git.clone_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => Path::new(".").join("website").join(site_key),
        }
    }

    pub fn hugo_bin(&self) -> &str {
        match self.hugo.bin.as_deref() {
            Some(bin) if !bin.trim().is_empty() => bin,
            _ => "hugo",
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Basic shape validation. Site keys must be non-empty after trimming
    /// (they appear in URLs and filesystem paths), and every site needs a
    /// token secret for its decision links.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen.trim().is_empty() {
            anyhow::bail!("server.listen must be set");
        }
        if self.sqlite.path.as_os_str().is_empty() {
            anyhow::bail!("sqlite.path must be set");
        }
        for (key, site) in &self.comment_sites {
            if key.trim().is_empty() || key.trim() != key {
                anyhow::bail!("comment_sites keys must be non-empty and trimmed, got {key:?}");
            }
            if site.token_secret.trim().is_empty() {
                anyhow::bail!("comment_sites.{key}.token_secret must be set");
            }
            if site.git.repo_url.trim().is_empty() {
                anyhow::bail!("comment_sites.{key}.git.repo_url must be set");
            }
        }
        if let Some(auth) = &self.auth {
            if auth.enabled && auth.session_secret.trim().is_empty() {
                anyhow::bail!("auth.session_secret must be set when auth is enabled");
            }
        }
        Ok(())
    }

    pub fn site(&self, site_key: &str) -> Option<&SiteConfig> {
        self.comment_sites.get(site_key)
    }

    /// Site keys mapped to titles, as consumed by the site synchronizer.
    pub fn site_titles(&self) -> BTreeMap<String, String> {
        self.comment_sites
            .iter()
            .map(|(k, v)| (k.clone(), v.title.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
listen = ":8080"
trusted_proxies = ["10.0.0.1", "172.16.0.0/12"]

[sqlite]
path = "/var/lib/marginalia/marginalia.db"

[smtp]
host = "smtp.example.org"
port = 587
from = "noreply@example.org"
tls_policy = "mandatory"

[auth]
enabled = true
session_secret = "sekrit"
cors_allowed_origins = ["https://admin.example.org"]

[comment_sites.blog]
title = "My Blog"
cors_allowed_origins = ["https://example.org"]
admin_recipients = ["admin@example.org"]
token_secret = "hunter2"
timezone = "Europe/Berlin"

[comment_sites.blog.git]
repo_url = "https://github.com/me/blog.git"
branch = "main"
depth = 1

[[comment_sites.blog.git.themes]]
repo_url = "https://github.com/me/theme.git"
target_path = "themes/paper"
"#;

    #[test]
    fn parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen, ":8080");
        assert_eq!(config.server.trusted_proxies.len(), 2);
        assert_eq!(config.smtp.as_ref().unwrap().tls_policy, TlsPolicy::Mandatory);

        let site = config.site("blog").unwrap();
        assert_eq!(site.title, "My Blog");
        assert_eq!(site.git.depth, 1);
        assert_eq!(site.git.themes.len(), 1);
        assert_eq!(site.git.themes[0].target_path, "themes/paper");
        assert!(!site.hugo.disabled);
    }

    #[test]
    fn from_file_roundtrip() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::from_file(f.path()).unwrap();
        assert!(config.site("blog").is_some());
        assert!(config.site("nope").is_none());
    }

    #[test]
    fn workdir_defaults_to_website_dir() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let site = config.site("blog").unwrap();
        assert_eq!(site.workdir("blog"), PathBuf::from("./website/blog"));
    }

    #[test]
    fn workdir_honors_clone_dir() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        let site = config.comment_sites.get_mut("blog").unwrap();
        site.git.clone_dir = Some(PathBuf::from("/srv/checkouts/blog"));
        assert_eq!(site.workdir("blog"), PathBuf::from("/srv/checkouts/blog"));
    }

    #[test]
    fn missing_token_secret_rejected() {
        let bad = SAMPLE.replace("token_secret = \"hunter2\"", "token_secret = \"\"");
        let config: Config = toml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_listen_rejected() {
        let bad = SAMPLE.replace("listen = \":8080\"", "listen = \"\"");
        let config: Config = toml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn site_titles_map() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let titles = config.site_titles();
        assert_eq!(titles.get("blog").map(String::as_str), Some("My Blog"));
    }
}
