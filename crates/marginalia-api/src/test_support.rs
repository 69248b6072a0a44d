//! Shared fixtures for handler tests.

use marginalia_core::Config;
use marginalia_pipeline::{EnqueueError, Enqueuer};
use marginalia_state::Store;
use std::sync::{Arc, Mutex};

use crate::ApiState;

/// Records enqueue calls; can be switched into a failure mode.
pub(crate) struct StubEnqueuer {
    pub requests: Mutex<Vec<(i64, String, Option<String>)>>,
    pub fail_with: Mutex<Option<EnqueueError>>,
}

impl StubEnqueuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        })
    }

    pub fn fail_with(&self, err: EnqueueError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }
}

impl Enqueuer for StubEnqueuer {
    fn enqueue_run(
        &self,
        run_id: i64,
        site_key: &str,
        comment_id: Option<&str>,
    ) -> Result<(), EnqueueError> {
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        self.requests
            .lock()
            .unwrap()
            .push((run_id, site_key.to_string(), comment_id.map(str::to_string)));
        Ok(())
    }
}

pub(crate) fn test_config() -> Arc<Config> {
    let toml = r#"
        [server]
        listen = ":0"
        trusted_proxies = ["10.0.0.1"]

        [sqlite]
        path = ":memory:"

        [auth]
        enabled = true
        session_secret = "session-secret"
        cors_allowed_origins = ["https://admin.example.org"]

        [comment_sites.blog]
        title = "Blog"
        cors_allowed_origins = ["https://example.org"]
        admin_recipients = ["admin@example.org"]
        token_secret = "hunter2"

        [comment_sites.blog.git]
        repo_url = "https://github.com/me/blog.git"
    "#;
    Arc::new(toml::from_str(toml).expect("test config parses"))
}

/// In-memory state with one synced site ("blog") and a stub enqueuer.
pub(crate) fn seeded_state() -> (ApiState, i64, Arc<StubEnqueuer>) {
    let config = test_config();
    let store = Store::open_in_memory().unwrap();
    store.sync_sites(&config.site_titles()).unwrap();
    let site_id = store.site_id_by_key("blog").unwrap().unwrap();

    let enqueuer = StubEnqueuer::new();
    let state = ApiState {
        store,
        config,
        enqueuer: Some(enqueuer.clone()),
        mailer: None,
    };
    (state, site_id, enqueuer)
}
