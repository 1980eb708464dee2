//! CLI command modules

pub mod apidoc;
pub mod call;
pub mod status;
pub mod tasks;

use std::sync::Arc;

use anyhow::{Context, Result};
use habit_core::{ApiDocCache, ApiProxy, Connection, EndpointNode, UreqTransport};

use crate::config::Config;

/// Loaded configuration plus a proxy positioned at the API root.
pub struct Session {
    pub config: Config,
    pub api: ApiProxy,
}

impl Session {
    pub fn open(config: Config) -> Result<Self> {
        let cache = ApiDocCache::new(config.cache_path());
        let transport = UreqTransport::new(config.timeout());
        let (text, source) = cache
            .load(&transport, &config.apidoc_url)
            .context("loading api documentation")?;
        tracing::debug!(?source, path = %cache.path().display(), "api documentation loaded");
        Self::from_apidoc(config, &text)
    }

    pub fn from_apidoc(config: Config, apidoc: &str) -> Result<Self> {
        let (tree, skipped) = EndpointNode::from_apidoc(apidoc).context("parsing api documentation")?;
        if !skipped.is_empty() {
            tracing::debug!(count = skipped.len(), "skipped unrecognised documentation lines");
        }
        let connection = Connection::blocking(config.client_config());
        let api = ApiProxy::new(Arc::new(tree), Arc::new(connection))
            .context("api documentation does not describe /api/v3")?;
        Ok(Self { config, api })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Mock service on a random port and a session configured for it.
    pub fn mock_session() -> Session {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });

        let config = Config {
            url: format!("http://{addr}"),
            login: mock_server::TEST_USER.to_string(),
            password: mock_server::TEST_KEY.to_string(),
            timeout_secs: 5,
            ..Config::default()
        };
        Session::from_apidoc(config, mock_server::APIDOC).unwrap()
    }
}
