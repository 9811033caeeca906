//! HTTP session shared by the fetches of one round.
//!
//! A [`Session`] wraps a connection-pooling `reqwest::Client` configured with
//! the user's headers and cookies. The requester opens one per round and
//! drops it when the round ends, so no connections outlive a retry.

use crate::config::SessionConfig;
use crate::cookies::{load_cookie_file, normalize_cookie_header};
use crate::error::RequesterError;
use reqwest::cookie::Jar;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reusable recipe for opening sessions.
///
/// Headers are validated and the cookie file is read once; every
/// [`Session`] opened from the same recipe shares them.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    headers: HeaderMap,
    user_agent: String,
    jar: Option<Arc<Jar>>,
    timeout: Duration,
    delay: Duration,
}

impl SessionFactory {
    /// Builds a factory from configuration.
    pub fn new(config: &SessionConfig) -> Result<Self, RequesterError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RequesterError::Session(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RequesterError::Session(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }

        if let Some(raw) = config.cookie.as_deref() {
            let cookie = normalize_cookie_header(raw);
            if !cookie.is_empty() {
                let value = HeaderValue::from_str(&cookie)
                    .map_err(|e| RequesterError::Session(format!("cookie: {e}")))?;
                headers.insert(COOKIE, value);
            }
        }

        let jar = match config.cookie_file.as_deref() {
            Some(path) => {
                let (jar, loaded) = load_cookie_file(path)
                    .map_err(|e| RequesterError::Session(e.to_string()))?;
                debug!(path = %path.display(), loaded, "loaded cookie file");
                Some(jar)
            }
            None => None,
        };

        let timeout = Duration::try_from_secs_f64(config.timeout_sec)
            .map_err(|e| RequesterError::Session(format!("timeout: {e}")))?;
        let delay = Duration::try_from_secs_f64(config.delay_between_requests_sec)
            .map_err(|e| RequesterError::Session(format!("delay: {e}")))?;

        Ok(Self {
            headers,
            user_agent: config.user_agent.clone(),
            jar,
            timeout,
            delay,
        })
    }

    /// Opens a new session with its own connection pool.
    pub fn open(&self) -> Result<Session, RequesterError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .default_headers(self.headers.clone())
            .timeout(self.timeout);
        builder = match &self.jar {
            Some(jar) => builder.cookie_provider(Arc::clone(jar)),
            None => builder.cookie_store(true),
        };

        let client = builder
            .build()
            .map_err(|e| RequesterError::Session(e.to_string()))?;

        Ok(Session {
            client,
            delay: self.delay,
        })
    }
}

/// An open HTTP session.
#[derive(Debug, Clone)]
pub struct Session {
    client: reqwest::Client,
    delay: Duration,
}

impl Session {
    /// The underlying HTTP client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Waits the configured delay before a request.
    pub async fn rate_limit(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
