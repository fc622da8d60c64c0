//! Best-effort pings that wake sibling services after an order is created.

use std::sync::Arc;

use tracing::debug;

#[derive(Clone)]
pub struct Warmup {
    client: reqwest::Client,
    urls: Arc<Vec<String>>,
}

impl Warmup {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            urls: Arc::new(urls),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Fires one `GET` per URL in the background. Never waits for, or
    /// reports, the result.
    pub fn ping_all(&self) {
        for url in self.urls.iter().cloned() {
            let client = self.client.clone();
            tokio::spawn(async move {
                match client.get(&url).send().await {
                    Ok(response) => debug!(%url, status = %response.status(), "warm-up ping"),
                    Err(e) => debug!(%url, error = %e, "warm-up ping failed"),
                }
            });
        }
    }
}
