use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;

use crate::retry::{DiagnosticSource, Retrier};

const QUOTE_TIMEOUT_SECONDS: u64 = 3;
/// Quote lookups never borrow the command retry budget.
pub const QUOTE_MAX_ATTEMPTS: usize = 1;
const QUOTE_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
struct HitokotoPayload {
    hitokoto: String,
}

/// Fetches a one-line quote from a hitokoto-compatible endpoint.
///
/// Requests go through their own single-attempt [`Retrier`], which has no
/// diagnostic source, so a failing quote service cannot recurse into itself and
/// adds at most one request timeout to each failed remote attempt.
#[derive(Debug, Clone)]
pub struct HitokotoQuotes {
    http: HttpClient,
    url: String,
    retrier: Retrier,
}

impl HitokotoQuotes {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(QUOTE_TIMEOUT_SECONDS))
            .build()
            .context("failed to build quote HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
            retrier: Retrier::new(QUOTE_MAX_ATTEMPTS, QUOTE_RETRY_DELAY),
        })
    }

    fn request(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .with_context(|| format!("quote request failed ({})", self.url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("quote request failed, status {}", status.as_u16());
        }
        let payload: HitokotoPayload = response
            .json()
            .context("quote service returned invalid JSON")?;
        Ok(payload.hitokoto)
    }
}

impl DiagnosticSource for HitokotoQuotes {
    fn fetch(&self) -> Result<String> {
        self.retrier.run("hitokoto", || self.request())
    }
}
