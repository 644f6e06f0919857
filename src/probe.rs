//! Endpoint probing
//!
//! Walks the configured candidate URLs in priority order and returns the first
//! one that serves a real page. Failed candidates are logged and skipped; only
//! total exhaustion is reported to the caller, as `None`.

use once_cell::sync::Lazy;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ProbeSettings;

/// Characters of a URL shown in progress messages.
const URL_PREVIEW_CHARS: usize = 50;

/// The provider serves a stripped-down page (or nothing) to clients that do
/// not look like a desktop browser.
static BROWSER_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
             image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("pt-PT,pt;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6"),
    );
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers
});

/// Why a single candidate was rejected.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("body too short: {chars} chars, need more than {min}")]
    TooShort { chars: usize, min: usize },
}

/// The endpoint that answered and what it served.
#[derive(Debug, Clone)]
pub struct Probed {
    pub url: String,
    pub body: String,
}

/// Build the HTTP client used for every probe in a run.
///
/// Certificate validation is disabled on purpose: the provider's chain does
/// not verify against the default trust store. Do not reuse this client for
/// other hosts.
pub fn build_client(settings: &ProbeSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(settings.timeout())
        .default_headers(BROWSER_HEADERS.clone())
        .danger_accept_invalid_certs(true)
        .build()
}

pub struct Prober<'a> {
    client: &'a Client,
    min_body_chars: usize,
}

impl<'a> Prober<'a> {
    pub fn new(client: &'a Client, min_body_chars: usize) -> Self {
        Self {
            client,
            min_body_chars,
        }
    }

    /// Single GET against one candidate, no retries.
    pub async fn attempt(&self, url: &str) -> Result<String, ProbeError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ProbeError::Status(status));
        }

        let body = resp.text().await?;

        let chars = body.chars().count();
        if chars <= self.min_body_chars {
            return Err(ProbeError::TooShort {
                chars,
                min: self.min_body_chars,
            });
        }

        Ok(body)
    }

    /// First candidate that passes `attempt`, trying them one at a time.
    pub async fn probe(&self, urls: &[String]) -> Option<Probed> {
        for url in urls {
            info!("[PROBE] Trying {}...", preview(url));

            match self.attempt(url).await {
                Ok(body) => {
                    info!("[PROBE] Endpoint OK: {}", preview(url));
                    debug!(url = %url, bytes = body.len(), "probe succeeded");
                    return Some(Probed {
                        url: url.clone(),
                        body,
                    });
                }
                Err(e) => warn!("[PROBE] Endpoint failed ({}): {}", preview(url), e),
            }
        }

        None
    }
}

fn preview(url: &str) -> &str {
    match url.char_indices().nth(URL_PREVIEW_CHARS) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}
