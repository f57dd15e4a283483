use std::future::Future;

use tracing::{debug, info};

use crate::error::{Error, Result};

const LISTING_SUFFIX: &str = "/repositories";
const USER_AGENT: &str = concat!("gh_repo_etl/", env!("CARGO_PKG_VERSION"));

/// A fetched listing page. Only a 200 body is worth parsing.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub source_url: String,
    pub status: u16,
    pub body: String,
}

impl RawPage {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Single-shot GET. The status is returned as-is; the caller decides what a
/// non-200 means.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<RawPage>> + Send;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Client)?;
        Ok(HttpFetcher { client })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPage> {
        let transport = |source| Error::Transport {
            url: url.to_string(),
            source,
        };

        info!("Fetching {}", url);
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;
        debug!("{} -> {} ({} bytes)", url, status, body.len());

        Ok(RawPage {
            source_url: url.to_string(),
            status,
            body,
        })
    }
}

/// The repository listing page of an organization URL.
pub fn listing_url(org_url: &str) -> String {
    let base = org_url.trim_end_matches('/');
    if base.ends_with(LISTING_SUFFIX) {
        base.to_string()
    } else {
        format!("{}{}", base, LISTING_SUFFIX)
    }
}
