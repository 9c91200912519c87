use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, info};

use super::ChainSource;
use super::types::{ChainPayload, SymbolKind};
use crate::error::{IngestError, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.nseindia.com";

const LANDING_PATH: &str = "/option-chain";
const INDEX_CHAIN_PATH: &str = "/api/option-chain-indices?symbol=";
const EQUITY_CHAIN_PATH: &str = "/api/option-chain-equities?symbol=";

// The API refuses requests that don't look like they come from a browser.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/80.0.3987.149 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "en,gu;q=0.9,hi;q=0.8";

/// HTTP session for one instrument's option chain.
///
/// The first fetch loads the landing page to obtain session cookies, following
/// any redirects and collecting cookies set along the way. The resulting
/// `Cookie` header is frozen for the lifetime of the client and attached to
/// every data request; it is never refreshed. A rejected session surfaces as a
/// transport or format error and the process is expected to restart.
pub struct NseClient {
    /// Data requests. Carries no cookie store so the session stays frozen.
    http: reqwest::Client,
    /// Landing-page requests, recording every `Set-Cookie` into `jar`.
    bootstrap_http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
    symbol: String,
    kind: SymbolKind,
    bootstrapped: bool,
    cookies: Option<HeaderValue>,
}

impl NseClient {
    pub fn new(symbol: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = client_builder(timeout).build()?;
        let bootstrap_http = client_builder(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        let kind = SymbolKind::classify(symbol);
        if kind == SymbolKind::Equity {
            debug!(symbol, "using equity option-chain endpoint");
        }

        Ok(NseClient {
            http,
            bootstrap_http,
            jar,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
            kind,
            bootstrapped: false,
            cookies: None,
        })
    }

    pub fn landing_url(&self) -> String {
        format!("{}{}", self.base_url, LANDING_PATH)
    }

    pub fn chain_url(&self) -> String {
        let path = match self.kind {
            SymbolKind::Index => INDEX_CHAIN_PATH,
            SymbolKind::Equity => EQUITY_CHAIN_PATH,
        };
        format!("{}{}{}", self.base_url, path, self.symbol)
    }

    pub fn has_session(&self) -> bool {
        self.bootstrapped
    }

    /// The frozen `Cookie` header, if the landing page set any cookies.
    pub fn session_cookies(&self) -> Option<&HeaderValue> {
        self.cookies.as_ref()
    }

    async fn bootstrap(&mut self) -> Result<()> {
        let landing = self.landing_url();
        let url = reqwest::Url::parse(&landing)
            .map_err(|e| IngestError::Format(format!("invalid landing url {landing}: {e}")))?;
        info!(url = %url, "bootstrapping upstream session");

        let resp = self.bootstrap_http.get(url.clone()).send().await?;
        check_status(resp, &landing)?;

        self.cookies = self.jar.cookies(&url);
        match &self.cookies {
            Some(_) => debug!("session cookies captured"),
            None => debug!("landing page set no cookies"),
        }
        self.bootstrapped = true;
        Ok(())
    }
}

#[async_trait]
impl ChainSource for NseClient {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn fetch(&mut self) -> Result<ChainPayload> {
        if !self.bootstrapped {
            self.bootstrap().await?;
        }

        let url = self.chain_url();
        debug!(url = %url, "fetching option chain");

        let mut req = self.http.get(&url);
        if let Some(cookies) = &self.cookies {
            req = req.header(header::COOKIE, cookies.clone());
        }
        let resp = check_status(req.send().await?, &url)?;
        let body = resp.text().await?;

        ChainPayload::parse(&body)
    }
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
}

fn check_status(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(IngestError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}
