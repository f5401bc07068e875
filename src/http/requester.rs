//! Probe transport.
//!
//! Every boolean question asked of the target goes through [`Probe::send`].
//! The production implementation, [`Requester`], injects the payload into
//! the request template and performs one full HTTP round-trip per probe.

use crate::error::{Error, Result};
use crate::http::template::RequestTemplate;
use crate::oracle::fingerprint::Fingerprint;
use reqwest::{header, redirect::Policy, Client, Method};
use std::time::{Duration, Instant};

/// One fingerprinted HTTP response. The body is digested into the
/// fingerprint at read time; nothing downstream needs the raw bytes.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub fingerprint: Fingerprint,
    pub elapsed: Duration,
}

/// Sends one boolean condition through the injection point.
#[allow(async_fn_in_trait)]
pub trait Probe {
    async fn send(&mut self, condition: &str) -> Result<ProbeResponse>;
}

/// Transport settings shared by both CLI verbs.
#[derive(Debug, Clone, Default)]
pub struct RequesterOptions {
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub signal_string: Option<String>,
    /// `Name: value` pairs that override template headers.
    pub custom_headers: Vec<String>,
}

/// HTTP requester with payload injection, transient-error retry, and
/// response fingerprinting.
pub struct Requester {
    template: RequestTemplate,
    client: Client,
    signal_string: Option<String>,
    custom_headers: Vec<(String, String)>,
    request_num: u32,
}

impl Requester {
    pub fn new(template: RequestTemplate, options: &RequesterOptions) -> Result<Self> {
        // Fresh TCP connection per request so intermediate caches and stale
        // keep-alive state never contaminate the oracle. Status codes are
        // part of the signal, so redirects are never followed.
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .pool_max_idle_per_host(0)
            .timeout(Duration::from_secs(options.timeout_secs.max(1)));

        if let Some(proxy_url) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| Error::InvalidRequest(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
            tracing::debug!("using proxy: {proxy_url}");
        }

        let client = builder.build()?;

        let custom_headers = options
            .custom_headers
            .iter()
            .filter_map(|h| {
                h.split_once(':')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            })
            .collect();

        Ok(Self {
            template,
            client,
            signal_string: options.signal_string.clone(),
            custom_headers,
            request_num: 0,
        })
    }

    pub fn host(&self) -> &str {
        &self.template.host
    }

    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    pub fn request_count(&self) -> u32 {
        self.request_num
    }

    /// Send a raw request (no marker substitution), keeping this requester's
    /// scheme, client, and headers. Used by the discovery scanner.
    pub async fn send_raw(&mut self, raw: &str) -> Result<ProbeResponse> {
        let mut template = RequestTemplate::parse(raw)?;
        template.scheme = self.template.scheme.clone();
        self.dispatch(&template).await
    }

    async fn dispatch(&mut self, built: &RequestTemplate) -> Result<ProbeResponse> {
        let url = built.target_url();
        let method = Method::from_bytes(built.method.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("invalid method: {}", built.method)))?;

        let mut last_err = Error::Transport("no attempt made".into());
        for attempt in 0..3u32 {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                tracing::debug!("retrying request ({}/3)", attempt + 1);
            }

            match self.attempt(built, &method, &url).await {
                Ok(resp) => return Ok(resp),
                // Only transport-level failures retry. Any received HTTP
                // response, whatever its status, is an answer.
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn attempt(
        &self,
        built: &RequestTemplate,
        method: &Method,
        url: &str,
    ) -> Result<ProbeResponse> {
        let mut request = self.client.request(method.clone(), url);

        for (key, value) in &built.headers {
            if key.eq_ignore_ascii_case("host") || key.eq_ignore_ascii_case("content-length") {
                continue;
            }
            request = request.header(key.as_str(), value.as_str());
        }

        for (key, value) in &self.custom_headers {
            request = request.header(key.as_str(), value.as_str());
        }

        // Cache busting, so proxies never replay a previous oracle answer.
        request = request
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(header::PRAGMA, "no-cache")
            .header(header::CONNECTION, "close");

        if !built.body.is_empty() {
            request = request.body(built.body.clone());
        }

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        let elapsed = start.elapsed();

        let fingerprint = Fingerprint::new(status, &body, self.signal_string.as_deref());

        Ok(ProbeResponse {
            status,
            fingerprint,
            elapsed,
        })
    }
}

impl Probe for Requester {
    async fn send(&mut self, condition: &str) -> Result<ProbeResponse> {
        self.request_num += 1;

        let built = self.template.build(condition)?;

        tracing::debug!(
            "[req #{}] {} {} (payload: {})",
            self.request_num,
            built.method,
            built.target_url(),
            truncate(condition, 50)
        );

        let resp = self.dispatch(&built).await?;

        tracing::debug!(
            "[resp #{}] status: {}, words: {}, length: {}, time: {}ms",
            self.request_num,
            resp.fingerprint.status,
            resp.fingerprint.word_count,
            resp.fingerprint.content_length,
            resp.elapsed.as_millis()
        );

        Ok(resp)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}
