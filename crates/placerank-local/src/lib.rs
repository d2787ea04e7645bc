use placerank_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod dom;
pub mod engine;
pub mod profile;

/// reqwest-backed [`FetchBackend`].
///
/// One client per invocation; nothing is shared or persisted across runs.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            // Safety defaults: avoid "hang forever" on DNS/TLS/body stalls.
            // The per-request budget (FetchRequest.timeout) still overrides.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    fn apply_headers(
        mut rb: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        // Best-effort: a header that fails to encode is dropped, not fatal.
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                rb = rb.header(name, value);
            }
        }
        rb
    }
}

fn classify_reqwest_error(e: &reqwest::Error, url: &str) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{url}: {e}"))
    } else {
        Error::Fetch(e.to_string())
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut rb = self.client.get(url);
        rb = Self::apply_headers(rb, &req.headers);
        if let Some(t) = req.timeout {
            rb = rb.timeout(t);
        }

        let resp = rb
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, &req.url))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e, &req.url))?
            .to_vec();

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            bytes,
        })
    }
}
