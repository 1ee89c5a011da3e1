//! [`Fetcher`] backed by a `reqwest` client.

use async_trait::async_trait;
use cachet_types::{Error, FetchOptions, Fetcher, Request, RequestMode, Response, ResponseKind, Result};
use tracing::{debug, trace};

/// Forwards requests to the host HTTP client.
///
/// Only a shim: redirects, TLS and connection pooling are whatever the
/// wrapped client does.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request, options: &FetchOptions) -> Result<Response> {
        let mut headers = request.headers().clone();
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self
            .client
            .request(request.method().clone(), request.url().as_str())
            .headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        trace!(method = %request.method(), url = %request.url(), "sending request");
        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(url = %final_url, status, bytes = body.len(), "fetched");

        let kind = match request.mode() {
            RequestMode::Cors => ResponseKind::Cors,
            _ => ResponseKind::Basic,
        };

        Ok(Response::new(status, body)
            .with_kind(kind)
            .with_headers(headers)
            .with_url(final_url))
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Transport(format!("request timed out: {err}"))
    } else {
        Error::Transport(err.to_string())
    }
}
