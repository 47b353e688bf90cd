//! Blocking HTTP transport.
//!
//! [`HttpClient`] sends [`HttpRequest`]s with `reqwest`, optionally through a proxy, and hands the
//! response body to a [`FragmentStream`].

use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::{
    Error, http_request::HttpRequest, openai, session::Completions, stream::FragmentStream,
};

/// Client-level timeout, covering connecting, sending and reading the whole reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings for building an [`HttpClient`].
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Proxy used for all requests.
    pub proxy: Option<Url>,
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

/// A blocking HTTP client for the completion API.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    /// Builds the underlying `reqwest` client.
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        let mut builder = reqwest::blocking::Client::builder().timeout(config.timeout);

        if let Some(ref proxy) = config.proxy {
            info!(host = proxy.host_str().unwrap_or_default(), "routing requests through proxy");
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        if config.accept_invalid_certs {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Completions for HttpClient {
    type Stream = FragmentStream<reqwest::blocking::Response>;

    fn stream(&self, request: HttpRequest) -> Result<Self::Stream, Error> {
        debug!(url = %request.url(), "sending completion request");

        let response = request.try_into_reqwest_blocking(&self.client)?.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text()?;
            return Err(status_error(status.as_u16(), body));
        }

        debug!(%status, "reply stream opened");
        Ok(FragmentStream::new(response))
    }
}

/// Turns the body of a non-success response into an error, decoding the API's error envelope if
/// there is one.
fn status_error(status: u16, body: String) -> Error {
    match openai::deserialize_error(&body) {
        Some(error) => {
            debug!(status, code = ?error.code, "API returned an error");
            Error::Api(error)
        }
        None => Error::Status { status, body },
    }
}
