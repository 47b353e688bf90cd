//! Abstract HTTP request.
//!
//! The [`HttpRequest`] type represents an HTTP request that can (and should) be sent to the
//! completion API, without committing to a specific HTTP client.
//!
//! An [`HttpRequest`] can be turned into a [`reqwest::blocking::RequestBuilder`] using
//! [`HttpRequest::try_into_reqwest_blocking`].

use std::{fmt, sync::Arc};

use crate::Error;

/// HTTP request encapsulation.
///
/// This type represents an HTTP request. Supports pretty-printing the request as a string (through
/// the [`std::fmt::Display`] trait), which is what trace-level logging shows.
#[derive(Debug)]
pub struct HttpRequest {
    /// Request host.
    pub host: String,
    /// Request path.
    pub path: String,
    /// HTTP method.
    pub method: &'static str,
    /// Request headers.
    pub headers: Vec<(&'static str, Arc<str>)>,
    /// Request body.
    pub body: String,
}

impl HttpRequest {
    /// Renders the headers as a string.
    ///
    /// The returned string is suitable for use in an HTTP request unaltered. Does not include the
    /// `Host` header.
    pub fn render_headers(&self) -> String {
        self.headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v.as_ref()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the full URL this request targets.
    pub fn url(&self) -> String {
        format!("https://{}{}", self.host, self.path)
    }

    /// Converts this [`HttpRequest`] into a [`reqwest::blocking::RequestBuilder`] using the
    /// provided client.
    ///
    /// Invalid header values surface as errors once the builder is sent.
    pub fn try_into_reqwest_blocking(
        self,
        client: &reqwest::blocking::Client,
    ) -> Result<reqwest::blocking::RequestBuilder, Error> {
        let method = reqwest::Method::from_bytes(self.method.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("invalid method `{}`", self.method)))?;

        let mut request_builder = client.request(method, self.url()).body(self.body);

        for (key, value) in self.headers {
            request_builder = request_builder.header(key, value.as_ref());
        }

        Ok(request_builder)
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} HTTP/1.1", self.method, self.path)?;

        writeln!(f, "Host: {}", self.host)?;
        for (key, value) in &self.headers {
            // Never print the bearer token.
            if *key == "authorization" {
                writeln!(f, "{}: <redacted>", key)?;
            } else {
                writeln!(f, "{}: {}", key, value.as_ref())?;
            }
        }

        // Empty line between headers and body
        writeln!(f)?;

        write!(f, "{}", self.body)?;

        Ok(())
    }
}
