//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The client
//! builds `HttpRequest` values and interprets `RawResponse` values; executing
//! the round-trip is the job of a `Transport`. Hosts that own their own I/O can
//! skip the facade's transport entirely and feed `RawResponse`s to the
//! interpreter directly.
//!
//! A transport never fails: DNS, TLS or timeout problems come back as a
//! `RawResponse` with no body and a `transport_error`. 4xx and 5xx statuses
//! are ordinary responses.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::Auth;

/// Sent on every request.
pub const USER_AGENT: &str = "flexibee-core (https://www.flexibee.eu/api/)";

/// Header carrying the session token in session-token mode.
pub const SESSION_HEADER: &str = "X-authSessionId";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub auth: Auth,
    /// Skip certificate verification for this request.
    pub accept_invalid_certs: bool,
}

impl HttpRequest {
    /// The header that authenticates this request.
    pub fn auth_header(&self) -> (String, String) {
        match &self.auth {
            Auth::Basic { user, password } => {
                let encoded = STANDARD.encode(format!("{user}:{password}"));
                ("Authorization".to_string(), format!("Basic {encoded}"))
            }
            Auth::SessionToken(token) => (SESSION_HEADER.to_string(), token.clone()),
        }
    }

    /// All headers to put on the wire: caller headers, auth and user agent.
    pub fn wire_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        headers.push(self.auth_header());
        headers.push(("User-Agent".to_string(), USER_AGENT.to_string()));
        headers
    }

    pub fn auth_mode(&self) -> &'static str {
        match self.auth {
            Auth::Basic { .. } => "basic",
            Auth::SessionToken(_) => "session",
        }
    }
}

/// What a transport hands back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// `None` when the transport failed before a body was read.
    pub body: Option<Vec<u8>>,
    pub transport_error: Option<String>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: Some(body.into()),
            transport_error: None,
        }
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: None,
            transport_error: Some(message.into()),
        }
    }
}

/// Performs exactly one HTTP request per call. No retries.
pub trait Transport {
    fn perform(&self, request: &HttpRequest) -> RawResponse;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn perform(&self, request: &HttpRequest) -> RawResponse {
        (**self).perform(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn perform(&self, request: &HttpRequest) -> RawResponse {
        (**self).perform(request)
    }
}
