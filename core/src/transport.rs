//! Blocking `Transport` backed by `ureq`.
//!
//! Status-as-error is disabled so 4xx/5xx responses come back as data and the
//! interpreter decides what they mean. Two agents are kept: one verifying
//! certificates and one that does not, picked per request.
//!
//! Bodies are read in full unless `with_body_limit` sets a cap; ureq's own
//! 10 MB default does not apply.

use std::time::Instant;

use tracing::{debug, warn};
use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::http::{HttpRequest, RawResponse, Transport};
use crate::target::wire_url;

#[derive(Clone)]
pub struct UreqTransport {
    verifying: Agent,
    relaxed: Agent,
    body_limit: u64,
}

impl UreqTransport {
    pub fn new() -> Self {
        let verifying = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        let relaxed = Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(TlsConfig::builder().disable_verification(true).build())
            .build()
            .new_agent();
        Self {
            verifying,
            relaxed,
            body_limit: u64::MAX,
        }
    }

    /// Cap on the number of body bytes read. Larger bodies are reported as a
    /// transport failure.
    pub fn with_body_limit(mut self, limit: u64) -> Self {
        self.body_limit = limit;
        self
    }

    fn agent(&self, request: &HttpRequest) -> &Agent {
        if request.accept_invalid_certs {
            &self.relaxed
        } else {
            &self.verifying
        }
    }

    fn execute(&self, request: &HttpRequest) -> Result<(u16, Vec<u8>), String> {
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(wire_url(&request.url));
        for (name, value) in request.wire_headers() {
            builder = builder.header(name, value);
        }

        let agent = self.agent(request);
        let mut response = match &request.body {
            Some(body) => {
                let req = builder.body(body.clone()).map_err(|e| e.to_string())?;
                agent.run(req).map_err(|e| e.to_string())?
            }
            None => {
                let req = builder.body(()).map_err(|e| e.to_string())?;
                agent.run(req).map_err(|e| e.to_string())?
            }
        };

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.body_limit)
            .read_to_vec()
            .map_err(|e| e.to_string())?;
        Ok((status, body))
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn perform(&self, request: &HttpRequest) -> RawResponse {
        let started = Instant::now();
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            auth = request.auth_mode(),
            "sending request"
        );
        match self.execute(request) {
            Ok((status, body)) => {
                debug!(
                    status,
                    bytes = body.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "received response"
                );
                RawResponse::new(status, body)
            }
            Err(error) => {
                warn!(url = %request.url, %error, "transport error");
                RawResponse::transport_failure(error)
            }
        }
    }
}
