//! Blocking client core for the Flexibee accounting API.
//!
//! # Overview
//! Builds request targets for one evidence (resource type), performs them
//! through a `Transport`, and interprets the loosely shaped `winstrom`
//! envelopes the server answers with into `EvidenceResult` records or a
//! `FlexibeeError`.
//!
//! # Design
//! - `Config` is validated once and never mutated; auth and TLS relaxation
//!   are derived from it per request.
//! - Every operation is split into `build_*` (produces an `HttpRequest`) and
//!   interpretation of the `RawResponse`, so the I/O boundary is explicit and
//!   hosts can run their own transport.
//! - `envelope` and `interpret` are stateless. All failure classification
//!   happens there, in a fixed order: transport, status code, body, evidence.
//! - `UreqTransport` (feature `ureq`, default) performs one blocking request
//!   per call, with no retries.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod interpret;
pub mod result;
pub mod target;
#[cfg(feature = "ureq")]
pub mod transport;

pub use client::FlexibeeClient;
pub use config::{Auth, Config};
pub use envelope::{Envelope, Payload, Response};
pub use error::{ConfigError, FlexibeeError};
pub use http::{HttpMethod, HttpRequest, RawResponse, Transport};
pub use interpret::{Interpreter, Strictness};
pub use result::{EvidenceResult, Lookup, Page, SaveResponse};
pub use target::{Identifier, QueryOptions, UrlBuilder};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
