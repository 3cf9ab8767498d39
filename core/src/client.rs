//! Resource-oriented client facade.
//!
//! # Design
//! `FlexibeeClient` holds an immutable `Config`, the derived `UrlBuilder` and
//! `Interpreter`, and a `Transport`. Each operation is split the same way:
//! a `build_*` method produces an `HttpRequest`, the transport performs it, and
//! the interpreter turns the `RawResponse` into records or an error. Hosts that
//! run their own I/O can call the `build_*` methods and hand the responses to
//! `interpreter()` themselves.
//!
//! The facade only orchestrates. Everything that decides success or failure
//! lives in `interpret`.

use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::envelope::{self, Envelope, Payload, Response, WRAPPER_KEY};
use crate::error::FlexibeeError;
use crate::http::{HttpMethod, HttpRequest, RawResponse, Transport};
use crate::interpret::{check_status, Interpreter, Strictness};
use crate::result::{EvidenceResult, Lookup, Page, SaveResponse};
use crate::target::{Identifier, QueryOptions, UrlBuilder};

#[cfg(feature = "ureq")]
use crate::transport::UreqTransport;

/// Relation set holding user-defined links between records.
const USER_RELATIONS: &str = "uzivatelske-vazby";

pub struct FlexibeeClient<T> {
    config: Config,
    urls: UrlBuilder,
    interpreter: Interpreter,
    transport: T,
}

#[cfg(feature = "ureq")]
impl FlexibeeClient<UreqTransport> {
    /// Client performing blocking HTTP with `ureq`.
    pub fn new(config: Config) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> FlexibeeClient<T> {
    pub fn with_transport(config: Config, transport: T) -> Self {
        Self {
            urls: UrlBuilder::new(&config),
            interpreter: Interpreter::new(config.evidence()),
            config,
            transport,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn urls(&self) -> &UrlBuilder {
        &self.urls
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: Vec::new(),
            body: None,
            auth: self.config.auth(),
            accept_invalid_certs: self.config.accepts_invalid_certs(),
        }
    }

    /// Request carrying `{"winstrom": payload}` as JSON.
    fn json_request(&self, method: HttpMethod, url: String, payload: Value) -> Result<HttpRequest, FlexibeeError> {
        let mut wrapper = Map::new();
        wrapper.insert(WRAPPER_KEY.to_string(), payload);
        let body = serde_json::to_vec(&wrapper).map_err(|e| FlexibeeError::Serialization(e.to_string()))?;
        let mut req = self.request(method, url);
        req.headers.push(("Content-Type".to_string(), "application/json".to_string()));
        req.body = Some(body);
        Ok(req)
    }

    pub fn build_get(&self, identifier: &Identifier, options: &QueryOptions) -> HttpRequest {
        self.request(HttpMethod::Get, self.urls.create_uri(identifier, options))
    }

    pub fn build_search(&self, filter: &str, options: &QueryOptions) -> HttpRequest {
        self.request(HttpMethod::Get, self.urls.create_filter_query(filter, options))
    }

    pub fn build_save(
        &self,
        mut data: Map<String, Value>,
        id: Option<i64>,
        dry_run: bool,
        options: &QueryOptions,
    ) -> Result<HttpRequest, FlexibeeError> {
        if let Some(id) = id {
            data.insert("id".to_string(), json!(id));
        }
        let options = if dry_run { options.clone().dry_run() } else { options.clone() };
        let mut payload = Map::new();
        payload.insert(self.config.evidence().to_string(), Value::Object(data));
        self.json_request(
            HttpMethod::Put,
            self.urls.create_uri(&Identifier::All, &options),
            Value::Object(payload),
        )
    }

    pub fn build_delete(&self, identifier: &Identifier, dry_run: bool) -> HttpRequest {
        let options = if dry_run { QueryOptions::new().dry_run() } else { QueryOptions::new() };
        self.request(HttpMethod::Delete, self.urls.create_uri(identifier, &options))
    }

    /// Arbitrary call against the evidence. A body is placed directly under
    /// `winstrom`, so it names the evidence key itself.
    pub fn build_call(
        &self,
        method: HttpMethod,
        identifier: &Identifier,
        options: &QueryOptions,
        body: Option<Value>,
    ) -> Result<HttpRequest, FlexibeeError> {
        let url = self.urls.create_uri(identifier, options);
        match body {
            Some(body) => self.json_request(method, url, body),
            None => Ok(self.request(method, url)),
        }
    }

    pub fn build_pdf(&self, id: i64, options: &QueryOptions) -> HttpRequest {
        self.request(HttpMethod::Get, self.urls.create_pdf_url(id, options))
    }

    pub fn build_backup(&self) -> HttpRequest {
        self.request(HttpMethod::Get, self.urls.create_backup_url())
    }

    pub fn build_restore(&self, company: &str, data: Vec<u8>) -> HttpRequest {
        let mut req = self.request(HttpMethod::Put, self.urls.create_restore_url(company));
        req.body = Some(data);
        req
    }

    pub fn build_changes_status(&self) -> HttpRequest {
        self.request(HttpMethod::Get, self.urls.create_changes_status_url())
    }

    pub fn build_changes(&self, options: &QueryOptions) -> HttpRequest {
        self.request(HttpMethod::Get, self.urls.create_changes_url(options))
    }

    /// Exchange the configured credentials for a session and refresh token.
    pub fn build_auth_token(&self) -> HttpRequest {
        let form = QueryOptions::new()
            .set("username", self.config.user())
            .set("password", self.config.password())
            .to_query_string();
        let mut req = self.request(HttpMethod::Post, self.urls.create_auth_token_url());
        req.headers.push((
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        ));
        req.body = Some(form.into_bytes());
        req
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    fn perform(&self, request: &HttpRequest) -> RawResponse {
        self.transport.perform(request)
    }

    /// Single-record lookup as a tagged outcome.
    pub fn lookup(&self, identifier: &Identifier, options: &QueryOptions) -> Result<Lookup, FlexibeeError> {
        let raw = self.perform(&self.build_get(identifier, options));
        self.interpreter.lookup(&raw, Strictness::Strict)
    }

    pub fn get_by_id(&self, id: i64, options: &QueryOptions) -> Result<EvidenceResult, FlexibeeError> {
        self.lookup(&Identifier::Id(id), options)?.into_result()
    }

    pub fn get_by_code(&self, code: &str, options: &QueryOptions) -> Result<EvidenceResult, FlexibeeError> {
        self.lookup(&Identifier::Code(code.to_string()), options)?.into_result()
    }

    /// Like `get_by_id`, but a missing record is an empty result.
    pub fn find_by_id(&self, id: i64, options: &QueryOptions) -> Result<EvidenceResult, FlexibeeError> {
        Ok(self.lookup(&Identifier::Id(id), options)?.or_empty())
    }

    pub fn find_by_code(&self, code: &str, options: &QueryOptions) -> Result<EvidenceResult, FlexibeeError> {
        Ok(self.lookup(&Identifier::Code(code.to_string()), options)?.or_empty())
    }

    pub fn all_in_evidence(&self) -> Result<Vec<EvidenceResult>, FlexibeeError> {
        let raw = self.perform(&self.build_get(&Identifier::All, &QueryOptions::new().limit(0)));
        self.interpreter.results(&raw)
    }

    pub fn chunk_in_evidence(&self, start: u64, limit: u64) -> Result<Vec<EvidenceResult>, FlexibeeError> {
        let options = QueryOptions::new().start(start).limit(limit);
        let raw = self.perform(&self.build_get(&Identifier::All, &options));
        self.interpreter.results(&raw)
    }

    pub fn paginated_in_evidence(&self, start: u64, limit: u64) -> Result<Page, FlexibeeError> {
        let options = QueryOptions::new().start(start).limit(limit).add_row_count();
        let raw = self.perform(&self.build_get(&Identifier::All, &options));
        self.interpreter.page(&raw)
    }

    pub fn count_in_evidence(&self) -> Result<u64, FlexibeeError> {
        let options = QueryOptions::new().add_row_count();
        let raw = self.perform(&self.build_get(&Identifier::All, &options));
        Ok(self.interpreter.check(&raw)?.row_count().unwrap_or(0))
    }

    pub fn search_in_evidence(&self, filter: &str, options: &QueryOptions) -> Result<Vec<EvidenceResult>, FlexibeeError> {
        let raw = self.perform(&self.build_search(filter, options));
        self.interpreter.results(&raw)
    }

    /// Create or update one record. `id` turns a create into an update.
    pub fn save(
        &self,
        data: Map<String, Value>,
        id: Option<i64>,
        dry_run: bool,
        options: &QueryOptions,
    ) -> Result<SaveResponse, FlexibeeError> {
        let raw = self.perform(&self.build_save(data, id, dry_run, options)?);
        self.interpreter.save_outcome(&raw)
    }

    pub fn delete_by_id(&self, id: i64, dry_run: bool) -> Result<Response, FlexibeeError> {
        let raw = self.perform(&self.build_delete(&Identifier::Id(id), dry_run));
        self.interpreter.check(&raw)
    }

    pub fn delete_by_code(&self, code: &str, dry_run: bool) -> Result<Response, FlexibeeError> {
        let raw = self.perform(&self.build_delete(&Identifier::Code(code.to_string()), dry_run));
        self.interpreter.check(&raw)
    }

    pub fn call_request(
        &self,
        method: HttpMethod,
        identifier: &Identifier,
        options: &QueryOptions,
        body: Option<Value>,
    ) -> Result<Vec<EvidenceResult>, FlexibeeError> {
        let raw = self.perform(&self.build_call(method, identifier, options, body)?);
        self.interpreter.results(&raw)
    }

    pub fn get_pdf_by_id(&self, id: i64, options: &QueryOptions) -> Result<Vec<u8>, FlexibeeError> {
        self.binary(&self.build_pdf(id, options))
    }

    pub fn backup(&self) -> Result<Vec<u8>, FlexibeeError> {
        self.binary(&self.build_backup())
    }

    pub fn restore(&self, company: &str, data: Vec<u8>) -> Result<Response, FlexibeeError> {
        let raw = self.perform(&self.build_restore(company, data));
        self.interpreter.check(&raw)
    }

    /// Whether the changes API is switched on for the company.
    pub fn is_allowed_changes_api(&self) -> Result<bool, FlexibeeError> {
        let raw = self.perform(&self.build_changes_status());
        let response = envelope::parse(&raw)?;
        check_status(response.status)?;
        Ok(response.success())
    }

    pub fn changes_for_evidence(&self, evidence: &str) -> Result<Response, FlexibeeError> {
        let raw = self.perform(&self.build_changes(&QueryOptions::new().set("evidence", evidence)));
        self.interpreter.check(&raw)
    }

    pub fn all_changes(&self, from_version: Option<&str>) -> Result<Response, FlexibeeError> {
        let options = match from_version {
            Some(version) => QueryOptions::new().set("start", version),
            None => QueryOptions::new(),
        };
        let raw = self.perform(&self.build_changes(&options));
        self.interpreter.check(&raw)
    }

    pub fn login_form_url(&self, options: &QueryOptions) -> String {
        self.urls.create_login_form_url(options)
    }

    pub fn auth_and_refresh_token(&self) -> Result<Response, FlexibeeError> {
        let raw = self.perform(&self.build_auth_token());
        self.interpreter.check(&raw)
    }

    // -----------------------------------------------------------------------
    // Compositions
    // -----------------------------------------------------------------------

    /// User-defined relations of a record, lists keyed by position.
    pub fn user_relations(&self, object_id: i64) -> Result<EvidenceResult, FlexibeeError> {
        let record = self.get_by_id(object_id, &QueryOptions::new().relations(USER_RELATIONS))?;
        let relations = record.get(USER_RELATIONS).cloned().unwrap_or(Value::Null);
        Ok(EvidenceResult::new(Envelope::from_value(relations).into_record()))
    }

    /// Link record `object_a_id` to record `object_b_id` with a typed relation.
    pub fn add_user_relation(
        &self,
        object_a_id: i64,
        object_b_id: i64,
        price: f64,
        relation_type_id: i64,
        description: Option<&str>,
    ) -> Result<SaveResponse, FlexibeeError> {
        let object_b = self.get_by_id(object_b_id, &QueryOptions::new())?;
        let code = object_b
            .get("kod")
            .map(|kod| kod.as_str().map_or_else(|| kod.to_string(), str::to_string))
            .unwrap_or_default();
        let data = json!({
            "id": object_a_id,
            USER_RELATIONS: {
                "uzivatelska-vazba": {
                    "vazbaTyp": relation_type_id,
                    "cena": price,
                    "popis": description,
                    "evidenceType": self.config.evidence(),
                    "object": format!("code:{code}"),
                }
            }
        });
        self.save(into_map(data), Some(object_a_id), false, &QueryOptions::new())
    }

    /// Deduct an advance (proforma) invoice from an issued invoice.
    pub fn create_deduction_from_proforma(
        &self,
        proforma_invoice_id: i64,
        issued_invoice_id: i64,
        price: f64,
    ) -> Result<SaveResponse, FlexibeeError> {
        let issued = self.get_by_id(issued_invoice_id, &QueryOptions::new())?;
        let data = json!({
            "id": issued_invoice_id,
            "typDokl": issued.get("typDokl").cloned().unwrap_or(Value::Null),
            "odpocty-zaloh": {
                "odpocet": {
                    "castkaMen": price,
                    "doklad": proforma_invoice_id,
                }
            }
        });
        self.save(into_map(data), None, false, &QueryOptions::new())
    }

    fn binary(&self, request: &HttpRequest) -> Result<Vec<u8>, FlexibeeError> {
        let raw = self.perform(request);
        let payload = envelope::parse_payload(request.method, &request.url, &raw)?;
        check_status(raw.status)?;
        match payload {
            Payload::Pdf(bytes) | Payload::Backup(bytes) if raw.status < 400 => Ok(bytes),
            _ => Err(FlexibeeError::RequestFailed {
                message: envelope::parse(&raw)?.message().unwrap_or_default(),
                status: raw.status,
            }),
        }
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
