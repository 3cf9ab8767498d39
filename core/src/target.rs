//! Request target construction.
//!
//! Pure string formatting: every method maps an identifier or filter plus a
//! set of query options to a URL under `{url}/c/{company}`. The result is
//! percent-decoded once, because filters built by callers are frequently
//! encoded already and the server rejects double-encoded filter expressions.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::form_urlencoded;

use crate::config::Config;

/// Characters that may appear in a decoded target but are not valid in a URI.
const WIRE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// What a request addresses inside the configured evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// The whole evidence.
    All,
    Id(i64),
    /// Record addressed by its `kod` field.
    Code(String),
    /// Raw filter expression, e.g. `kod = 'ABC'`.
    Filter(String),
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Identifier::Id(id)
    }
}

/// Ordered query options. Keys are unique; setting a key twice keeps the
/// last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions(BTreeMap<String, String>);

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn start(self, start: u64) -> Self {
        self.set("start", start)
    }

    pub fn limit(self, limit: u64) -> Self {
        self.set("limit", limit)
    }

    pub fn add_row_count(self) -> Self {
        self.set("add-row-count", "true")
    }

    pub fn dry_run(self) -> Self {
        self.set("dry-run", "true")
    }

    pub fn relations(self, relations: &str) -> Self {
        self.set("relations", relations)
    }

    /// Options from `other` override ours.
    pub fn merge(mut self, other: &QueryOptions) -> Self {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for QueryOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Builds request targets for one company and evidence.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    root: String,
    company_url: String,
    evidence: String,
}

impl UrlBuilder {
    pub fn new(config: &Config) -> Self {
        let root = config.url().to_string();
        Self {
            company_url: format!("{root}/c/{}", config.company()),
            root,
            evidence: config.evidence().to_string(),
        }
    }

    pub fn create_uri(&self, identifier: &Identifier, options: &QueryOptions) -> String {
        let segment = match identifier {
            Identifier::All => String::new(),
            Identifier::Id(id) => format!("/{id}"),
            Identifier::Code(code) => format!("/(code:{code})"),
            Identifier::Filter(filter) => format!("/({filter})"),
        };
        let path = format!("{}/{}{segment}.json", self.company_url, self.evidence);
        finish(path, options)
    }

    pub fn create_filter_query(&self, filter: &str, options: &QueryOptions) -> String {
        self.create_uri(&Identifier::Filter(filter.to_string()), options)
    }

    pub fn create_pdf_url(&self, id: i64, options: &QueryOptions) -> String {
        finish(format!("{}/{}/{id}.pdf", self.company_url, self.evidence), options)
    }

    pub fn create_backup_url(&self) -> String {
        format!("{}/backup", self.company_url)
    }

    pub fn create_restore_url(&self, company: &str) -> String {
        format!("{}/c/{company}/restore", self.root)
    }

    pub fn create_changes_url(&self, options: &QueryOptions) -> String {
        finish(format!("{}/changes.json", self.company_url), options)
    }

    pub fn create_changes_status_url(&self) -> String {
        format!("{}/changes/status.json", self.company_url)
    }

    pub fn create_auth_token_url(&self) -> String {
        format!("{}/login-logout/login.json", self.root)
    }

    pub fn create_login_form_url(&self, options: &QueryOptions) -> String {
        finish(format!("{}/login-logout/login.html", self.root), options)
    }
}

fn finish(path: String, options: &QueryOptions) -> String {
    let url = if options.is_empty() {
        path
    } else {
        format!("{path}?{}", options.to_query_string())
    };
    normalize(&url)
}

/// Undo one level of percent-encoding.
pub fn normalize(url: &str) -> String {
    percent_decode_str(url).decode_utf8_lossy().into_owned()
}

/// Encode the characters of a normalized target that a URI cannot carry.
pub fn wire_url(target: &str) -> String {
    utf8_percent_encode(target, WIRE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> UrlBuilder {
        let config = Config::new("https://demo.flexibee.eu/", "demo", "u", "p", "faktura-vydana").unwrap();
        UrlBuilder::new(&config)
    }

    #[test]
    fn uri_by_id() {
        assert_eq!(
            builder().create_uri(&Identifier::Id(42), &QueryOptions::new()),
            "https://demo.flexibee.eu/c/demo/faktura-vydana/42.json"
        );
    }

    #[test]
    fn uri_by_code() {
        assert_eq!(
            builder().create_uri(&Identifier::Code("VF1-0001/2024".to_string()), &QueryOptions::new()),
            "https://demo.flexibee.eu/c/demo/faktura-vydana/(code:VF1-0001/2024).json"
        );
    }

    #[test]
    fn uri_for_whole_evidence_with_pagination() {
        let options = QueryOptions::new().start(20).limit(10);
        assert_eq!(
            builder().create_uri(&Identifier::All, &options),
            "https://demo.flexibee.eu/c/demo/faktura-vydana.json?limit=10&start=20"
        );
    }

    #[test]
    fn filter_is_decoded_once() {
        let url = builder().create_filter_query("kod%20%3D%20%27ABC%27", &QueryOptions::new());
        assert_eq!(
            url,
            "https://demo.flexibee.eu/c/demo/faktura-vydana/(kod = 'ABC').json"
        );
    }

    #[test]
    fn query_options_are_decoded() {
        let options = QueryOptions::new().relations("uzivatelske-vazby").set("detail", "custom:id,kod");
        assert_eq!(
            builder().create_uri(&Identifier::Id(1), &options),
            "https://demo.flexibee.eu/c/demo/faktura-vydana/1.json?detail=custom:id,kod&relations=uzivatelske-vazby"
        );
    }

    #[test]
    fn merge_overrides_existing_keys() {
        let merged = QueryOptions::new().limit(5).merge(&QueryOptions::new().limit(7).dry_run());
        assert_eq!(merged.get("limit"), Some("7"));
        assert_eq!(merged.get("dry-run"), Some("true"));
    }

    #[test]
    fn binary_and_service_urls() {
        let b = builder();
        assert_eq!(
            b.create_pdf_url(3, &QueryOptions::new()),
            "https://demo.flexibee.eu/c/demo/faktura-vydana/3.pdf"
        );
        assert_eq!(b.create_backup_url(), "https://demo.flexibee.eu/c/demo/backup");
        assert_eq!(b.create_restore_url("other"), "https://demo.flexibee.eu/c/other/restore");
        assert_eq!(b.create_changes_status_url(), "https://demo.flexibee.eu/c/demo/changes/status.json");
        assert_eq!(b.create_auth_token_url(), "https://demo.flexibee.eu/login-logout/login.json");
    }

    #[test]
    fn wire_url_encodes_spaces_and_quotes_only() {
        assert_eq!(
            wire_url("https://x/c/d/e/(kod = \"A\").json?limit=0"),
            "https://x/c/d/e/(kod%20=%20%22A%22).json?limit=0"
        );
    }

    #[test]
    fn query_options_collect_from_pairs() {
        let options: QueryOptions = [("start", "1"), ("limit", "2")].into_iter().collect();
        assert_eq!(options.to_query_string(), "limit=2&start=1");
    }
}
