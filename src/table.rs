//! Table service client: create-table, insert-entity and query-entities.

use std::sync::Arc;

use bytes::Bytes;
use http::header;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use log::debug;
use log::error;
use log::warn;

use crate::account::Account;
use crate::account::ServiceKind;
use crate::atom;
use crate::atom::ParsedEntity;
use crate::clock::DeviceClock;
use crate::entity::TableEntity;
use crate::sign;
use crate::sign::Authorization;
use crate::sign::SigningScheme;
use crate::time::format_http_date;
use crate::transport::HttpSend;
use crate::ErrorKind;
use crate::Result;

const STORAGE_VERSION: &str = "2015-04-05";
const CONTENT_TYPE_ATOM: &str = "application/atom+xml";
const XML_MARKER: &str = "<?xml";
const JSON_MARKER: &str = "{\"odata.metadata\":";
/// Response bodies are retained only up to this many characters; the rest is
/// diagnostic noise the device cannot afford to keep.
const BODY_EXCERPT_MAX: usize = 300;

/// Classified outcome of one table operation.
///
/// Transport problems and HTTP status families are distinct so the caller
/// can decide between retry, alarm and give-up without string matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    /// 2xx.
    Success(u16),
    /// 409. Benign for create-table (the table exists); for insert it means
    /// a row with the same keys already exists and is worth surfacing.
    Conflict,
    /// 403. Almost always a signing bug or clock skew.
    AuthFailure,
    /// Any other 4xx (and 1xx/3xx, which the service does not normally emit).
    ClientError(u16),
    /// 5xx.
    ServerError(u16),
    /// DNS, connect or timeout failure; no HTTP status was available.
    TransportFailure,
    /// The response body matched no recognized content marker, e.g. JSON
    /// where only Atom+XML is supported.
    ProtocolError,
}

impl OperationStatus {
    /// True for any 2xx.
    pub fn is_success(&self) -> bool {
        matches!(self, OperationStatus::Success(_))
    }

    /// True for 2xx or 409, the idempotent-success reading used for
    /// create-table.
    pub fn is_ok_or_exists(&self) -> bool {
        matches!(self, OperationStatus::Success(_) | OperationStatus::Conflict)
    }

    fn classify(code: StatusCode) -> Self {
        if code.is_success() {
            return OperationStatus::Success(code.as_u16());
        }
        match code.as_u16() {
            403 => OperationStatus::AuthFailure,
            409 => OperationStatus::Conflict,
            c if c >= 500 => OperationStatus::ServerError(c),
            c => OperationStatus::ClientError(c),
        }
    }
}

/// Snapshot of the last operation's response.
///
/// Cleared at the start of every operation and written once at the end, so a
/// caller reading after an operation always observes that operation's
/// result, never a torn mix with a previous one.
#[derive(Clone, Debug, Default)]
pub struct OperationResult {
    /// Response body, truncated to a fixed prefix.
    pub body_excerpt: Option<String>,
    /// `ETag` response header, when present.
    pub etag: Option<String>,
    /// `Content-MD5` response header, when present.
    pub content_md5: Option<String>,
    /// Entities decoded from a query response, in document order.
    pub entities: Vec<ParsedEntity>,
    /// Convenience copy when a query decoded exactly one entity.
    pub single: Option<ParsedEntity>,
}

/// Client for one storage account's table service.
///
/// Operations take `&mut self`: one call is in flight per instance, and the
/// last-operation result slot belongs to that call. Logically concurrent
/// device callbacks must share a client behind one coarse lock (or use
/// separate instances); a long upload holds that lock for its full duration,
/// which the caller's scheduling has to account for.
#[derive(Debug)]
pub struct TableClient {
    account: Account,
    http: Arc<dyn HttpSend>,
    clock: DeviceClock,
    scheme: SigningScheme,
    prefer_content: bool,
    last_result: OperationResult,
}

impl TableClient {
    /// Create a client for the given account.
    pub fn new(account: Account, http: impl HttpSend) -> Self {
        Self {
            account,
            http: Arc::new(http),
            clock: DeviceClock::new(),
            scheme: SigningScheme::SharedKey,
            prefer_content: true,
            last_result: OperationResult::default(),
        }
    }

    /// Read request timestamps from this clock instead of the host clock.
    ///
    /// Pass the clock the NTP sync engine maintains; a skewed clock
    /// invalidates signatures.
    pub fn with_clock(mut self, clock: DeviceClock) -> Self {
        self.clock = clock;
        self
    }

    /// Sign with the given scheme (default: full `SharedKey`).
    pub fn with_scheme(mut self, scheme: SigningScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Whether mutations ask the service to echo the entity back
    /// (`Prefer: return-content`, the default) or not.
    pub fn with_prefer_content(mut self, prefer_content: bool) -> Self {
        self.prefer_content = prefer_content;
        self
    }

    /// The last operation's result snapshot.
    pub fn last_result(&self) -> &OperationResult {
        &self.last_result
    }

    fn table_endpoint(&self) -> &str {
        self.account.endpoint(ServiceKind::Table)
    }

    fn prefer_header(&self) -> &'static str {
        if self.prefer_content {
            "return-content"
        } else {
            "return-no-content"
        }
    }

    /// Create a table. 201/204 mean created; 409 means it already exists,
    /// which callers treat as idempotent success via
    /// [`OperationStatus::is_ok_or_exists`].
    pub fn create_table(&mut self, table: &str) -> Result<OperationStatus> {
        self.last_result = OperationResult::default();

        let now = self.clock.now_utc();
        let date = format_http_date(now);
        let body = atom::table_to_atom(table, self.account.account_name(), now);
        let resource = format!("/{}/Tables()", self.account.account_name());
        let auth = sign::authorization_header(
            "POST",
            &resource,
            &date,
            CONTENT_TYPE_ATOM,
            body.as_bytes(),
            &self.account,
            self.scheme,
        )?;
        let uri = format!("{}/Tables()", self.table_endpoint());

        let outcome = self.exchange(Method::POST, &uri, &date, &auth, true, Bytes::from(body))?;
        let status = outcome.status;
        self.record(outcome);
        Ok(status)
    }

    /// Insert one entity. ETag and Content-MD5 from the response land in the
    /// result slot. A 409 means a row with the same keys already exists;
    /// with timestamp-derived row keys that is an anomaly worth surfacing,
    /// not something to retry forever.
    pub fn insert_entity(&mut self, table: &str, entity: &TableEntity) -> Result<OperationStatus> {
        self.last_result = OperationResult::default();

        let now = self.clock.now_utc();
        let date = format_http_date(now);
        let body = atom::entity_to_atom(entity, table, self.account.account_name(), now);
        let resource = format!("/{}/{table}()", self.account.account_name());
        let auth = sign::authorization_header(
            "POST",
            &resource,
            &date,
            CONTENT_TYPE_ATOM,
            body.as_bytes(),
            &self.account,
            self.scheme,
        )?;
        let uri = format!("{}/{table}()", self.table_endpoint());

        let outcome = self.exchange(Method::POST, &uri, &date, &auth, true, Bytes::from(body))?;
        let status = outcome.status;
        self.record(outcome);
        Ok(status)
    }

    /// Query entities: a point query when `keys` carries
    /// `(partition_key, row_key)`, otherwise a range query with the raw
    /// `query` string (e.g. `$top=1`) appended.
    ///
    /// Only Atom+XML responses are understood. A JSON body fails fast as
    /// [`OperationStatus::ProtocolError`] instead of being fed to the XML
    /// scanner.
    pub fn query_entities(
        &mut self,
        table: &str,
        query: &str,
        keys: Option<(&str, &str)>,
    ) -> Result<OperationStatus> {
        self.last_result = OperationResult::default();

        let now = self.clock.now_utc();
        let date = format_http_date(now);
        let resource_path = match keys {
            Some((pk, rk)) => format!("{table}(PartitionKey='{pk}',RowKey='{rk}')"),
            None => format!("{table}()"),
        };
        // The query string is not part of the canonicalized resource.
        let resource = format!("/{}/{resource_path}", self.account.account_name());
        let auth = sign::authorization_header(
            "GET",
            &resource,
            &date,
            CONTENT_TYPE_ATOM,
            b"",
            &self.account,
            self.scheme,
        )?;
        let mut uri = format!("{}/{resource_path}", self.table_endpoint());
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(query);
        }

        let mut outcome = self.exchange(Method::GET, &uri, &date, &auth, false, Bytes::new())?;

        if outcome.status.is_success() {
            if outcome.body.starts_with(XML_MARKER) {
                let entities = atom::parse_entities(&outcome.body);
                if entities.len() == 1 {
                    self.last_result.single = Some(entities[0].clone());
                } else {
                    // The response ETag only identifies a single row.
                    outcome.etag = None;
                }
                self.last_result.entities = entities;
            } else if outcome.body.starts_with(JSON_MARKER) {
                warn!("query returned json; only atom+xml responses are supported");
                outcome.status = OperationStatus::ProtocolError;
            } else {
                warn!("query response matched no known content marker");
                outcome.status = OperationStatus::ProtocolError;
            }
        }

        let status = outcome.status;
        self.record(outcome);
        Ok(status)
    }

    fn exchange(
        &self,
        method: Method,
        uri: &str,
        date: &str,
        auth: &Authorization,
        is_mutation: bool,
        body: Bytes,
    ) -> Result<ExchangeOutcome> {
        let mut builder = http::Request::builder()
            .method(method.clone())
            .uri(uri)
            .header("x-ms-date", date)
            .header("x-ms-version", STORAGE_VERSION)
            .header(header::CONTENT_TYPE, CONTENT_TYPE_ATOM)
            .header(header::ACCEPT, CONTENT_TYPE_ATOM)
            .header(header::ACCEPT_CHARSET, "UTF-8")
            .header("MaxDataServiceVersion", "3.0;NetFx")
            .header("DataServiceVersion", "3.0")
            .header("Content-MD5", auth.content_md5.as_str());
        if is_mutation {
            builder = builder.header("Prefer", self.prefer_header());
        }
        let mut req = builder.body(body)?;

        let mut auth_value: HeaderValue = auth.header.parse()?;
        auth_value.set_sensitive(true);
        req.headers_mut().insert(header::AUTHORIZATION, auth_value);

        debug!("{method} {uri}");

        let resp = match self.http.http_send(req) {
            Ok(resp) => resp,
            Err(e) if e.kind() == ErrorKind::Unexpected => {
                warn!("{method} {uri} transport failure: {e}");
                return Ok(ExchangeOutcome::transport_failure());
            }
            // Request construction and credential problems are fatal.
            Err(e) => return Err(e),
        };

        let status = OperationStatus::classify(resp.status());
        if status == OperationStatus::AuthFailure {
            error!("problem with signature on {method} {uri}: check account key and device clock");
        }

        let etag = header_string(&resp, "etag");
        let content_md5 = header_string(&resp, "content-md5");
        let body = String::from_utf8_lossy(resp.body()).into_owned();

        Ok(ExchangeOutcome {
            status,
            body,
            etag,
            content_md5,
        })
    }

    fn record(&mut self, outcome: ExchangeOutcome) {
        if outcome.status != OperationStatus::TransportFailure {
            self.last_result.body_excerpt = Some(truncate_chars(&outcome.body, BODY_EXCERPT_MAX));
            self.last_result.etag = outcome.etag;
            self.last_result.content_md5 = outcome.content_md5;
        }
    }
}

struct ExchangeOutcome {
    status: OperationStatus,
    body: String,
    etag: Option<String>,
    content_md5: Option<String>,
}

impl ExchangeOutcome {
    fn transport_failure() -> Self {
        Self {
            status: OperationStatus::TransportFailure,
            body: String::new(),
            etag: None,
            content_md5: None,
        }
    }
}

fn header_string(resp: &http::Response<Bytes>, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
