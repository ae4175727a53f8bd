use std::fmt::Debug;
use std::time::Duration;

use bytes::Bytes;

use crate::Error;
use crate::Result;

/// Blocking HTTP exchange at the seam between the table client and the
/// network stack.
///
/// Every exchange blocks the calling context until response or timeout;
/// the client has no non-blocking path. Mock implementations stand in for
/// the network in tests.
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send the request and return the response.
    fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}

/// `HttpSend` over a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestHttpSend {
    client: reqwest::blocking::Client,
}

/// Generous, to accommodate slow metered uplinks.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

impl ReqwestHttpSend {
    /// Create a sender with the default 100 s request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a sender with the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::unexpected("failed to build http client").with_source(e))?;
        Ok(Self { client })
    }
}

impl HttpSend for ReqwestHttpSend {
    fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let (parts, body) = req.into_parts();
        let req = http::Request::from_parts(parts, body.to_vec());
        let req = reqwest::blocking::Request::try_from(req)
            .map_err(|e| Error::request_invalid("request not sendable").with_source(e))?;

        let resp = self
            .client
            .execute(req)
            .map_err(|e| Error::unexpected("http exchange failed").with_source(e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .map_err(|e| Error::unexpected("failed to read response body").with_source(e))?;

        let mut builder = http::Response::builder().status(status);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        Ok(builder.body(body)?)
    }
}
