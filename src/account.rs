use std::collections::HashMap;
use std::fmt::Debug;
use std::fmt::Formatter;

/// Storage service kinds an account resolves endpoints for.
///
/// This client only talks to the table service, but the endpoint map covers
/// all three so the descriptor matches what the device is configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Blob service, `{account}.blob.core.windows.net`.
    Blob,
    /// Queue service, `{account}.queue.core.windows.net`.
    Queue,
    /// Table service, `{account}.table.core.windows.net`.
    Table,
}

impl ServiceKind {
    fn subdomain(&self) -> &'static str {
        match self {
            ServiceKind::Blob => "blob",
            ServiceKind::Queue => "queue",
            ServiceKind::Table => "table",
        }
    }
}

/// Storage account descriptor: name, shared key and resolved endpoints.
///
/// Immutable once constructed. The key is secret; `Debug` redacts it and it
/// must never be logged.
#[derive(Clone)]
pub struct Account {
    account_name: String,
    account_key: String,
    endpoints: HashMap<ServiceKind, String>,
}

impl Account {
    /// Create an account descriptor, resolving the default
    /// `http(s)://{account}.{service}.core.windows.net` endpoints.
    pub fn new(account_name: &str, account_key: &str, use_https: bool) -> Self {
        let scheme = if use_https { "https" } else { "http" };
        let endpoints = [ServiceKind::Blob, ServiceKind::Queue, ServiceKind::Table]
            .into_iter()
            .map(|kind| {
                let uri = format!("{scheme}://{account_name}.{}.core.windows.net", kind.subdomain());
                (kind, uri)
            })
            .collect();

        Self {
            account_name: account_name.to_string(),
            account_key: account_key.to_string(),
            endpoints,
        }
    }

    /// The account name.
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// The base64-encoded shared key.
    pub(crate) fn account_key(&self) -> &str {
        &self.account_key
    }

    /// Base endpoint URI for the given service, without a trailing slash.
    pub fn endpoint(&self, kind: ServiceKind) -> &str {
        self.endpoints
            .get(&kind)
            .map(String::as_str)
            .expect("endpoints are resolved for every service kind at construction")
    }
}

impl Debug for Account {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("account_name", &self.account_name)
            .field("account_key", &redact(&self.account_key))
            .finish_non_exhaustive()
    }
}

/// Redacts all but the first and last three characters, entirely for short
/// input, so different keys stay distinguishable in logs without leaking.
fn redact(value: &str) -> String {
    if value.len() < 12 {
        "***".to_string()
    } else {
        format!("{}***{}", &value[..3], &value[value.len() - 3..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_https_endpoints() {
        let account = Account::new("roschmi01", "a2V5", true);
        assert_eq!(
            account.endpoint(ServiceKind::Table),
            "https://roschmi01.table.core.windows.net"
        );
        assert_eq!(
            account.endpoint(ServiceKind::Blob),
            "https://roschmi01.blob.core.windows.net"
        );
        assert_eq!(
            account.endpoint(ServiceKind::Queue),
            "https://roschmi01.queue.core.windows.net"
        );
    }

    #[test]
    fn test_http_endpoint_when_https_disabled() {
        let account = Account::new("dev", "a2V5", false);
        assert_eq!(
            account.endpoint(ServiceKind::Table),
            "http://dev.table.core.windows.net"
        );
    }

    #[test]
    fn test_debug_redacts_the_key() {
        let account = Account::new("dev", "c3VwZXJzZWNyZXRrZXliYXNlNjQ=", true);
        let rendered = format!("{account:?}");
        assert!(!rendered.contains("c3VwZXJzZWNyZXRrZXliYXNlNjQ="));
        assert!(rendered.contains("c3V***jQ="));
    }
}
