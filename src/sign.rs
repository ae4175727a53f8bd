//! Shared Key authorization for the table service.
//!
//! - [Authorize with Shared Key](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)

use log::debug;

use crate::account::Account;
use crate::hash::base64_hmac_sha256;
use crate::hash::md5_hex_upper;
use crate::Error;
use crate::Result;

/// Which shared-key scheme signs the request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SigningScheme {
    /// Full shared key: the string-to-sign covers verb, payload MD5,
    /// content type, date and resource.
    #[default]
    SharedKey,
    /// Lite shared key: only date and resource are signed, no payload
    /// digest is computed.
    SharedKeyLite,
}

/// A computed authorization: the header value plus the payload MD5 that went
/// into the signature (empty for the lite scheme).
///
/// The MD5 is returned so the request can carry the exact digest that was
/// signed in its `Content-MD5` header.
#[derive(Clone, Debug)]
pub struct Authorization {
    /// `Authorization` header value, `SharedKey {account}:{signature}`.
    pub header: String,
    /// Upper-hex MD5 of the payload, or empty under `SharedKeyLite`.
    pub content_md5: String,
}

/// Compute the authorization header for one request.
///
/// The string-to-sign is, for [`SigningScheme::SharedKey`]:
///
/// ```text
/// VERB \n CONTENT-MD5 \n CONTENT-TYPE \n DATE \n CANONICALIZED-RESOURCE
/// ```
///
/// and for [`SigningScheme::SharedKeyLite`] just `DATE \n RESOURCE`. No
/// trailing newline either way. The signature is HMAC-SHA256 over the UTF-8
/// string-to-sign, keyed with the base64-decoded account key, then base64
/// encoded with the standard alphabet.
///
/// A key that fails to decode is a fatal [`crate::ErrorKind::CredentialInvalid`]:
/// the request must never go out unsigned.
pub fn authorization_header(
    verb: &str,
    canonicalized_resource: &str,
    date: &str,
    content_type: &str,
    payload: &[u8],
    account: &Account,
    scheme: SigningScheme,
) -> Result<Authorization> {
    let (string_to_sign, content_md5) = match scheme {
        SigningScheme::SharedKey => {
            let md5 = md5_hex_upper(payload);
            let s = format!("{verb}\n{md5}\n{content_type}\n{date}\n{canonicalized_resource}");
            (s, md5)
        }
        SigningScheme::SharedKeyLite => {
            (format!("{date}\n{canonicalized_resource}"), String::new())
        }
    };

    debug!("string to sign: {:?}", string_to_sign);

    let key = crate::hash::base64_decode(account.account_key())
        .map_err(|e| Error::credential_invalid("account key is not valid base64").with_source(e))?;
    let signature = base64_hmac_sha256(&key, string_to_sign.as_bytes());

    let prefix = match scheme {
        SigningScheme::SharedKey => "SharedKey",
        SigningScheme::SharedKeyLite => "SharedKeyLite",
    };

    Ok(Authorization {
        header: format!("{prefix} {}:{signature}", account.account_name()),
        content_md5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;

    fn test_account() -> Account {
        Account::new("roschmi01", &crate::hash::base64_encode(b"topsecretkey"), true)
    }

    fn sign(
        verb: &str,
        resource: &str,
        date: &str,
        content_type: &str,
        payload: &[u8],
    ) -> Authorization {
        authorization_header(
            verb,
            resource,
            date,
            content_type,
            payload,
            &test_account(),
            SigningScheme::SharedKey,
        )
        .unwrap()
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign(
            "POST",
            "/roschmi01/Tables()",
            "Tue, 29 Jan 2019 22:38:48 GMT",
            "application/atom+xml",
            b"<entry/>",
        );
        let b = sign(
            "POST",
            "/roschmi01/Tables()",
            "Tue, 29 Jan 2019 22:38:48 GMT",
            "application/atom+xml",
            b"<entry/>",
        );
        assert_eq!(a.header, b.header);
        assert_eq!(a.content_md5, b.content_md5);
    }

    #[test]
    fn test_every_input_perturbs_the_signature() {
        let date = "Tue, 29 Jan 2019 22:38:48 GMT";
        let base = sign("POST", "/roschmi01/Tables()", date, "application/atom+xml", b"x");

        let verb = sign("GET", "/roschmi01/Tables()", date, "application/atom+xml", b"x");
        let resource = sign("POST", "/roschmi01/data()", date, "application/atom+xml", b"x");
        let changed_date = sign(
            "POST",
            "/roschmi01/Tables()",
            "Tue, 29 Jan 2019 22:38:49 GMT",
            "application/atom+xml",
            b"x",
        );
        let content_type = sign("POST", "/roschmi01/Tables()", date, "application/json", b"x");
        let payload = sign("POST", "/roschmi01/Tables()", date, "application/atom+xml", b"y");

        for other in [verb, resource, changed_date, content_type, payload] {
            assert_ne!(base.header, other.header);
        }
    }

    #[test]
    fn test_header_shape() {
        let auth = sign(
            "POST",
            "/roschmi01/Tables()",
            "Tue, 29 Jan 2019 22:38:48 GMT",
            "application/atom+xml",
            b"",
        );
        assert!(auth.header.starts_with("SharedKey roschmi01:"));
        // Empty payload still digests; the constant MD5 of zero bytes.
        assert_eq!(auth.content_md5, "D41D8CD98F00B204E9800998ECF8427E");
    }

    #[test]
    fn test_lite_scheme_skips_the_digest() {
        let auth = authorization_header(
            "GET",
            "/roschmi01/data()",
            "Tue, 29 Jan 2019 22:38:48 GMT",
            "application/atom+xml",
            b"ignored by lite",
            &test_account(),
            SigningScheme::SharedKeyLite,
        )
        .unwrap();
        assert!(auth.header.starts_with("SharedKeyLite roschmi01:"));
        assert_eq!(auth.content_md5, "");
    }

    #[test]
    fn test_lite_signature_ignores_verb_and_payload() {
        let date = "Tue, 29 Jan 2019 22:38:48 GMT";
        let a = authorization_header(
            "GET",
            "/roschmi01/data()",
            date,
            "application/atom+xml",
            b"one",
            &test_account(),
            SigningScheme::SharedKeyLite,
        )
        .unwrap();
        let b = authorization_header(
            "POST",
            "/roschmi01/data()",
            date,
            "application/json",
            b"two",
            &test_account(),
            SigningScheme::SharedKeyLite,
        )
        .unwrap();
        assert_eq!(a.header, b.header);
    }

    #[test]
    fn test_malformed_key_is_a_credential_error() {
        let account = Account::new("dev", "!!! not base64 !!!", true);
        let err = authorization_header(
            "POST",
            "/dev/Tables()",
            "Tue, 29 Jan 2019 22:38:48 GMT",
            "application/atom+xml",
            b"",
            &account,
            SigningScheme::SharedKey,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
    }
}
