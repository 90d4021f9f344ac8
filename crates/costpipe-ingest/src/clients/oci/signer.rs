//! Request signing for the native Object Storage API
//!
//! Requests carry an HTTP `Signature` authorization header: the `date`,
//! `(request-target)` and `host` headers are joined into a signing string which
//! is signed with RSA-SHA256 using the API key of the profile.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{crypto, Algorithm, EncodingKey};

use crate::clients::ClientResult;
use crate::error::ClientError;

/// Headers covered by the signature, in signing order
pub const SIGNED_HEADERS: &str = "date (request-target) host";

/// Signs requests on behalf of one API key
pub struct RequestSigner {
    key_id: String,
    key: EncodingKey,
}

impl RequestSigner {
    /// Signer for the key identified by tenancy, user and key fingerprint
    pub fn new(tenancy: &str, user: &str, fingerprint: &str, private_key_pem: &[u8]) -> ClientResult<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| ClientError::signing(format!("unusable private key: {}", e)))?;

        Ok(Self {
            key_id: format!("{}/{}/{}", tenancy, user, fingerprint),
            key,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Value of the `date` header for `at`
    pub fn http_date(at: DateTime<Utc>) -> String {
        at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Signing string for a request
    pub fn signing_string(method: &str, path_and_query: &str, host: &str, date: &str) -> String {
        format!(
            "date: {}\n(request-target): {} {}\nhost: {}",
            date,
            method.to_lowercase(),
            path_and_query,
            host
        )
    }

    /// Base64 RSA-SHA256 signature of `message`
    pub fn sign(&self, message: &str) -> ClientResult<String> {
        let url_safe = crypto::sign(message.as_bytes(), &self.key, Algorithm::RS256)
            .map_err(|e| ClientError::signing(e.to_string()))?;

        let raw = URL_SAFE_NO_PAD
            .decode(url_safe)
            .map_err(|e| ClientError::signing(e.to_string()))?;

        Ok(STANDARD.encode(raw))
    }

    /// `Authorization` header value for a request
    pub fn authorization(
        &self,
        method: &str,
        path_and_query: &str,
        host: &str,
        date: &str,
    ) -> ClientResult<String> {
        let signature = self.sign(&Self::signing_string(method, path_and_query, host, date))?;

        Ok(format!(
            "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id, SIGNED_HEADERS, signature
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TEST_KEY: &str = include_str!("../../../tests/fixtures/test_key.pem");

    const DATE: &str = "Thu, 05 Jan 2014 21:31:40 GMT";
    const TARGET: &str = "/n/bling/b/ocid1.tenancy.oc1..bbbb/o?prefix=reports%2Fcost-csv";
    const HOST: &str = "objectstorage.us-ashburn-1.oraclecloud.com";

    // openssl dgst -sha256 -sign test_key.pem <signing string> | base64
    const EXPECTED_SIGNATURE: &str = "doiXm0azvFYK0ox6evtw5rFUMMTFL7DKMOHlxEBCioNiopUkn3J7leTc/4oxrXmuj3GCOuLsyfCjzBBzB97uX22uvxcnDJYwuQ8bIkIlHJDeZF1tRiyj4gA6+682sKaEJqssRr9KATEM3boO61kSJkWB2YS8BQ/857c+MaHOS3mVn7EVxkHP7P6qxly5YXP5KQkn4+VnvnhdYqUgmt9X/Xf5HqZwIMDgSAYjNGxhIVSrC72ziiKki6w6CfDyDSjQ3km0EOBOMW7w3QF8pskxD+n+W3wEfYebq2Np8tzyJ0LaHkKv/ZosfQUpvbJbuK+RnLgboEPVLvh41oe/rCBY3A==";

    fn signer() -> RequestSigner {
        RequestSigner::new(
            "ocid1.tenancy.oc1..bbbb",
            "ocid1.user.oc1..aaaa",
            "20:3b:97:13",
            TEST_KEY.as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_signing_string_layout() {
        let s = RequestSigner::signing_string("GET", TARGET, HOST, DATE);
        assert_eq!(
            s,
            format!("date: {}\n(request-target): get {}\nhost: {}", DATE, TARGET, HOST)
        );
    }

    #[test]
    fn test_signature_matches_reference() {
        let message = RequestSigner::signing_string("get", TARGET, HOST, DATE);
        assert_eq!(signer().sign(&message).unwrap(), EXPECTED_SIGNATURE);
    }

    #[test]
    fn test_authorization_header() {
        let header = signer().authorization("GET", TARGET, HOST, DATE).unwrap();
        assert!(header.starts_with("Signature version=\"1\""));
        assert!(header.contains("keyId=\"ocid1.tenancy.oc1..bbbb/ocid1.user.oc1..aaaa/20:3b:97:13\""));
        assert!(header.contains("headers=\"date (request-target) host\""));
        assert!(header.contains(EXPECTED_SIGNATURE));
    }

    #[test]
    fn test_http_date_format() {
        let at = Utc.with_ymd_and_hms(2014, 1, 5, 21, 31, 40).unwrap();
        assert_eq!(RequestSigner::http_date(at), "Sun, 05 Jan 2014 21:31:40 GMT");
    }

    #[test]
    fn test_rejects_garbage_key() {
        let result = RequestSigner::new("t", "u", "f", b"not a key");
        assert!(matches!(result, Err(ClientError::Signing(_))));
    }
}
