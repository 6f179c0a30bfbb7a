///! AWS Signature Version 4 request signing.
///! Every upstream call (query API, parameter store, object store) is signed with the
///! caller's ambient credentials, bound to a service identifier and a region. The
///! signature covers the method, the URL and the serialized request body.
use aws_lc_rs::{digest, hmac};
use chrono::{DateTime, Utc};
use reqwest::Url;

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

pub struct RequestSigner {
    credentials: Credentials,
    service: String,
    region: String,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data).as_ref().to_vec()
}

impl RequestSigner {
    pub fn new(credentials: Credentials, service: &str, region: &str) -> Self {
        Self {
            credentials,
            service: service.to_string(),
            region: region.to_string(),
        }
    }

    /// Produces the complete header set for a signed request: the caller's own
    /// headers plus host, x-amz-date, the payload hash, the session token when one
    /// is configured, and the authorization header carrying the signature.
    ///
    /// `signed_at` is passed in rather than read from the clock so the signature is
    /// deterministic for a fixed instant.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        body: &[u8],
        signed_at: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let amz_date = signed_at.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = signed_at.format("%Y%m%d").to_string();
        let host = url
            .host_str()
            .expect("expect a signing url to carry a host")
            .to_string();
        let payload_hash = sha256_hex(body);

        // Canonical headers must be lowercased, trimmed and sorted by name.
        let mut all_headers: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
            .collect();
        all_headers.push(("host".to_string(), host));
        all_headers.push(("x-amz-date".to_string(), amz_date.clone()));
        all_headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
        if let Some(session_token) = &self.credentials.session_token {
            all_headers
                .push(("x-amz-security-token".to_string(), session_token.clone()));
        }
        all_headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_headers: String = all_headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();
        let signed_headers = all_headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_uri = if url.path().is_empty() { "/" } else { url.path() };
        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            url.query().unwrap_or("")
        );

        let credential_scope =
            format!("{date_stamp}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        // Signing key derivation chain: date -> region -> service -> aws4_request.
        let k_date = hmac_sha256(
            format!("AWS4{}", self.credentials.secret_access_key).as_bytes(),
            date_stamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature =
            hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );
        all_headers.push(("authorization".to_string(), authorization));
        all_headers
    }
}
