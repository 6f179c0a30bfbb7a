///! Signed request client for the upstream query API: every call is SigV4-signed,
///! retried a bounded number of times, and rate-limit responses get linear backoff.
use crate::sigv4::{Credentials, RequestSigner};
use async_trait::async_trait;
use chrono::Utc;
use mockall::automock;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub const DEFAULT_REQUEST_TRIES: u32 = 5;
pub const BACK_OFF_TIME: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("maximum request retries reached, url: {url}, parameters: {params}")]
    RetryExhausted { url: String, params: String },
    #[error("failed to decode upstream response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[automock]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> anyhow::Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> anyhow::Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(method.as_bytes())?;
        let mut request = self.client.request(method, url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

pub struct SignedClient<T = ReqwestTransport> {
    transport: T,
    signer: RequestSigner,
    max_tries: u32,
    back_off: Duration,
}

impl SignedClient<ReqwestTransport> {
    pub fn new(
        credentials: Credentials,
        service: &str,
        region: &str,
        max_tries: u32,
    ) -> Self {
        Self::with_transport(
            ReqwestTransport::new(),
            RequestSigner::new(credentials, service, region),
            max_tries,
            BACK_OFF_TIME,
        )
    }
}

impl<T: HttpTransport> SignedClient<T> {
    pub fn with_transport(
        transport: T,
        signer: RequestSigner,
        max_tries: u32,
        back_off: Duration,
    ) -> Self {
        Self {
            transport,
            signer,
            max_tries,
            back_off,
        }
    }

    /// Issues one signed POST call and parses the JSON response. Transport errors
    /// and non-200 statuses are retried up to the configured ceiling; HTTP 429 gets
    /// a linear backoff of `back_off * attempt_number` before the next try.
    /// Exhausting the ceiling is fatal and carries the endpoint and parameters for
    /// diagnosis.
    pub async fn call<B, R>(&self, url: &Url, request: &B) -> Result<R, RequestError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let body = serde_json::to_string(request)?;
        let extra_headers = vec![(
            "content-type".to_string(),
            "application/json".to_string(),
        )];
        let mut tries: u32 = 0;
        loop {
            if tries >= self.max_tries {
                return Err(RequestError::RetryExhausted {
                    url: url.to_string(),
                    params: body,
                });
            }
            // Each attempt is re-signed so the signature timestamp stays fresh.
            let headers =
                self.signer
                    .sign("POST", url, &extra_headers, body.as_bytes(), Utc::now());
            let result = self
                .transport
                .send("POST", url.as_str(), &headers, &body)
                .await;
            tries += 1;
            match result {
                Ok(response) if response.status == 200 => {
                    return Ok(serde_json::from_str(&response.body)?);
                }
                Ok(response) => {
                    error!(
                        status = response.status,
                        body = %response.body,
                        url = %url,
                        "non-200 response"
                    );
                    if response.status == 429 {
                        let delay = self.back_off * tries;
                        info!("backing off {}ms before retrying", delay.as_millis());
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    warn!(%err, url = %url, "transport error, trying again");
                }
            }
        }
    }
}
