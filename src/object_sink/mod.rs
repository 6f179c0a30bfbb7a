///! Write-only sink for finished CSV pages. The extraction never reads back what
///! it wrote; a page object is either fully stored or the run aborts.
use crate::signed_client::{HttpTransport, ReqwestTransport};
use crate::sigv4::{Credentials, RequestSigner};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use mockall::automock;
use reqwest::Url;
use tracing::debug;

pub const S3_SERVICE: &str = "s3";

#[automock]
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put(&self, path: &str, body: &str) -> Result<()>;
}

pub struct S3ObjectSink<T = ReqwestTransport> {
    transport: T,
    signer: RequestSigner,
    bucket_url: Url,
}

impl S3ObjectSink {
    pub fn new(credentials: Credentials, region: &str, bucket: &str) -> Self {
        Self::with_transport(
            ReqwestTransport::new(),
            RequestSigner::new(credentials, S3_SERVICE, region),
            Url::parse(&format!("https://{bucket}.s3.{region}.amazonaws.com/"))
                .expect("expect a valid bucket url"),
        )
    }
}

impl<T: HttpTransport> S3ObjectSink<T> {
    pub fn with_transport(transport: T, signer: RequestSigner, bucket_url: Url) -> Self {
        Self {
            transport,
            signer,
            bucket_url,
        }
    }
}

#[async_trait]
impl<T: HttpTransport> ObjectSink for S3ObjectSink<T> {
    async fn put(&self, path: &str, body: &str) -> Result<()> {
        let url = self.bucket_url.join(path)?;
        let headers = vec![("content-type".to_string(), "text/csv".to_string())];
        let signed_headers =
            self.signer
                .sign("PUT", &url, &headers, body.as_bytes(), Utc::now());
        let response = self
            .transport
            .send("PUT", url.as_str(), &signed_headers, body)
            .await?;
        if response.status != 200 {
            anyhow::bail!(
                "object store put failed with status {} for {url}: {}",
                response.status,
                response.body
            );
        }
        debug!(%url, bytes = body.len(), "page flushed to object store");
        Ok(())
    }
}
