///! Persisted extraction cursor. One checkpoint per extracted token, stored as a
///! flat JSON string in the parameter store and overwritten last-writer-wins.
///! `last_saved_tx_time` only ever moves forward because pages are walked in
///! ascending timestamp order.
use crate::signed_client::{HttpTransport, ReqwestTransport};
use crate::sigv4::{Credentials, RequestSigner};
use async_trait::async_trait;
use chrono::Utc;
use mockall::automock;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const SSM_SERVICE: &str = "ssm";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub page_number: u64,
    pub last_saved_tx_time: f64,
}

pub fn checkpoint_key(token: &str) -> String {
    format!("token-transfers-{}", token.to_lowercase())
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint store request failed with status {status}: {body}")]
    Store { status: u16, body: String },
    #[error("failed to decode stored checkpoint: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

#[automock]
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// A missing checkpoint loads as the zero checkpoint (first run). Store
    /// failures are propagated instead of being swallowed: a transient outage
    /// must abort the run rather than silently restart the extraction from
    /// scratch.
    async fn load(&self, key: &str) -> Result<Checkpoint, CheckpointError>;

    async fn save(
        &self,
        key: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError>;
}

#[derive(Deserialize)]
struct GetParameterResponse {
    #[serde(rename = "Parameter")]
    parameter: Parameter,
}

#[derive(Deserialize)]
struct Parameter {
    #[serde(rename = "Value")]
    value: String,
}

pub struct SsmCheckpointStore<T = ReqwestTransport> {
    transport: T,
    signer: RequestSigner,
    endpoint: Url,
}

impl SsmCheckpointStore {
    pub fn new(credentials: Credentials, region: &str) -> Self {
        Self::with_transport(
            ReqwestTransport::new(),
            RequestSigner::new(credentials, SSM_SERVICE, region),
            Url::parse(&format!("https://ssm.{region}.amazonaws.com/"))
                .expect("expect a valid parameter store url"),
        )
    }
}

impl<T: HttpTransport> SsmCheckpointStore<T> {
    pub fn with_transport(transport: T, signer: RequestSigner, endpoint: Url) -> Self {
        Self {
            transport,
            signer,
            endpoint,
        }
    }

    async fn call(
        &self,
        target: &str,
        body: String,
    ) -> Result<(u16, String), CheckpointError> {
        let headers = vec![
            (
                "content-type".to_string(),
                "application/x-amz-json-1.1".to_string(),
            ),
            ("x-amz-target".to_string(), target.to_string()),
        ];
        let signed_headers =
            self.signer
                .sign("POST", &self.endpoint, &headers, body.as_bytes(), Utc::now());
        let response = self
            .transport
            .send("POST", self.endpoint.as_str(), &signed_headers, &body)
            .await?;
        Ok((response.status, response.body))
    }
}

#[async_trait]
impl<T: HttpTransport> CheckpointStore for SsmCheckpointStore<T> {
    async fn load(&self, key: &str) -> Result<Checkpoint, CheckpointError> {
        let body = serde_json::json!({ "Name": key }).to_string();
        let (status, response_body) = self.call("AmazonSSM.GetParameter", body).await?;
        if status == 400 && response_body.contains("ParameterNotFound") {
            info!(key, "no checkpoint stored, starting from the zero checkpoint");
            return Ok(Checkpoint::default());
        }
        if status != 200 {
            return Err(CheckpointError::Store {
                status,
                body: response_body,
            });
        }
        let response: GetParameterResponse = serde_json::from_str(&response_body)?;
        let checkpoint: Checkpoint = serde_json::from_str(&response.parameter.value)?;
        debug!(key, ?checkpoint, "loaded checkpoint");
        Ok(checkpoint)
    }

    async fn save(
        &self,
        key: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let value = serde_json::to_string(checkpoint)?;
        let body = serde_json::json!({
            "Name": key,
            "Value": value,
            "Type": "String",
            "Overwrite": true,
        })
        .to_string();
        debug!(key, %value, "persisting checkpoint");
        let (status, response_body) = self.call("AmazonSSM.PutParameter", body).await?;
        if status != 200 {
            return Err(CheckpointError::Store {
                status,
                body: response_body,
            });
        }
        Ok(())
    }
}
