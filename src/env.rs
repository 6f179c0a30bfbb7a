///! Environment-derived configuration. Only the bin-level wiring reads ENV_CONFIG;
///! the extraction core takes its dependencies and options as explicit parameters.
use crate::query_api::{ConfirmationStatus, ConfirmationStatusFilter};
use crate::signed_client::DEFAULT_REQUEST_TRIES;
use crate::sigv4::Credentials;
use lazy_static::lazy_static;
use std::env;

pub fn get_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn get_env_var_unsafe(key: &str) -> String {
    get_env_var(key).unwrap_or_else(|| panic!("{key} is required in env"))
}

pub struct EnvConfig {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_session_token: Option<String>,
    pub region: String,
    pub s3_bucket: String,
    pub token: String,
    pub network: String,
    pub request_tries: u32,
    pub confirmation_status_filter: Option<String>,
}

impl EnvConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: self.aws_secret_access_key.clone(),
            session_token: self.aws_session_token.clone(),
        }
    }

    /// `final` restricts the walk to finalized transactions, `all` includes
    /// non-final ones too, unset leaves the upstream default in place.
    pub fn confirmation_status_filter(&self) -> Option<ConfirmationStatusFilter> {
        match self.confirmation_status_filter.as_deref() {
            Some("final") => Some(ConfirmationStatusFilter {
                include: vec![ConfirmationStatus::Final],
            }),
            Some("all") => Some(ConfirmationStatusFilter {
                include: vec![ConfirmationStatus::Final, ConfirmationStatus::Nonfinal],
            }),
            Some(other) => {
                panic!("unsupported CONFIRMATION_STATUS_FILTER value: {other}")
            }
            None => None,
        }
    }
}

fn get_env_config() -> EnvConfig {
    EnvConfig {
        aws_access_key_id: get_env_var_unsafe("AWS_ACCESS_KEY_ID"),
        aws_secret_access_key: get_env_var_unsafe("AWS_SECRET_ACCESS_KEY"),
        aws_session_token: get_env_var("AWS_SESSION_TOKEN"),
        region: get_env_var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        s3_bucket: get_env_var_unsafe("S3_BUCKET"),
        token: get_env_var_unsafe("TOKEN").to_lowercase(),
        network: get_env_var("NETWORK")
            .unwrap_or_else(|| "ETHEREUM_MAINNET".to_string()),
        request_tries: get_env_var("REQUEST_TRIES")
            .map(|tries| {
                tries
                    .parse()
                    .expect("expect REQUEST_TRIES to be a positive number")
            })
            .unwrap_or(DEFAULT_REQUEST_TRIES),
        confirmation_status_filter: get_env_var("CONFIRMATION_STATUS_FILTER"),
    }
}

lazy_static! {
    pub static ref ENV_CONFIG: EnvConfig = get_env_config();
}
