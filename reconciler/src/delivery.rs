use crate::config::Config;
use crate::normalize::{IncidentRecord, LinkRequest};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::{Map, Value};

/// Result of sending one payload to the incident API. Only `Accepted`
/// allows the cache key to be removed.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Accepted,
    Rejected { status: StatusCode, reason: String },
    TransportError(reqwest::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryClientError {
    #[error("could not build HTTP client: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid API endpoint: {0}")]
    InvalidUrl(String),
}

pub struct DeliveryClient {
    client: reqwest::Client,
    create_url: Url,
    link_url: Url,
}

impl DeliveryClient {
    pub fn new(config: &Config) -> Result<Self, DeliveryClientError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .timeout(config.http_timeout())
            .build()?;

        let link_url = format!("{}/link", config.api_endpoint.as_str().trim_end_matches('/'));
        let link_url =
            Url::parse(&link_url).map_err(|e| DeliveryClientError::InvalidUrl(e.to_string()))?;

        Ok(DeliveryClient {
            client,
            create_url: config.api_endpoint.clone(),
            link_url,
        })
    }

    pub async fn create_incident(&self, record: &IncidentRecord) -> DeliveryOutcome {
        self.post(&self.create_url, record).await
    }

    pub async fn link_incident(&self, link: &LinkRequest) -> DeliveryOutcome {
        self.post(&self.link_url, link).await
    }

    async fn post<B: Serialize>(&self, url: &Url, body: &B) -> DeliveryOutcome {
        let response = match self.client.post(url.clone()).json(body).send().await {
            Ok(response) => response,
            Err(e) => return DeliveryOutcome::TransportError(e),
        };

        let status = response.status();
        if status == StatusCode::CREATED {
            return DeliveryOutcome::Accepted;
        }

        let reason = match response.bytes().await {
            Ok(body) => rejection_reason(status, &body),
            Err(_) => format!("status code: {}", status.as_u16()),
        };
        DeliveryOutcome::Rejected { status, reason }
    }
}

/// The `errors` field of a JSON object body, or the bare status code.
fn rejection_reason(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(mut fields) => fields.remove("errors").unwrap_or(Value::Null).to_string(),
        Err(_) => format!("status code: {}", status.as_u16()),
    }
}
