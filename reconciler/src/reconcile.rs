use crate::cache::CacheError;
use crate::classify::{Classifier, KeyKind};
use crate::cluster::ClusterView;
use crate::config::Config;
use crate::delivery::{DeliveryClient, DeliveryClientError, DeliveryOutcome};
use crate::metrics_defs::{
    DELIVERY_ACCEPTED, DELIVERY_REJECTED, DELIVERY_TRANSPORT_FAILED, KEY_DECODE_FAILED,
    KEY_DELETE_FAILED, KEY_NOT_FOUND, KEYS_DISCOVERED, PASS_DURATION,
};
use crate::normalize::{DecodeError, IncidentRecord, LinkRequest};
use reqwest::StatusCode;
use shared::{counter, gauge, histogram};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

/// Why a single key was left in the cache. None of these stop the pass.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("key not found on any cache node")]
    NotFound,
    #[error("cache error: {0}")]
    Cache(CacheError),
    #[error("could not decode cached value: {0}")]
    Decode(#[from] DecodeError),
    #[error("rejected by API ({status}): {reason}")]
    Rejected { status: StatusCode, reason: String },
    #[error("could not reach API: {0}")]
    Transport(reqwest::Error),
    #[error("delivered but the key could not be deleted: {0}")]
    Delete(CacheError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not an incident key, left untouched.
    Unmatched,
    /// Accepted by the API and removed from the cache.
    Delivered,
}

/// Per-outcome key counts for one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub discovered: usize,
    pub unmatched: usize,
    pub delivered: usize,
    pub not_found: usize,
    pub cache_failed: usize,
    pub decode_failed: usize,
    pub rejected: usize,
    pub transport_failed: usize,
    pub delete_failed: usize,
}

/// Process-wide context: built once at startup and shared by every pass.
pub struct Reconciler {
    cluster: ClusterView,
    classifier: Classifier,
    delivery: DeliveryClient,
    auth_token: String,
    interval: Duration,
}

impl Reconciler {
    pub fn new(config: &Config) -> Result<Self, DeliveryClientError> {
        Self::with_cluster(config, ClusterView::from_config(config))
    }

    pub fn with_cluster(config: &Config, cluster: ClusterView) -> Result<Self, DeliveryClientError> {
        Ok(Reconciler {
            cluster,
            classifier: Classifier::new(),
            delivery: DeliveryClient::new(config)?,
            auth_token: config.auth_token.clone(),
            interval: config.loop_interval(),
        })
    }

    /// Runs passes back to back, sleeping the configured interval in
    /// between, until `shutdown` turns true. A pass in progress is always
    /// completed; the sleep is cut short.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            self.run_pass().await;

            tracing::info!(
                "Sleeping for {} seconds before next check...",
                self.interval.as_secs()
            );
            tokio::select! {
                _ = sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    // Nobody can request a shutdown anymore, keep the pace
                    if changed.is_err() {
                        sleep(self.interval).await;
                    }
                }
            }
        }
        tracing::info!("Reconciler stopped");
    }

    /// Discovers every key and processes them one at a time.
    pub async fn run_pass(&self) -> PassReport {
        let start = Instant::now();

        let keys = self.cluster.discover_keys().await;
        gauge!(KEYS_DISCOVERED).set(keys.len() as f64);

        let mut report = PassReport {
            discovered: keys.len(),
            ..Default::default()
        };

        for key in &keys {
            let result = self.process_key(key).await;
            record_outcome(&mut report, key, result);
        }

        histogram!(PASS_DURATION).record(start.elapsed().as_secs_f64());
        tracing::info!(
            discovered = report.discovered,
            delivered = report.delivered,
            unmatched = report.unmatched,
            "Pass complete"
        );
        report
    }

    /// Fetch, decode and deliver one key, deleting it only once the API
    /// has accepted it.
    pub async fn process_key(&self, key: &str) -> Result<KeyOutcome, KeyError> {
        let outcome = match self.classifier.classify(key) {
            KeyKind::Unmatched => return Ok(KeyOutcome::Unmatched),
            KeyKind::CreateIncident { incident_uuid, .. } => {
                tracing::info!(key, incident = %incident_uuid, "Getting incident");
                let raw = self.fetch(key).await?;
                let record = IncidentRecord::from_cached(&raw, &self.auth_token)?;
                tracing::debug!(key, domain = record.domain(), "Sending incident");
                self.delivery.create_incident(&record).await
            }
            KeyKind::LinkIncident { parent_uuid } => {
                tracing::info!(key, parent = %parent_uuid, "Getting incident link");
                let raw = self.fetch(key).await?;
                let link = LinkRequest::from_cached(&parent_uuid, &raw, &self.auth_token)?;
                self.delivery.link_incident(&link).await
            }
        };

        match outcome {
            DeliveryOutcome::Accepted => {}
            DeliveryOutcome::Rejected { status, reason } => {
                return Err(KeyError::Rejected { status, reason });
            }
            DeliveryOutcome::TransportError(e) => return Err(KeyError::Transport(e)),
        }
        counter!(DELIVERY_ACCEPTED).increment(1);

        self.cluster.delete(key).await.map_err(KeyError::Delete)?;
        Ok(KeyOutcome::Delivered)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, KeyError> {
        self.cluster.fetch(key).await.map_err(|e| match e {
            CacheError::NotFound => KeyError::NotFound,
            e => KeyError::Cache(e),
        })
    }
}

fn record_outcome(report: &mut PassReport, key: &str, result: Result<KeyOutcome, KeyError>) {
    match result {
        Ok(KeyOutcome::Unmatched) => report.unmatched += 1,
        Ok(KeyOutcome::Delivered) => {
            report.delivered += 1;
            tracing::info!(key, "Successfully deleted key after delivery");
        }
        Err(e @ KeyError::NotFound) => {
            report.not_found += 1;
            counter!(KEY_NOT_FOUND).increment(1);
            tracing::warn!(key, error = %e, "Skipping key");
        }
        Err(e @ KeyError::Cache(_)) => {
            report.cache_failed += 1;
            tracing::warn!(key, error = %e, "Skipping key");
        }
        Err(e @ KeyError::Decode(_)) => {
            // Repeats every pass until someone fixes or removes the value
            report.decode_failed += 1;
            counter!(KEY_DECODE_FAILED).increment(1);
            tracing::error!(key, error = %e, "Malformed cached value, key left for inspection");
        }
        Err(KeyError::Rejected { status, reason }) => {
            report.rejected += 1;
            counter!(DELIVERY_REJECTED).increment(1);
            tracing::warn!(key, status = status.as_u16(), reason = %reason, "Delivery rejected");
        }
        Err(e @ KeyError::Transport(_)) => {
            report.transport_failed += 1;
            counter!(DELIVERY_TRANSPORT_FAILED).increment(1);
            tracing::warn!(key, error = %e, "Delivery failed");
        }
        Err(e @ KeyError::Delete(_)) => {
            // Delivered, the next pass will deliver it again
            report.delivered += 1;
            report.delete_failed += 1;
            counter!(KEY_DELETE_FAILED).increment(1);
            tracing::warn!(key, error = %e, "Error deleting key");
        }
    }
}
