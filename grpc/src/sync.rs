//! The policy-sync dispatcher.
//!
//! Consumes the control plane's ordered update stream and applies it to the
//! shared [`PolicyStore`]. When a stream drops, the store is discarded (so
//! in-sync falls back to false and decisions deny) and the dispatcher
//! reconnects with exponential backoff; the control plane replays the full
//! store on every new stream.

use crate::metrics::Metrics;
use anyhow::Result;
use async_trait::async_trait;
use futures::prelude::*;
use policy_agent_core::PolicyStore;
use policy_agent_proto::sync::ToDataplane;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, trace, warn};

/// Obtains policy-sync streams from the control plane. The transport shim
/// implements this over the streaming RPC client.
#[async_trait]
pub trait SyncClient {
    type Stream: Stream<Item = Result<ToDataplane, tonic::Status>> + Send + Unpin;

    async fn connect(&mut self) -> Result<Self::Stream>;
}

/// Reconnect tuning.
#[derive(Clone, Debug)]
pub struct Config {
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backoff_min: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
        }
    }
}

/// Single writer to the policy store.
pub struct Dispatcher<C> {
    client: C,
    store: Arc<PolicyStore>,
    config: Config,
    metrics: Metrics,
}

// === impl Dispatcher ===

impl<C: SyncClient> Dispatcher<C> {
    pub fn new(client: C, store: Arc<PolicyStore>, config: Config, metrics: Metrics) -> Self {
        Self {
            client,
            store,
            config,
            metrics,
        }
    }

    /// Drives sync until shutdown is signaled.
    pub async fn run(mut self, shutdown: drain::Watch) -> Result<()> {
        let signaled = shutdown.signaled();
        tokio::pin!(signaled);
        let mut backoff = self.config.backoff_min;

        loop {
            let connected = tokio::select! {
                _ = &mut signaled => {
                    debug!("shutdown signaled");
                    return Ok(());
                }
                res = self.client.connect() => match res {
                    Ok(stream) => Some(stream),
                    Err(error) => {
                        warn!(%error, "failed to open sync stream");
                        None
                    }
                }
            };

            if let Some(mut stream) = connected {
                info!("sync stream connected");
                loop {
                    let msg = tokio::select! {
                        _ = &mut signaled => {
                            debug!("shutdown signaled");
                            return Ok(());
                        }
                        msg = stream.next() => msg,
                    };
                    match msg {
                        Some(Ok(ToDataplane {
                            sequence_number,
                            payload,
                        })) => {
                            trace!(seq = sequence_number, "sync update");
                            match payload {
                                Some(payload) => self.store.apply(payload),
                                None => debug!(seq = sequence_number, "update without payload"),
                            }
                            // The connection is healthy; forget past failures.
                            backoff = self.config.backoff_min;
                        }
                        Some(Err(status)) => {
                            warn!(%status, "sync stream failed");
                            break;
                        }
                        None => {
                            warn!("sync stream ended");
                            break;
                        }
                    }
                }
                // Everything learned over the stream is stale the moment it
                // drops; deny until a fresh replay is in sync.
                self.store.reset();
                self.metrics.record_sync_reset();
            }

            tokio::select! {
                _ = &mut signaled => {
                    debug!("shutdown signaled");
                    return Ok(());
                }
                _ = time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.config.backoff_max);
        }
    }
}
