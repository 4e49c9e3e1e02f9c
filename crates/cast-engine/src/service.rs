//! The observer: wires node events into the pipeline.
//!
//! Pending hashes fan out through the rate limiter into mempool ingestion;
//! heads go to the reconciler first, then trigger a forecast; a resync
//! clears every piece of stream-derived state before any later event is
//! processed. Ingest is cheap and never dropped; annotation is lazy and
//! happens at forecast time.

use std::sync::Arc;

use alloy::primitives::B256;
use eyre::Result;
use tokio::sync::{mpsc, watch};

use cast_data::Store;
use cast_decode::Decoder;
use cast_node::{NodeClient, NodeError, NodeEvent, RateLimiter};

use crate::basefee::BaseFeeOracle;
use crate::forecaster::Forecaster;
use crate::mempool::MempoolState;
use crate::predictions::{HeadTracker, PredictionBook};
use crate::reconciler::Reconciler;

/// Long-running observer over one node session.
pub struct Observer {
    client: NodeClient,
    events: mpsc::Receiver<NodeEvent>,
    limiter: RateLimiter,
    mempool: Arc<MempoolState>,
    basefee: Arc<BaseFeeOracle>,
    head: Arc<HeadTracker>,
    predictions: Arc<PredictionBook>,
    forecaster: Arc<Forecaster>,
    reconciler: Arc<Reconciler>,
}

impl Observer {
    /// Wires the pipeline around an established node session.
    pub fn new(
        client: NodeClient,
        events: mpsc::Receiver<NodeEvent>,
        limiter: RateLimiter,
        store: Arc<Store>,
        decoder: Arc<Decoder>,
    ) -> Self {
        let mempool = Arc::new(MempoolState::new());
        let basefee = Arc::new(BaseFeeOracle::new());
        let head = Arc::new(HeadTracker::new());
        let predictions = Arc::new(PredictionBook::new());

        let forecaster = Arc::new(Forecaster::new(
            mempool.clone(),
            basefee.clone(),
            head.clone(),
            predictions.clone(),
            decoder,
            store.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            store,
            mempool.clone(),
            basefee.clone(),
            head.clone(),
            predictions.clone(),
        ));

        Self {
            client,
            events,
            limiter,
            mempool,
            basefee,
            head,
            predictions,
            forecaster,
            reconciler,
        }
    }

    /// Consumes node events until shutdown. In-flight store writes finish
    /// before this returns; the forecast timer stops with it.
    ///
    /// # Errors
    /// Returns error only on unrecoverable wiring failures; per-event
    /// failures are classified, logged, and skipped.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let forecast_timer = tokio::spawn(self.forecaster.clone().run_loop(shutdown.clone()));
        let mut shutdown_rx = shutdown.clone();

        loop {
            let event = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                event = self.events.recv() => event,
            };
            let Some(event) = event else {
                tracing::warn!("node event channel closed");
                break;
            };
            self.handle_event(event).await;
        }

        if *shutdown.borrow() {
            let _ = forecast_timer.await;
        } else {
            forecast_timer.abort();
        }
        tracing::info!("observer stopped");
        Ok(())
    }

    async fn handle_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::PendingTx(hash) => self.spawn_ingest(hash),
            NodeEvent::Head(head) => {
                tracing::debug!(block_number = head.number, "new head");
                if let Err(err) = self
                    .reconciler
                    .on_head(head.number, &self.client, &self.limiter)
                    .await
                {
                    tracing::warn!(%err, block_number = head.number, "reconciliation failed");
                }
                if let Err(err) = self.forecaster.run_once().await {
                    tracing::warn!(%err, "head-triggered forecast failed");
                }
            }
            NodeEvent::Resync => self.resync(),
        }
    }

    /// Hydrates one pending hash off the critical path. The limiter
    /// bounds concurrency; failures lose the event, never the session.
    fn spawn_ingest(&self, hash: B256) {
        if self.mempool.get(&hash).is_some() {
            return;
        }
        let client = self.client.clone();
        let limiter = self.limiter.clone();
        let mempool = self.mempool.clone();
        tokio::spawn(async move {
            match limiter.submit(client.fetch_tx(hash)).await {
                Ok(Some(tx)) => {
                    mempool.ingest(tx);
                }
                Ok(None) => {
                    tracing::trace!(%hash, "pending transaction already gone");
                }
                Err(NodeError::RateLimited) => {
                    tracing::debug!(%hash, "rate-limited, pausing ingest worker");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
                Err(NodeError::Disconnected) => {
                    // The resync event will clear derived state anyway.
                }
                Err(err) => {
                    tracing::debug!(%hash, %err, "pending fetch failed, event lost");
                }
            }
        });
    }

    /// Clears every piece of stream-derived state after a reconnect.
    fn resync(&self) {
        tracing::warn!("node session resynced, clearing derived state");
        self.mempool.clear();
        self.predictions.clear();
        self.basefee.clear();
        self.head.clear();
        self.reconciler.reset();
    }
}
