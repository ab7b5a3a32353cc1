//! Prometheus gauges and the periodic store sampler

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramTimer, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use dialog_core::{SessionStore, StoreError};

pub struct DialogMetrics {
    registry: Registry,
    conversation_depth: IntGaugeVec,
    active_chats: IntGauge,
    request_seconds: Histogram,
}

impl DialogMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let conversation_depth = IntGaugeVec::new(
            Opts::new("dialog_conversation_depth", "Stored turns per active chat"),
            &["chat_id"],
        )?;
        let active_chats = IntGauge::new("dialog_active_chats", "Number of active chats")?;
        let request_seconds = Histogram::with_opts(HistogramOpts::new(
            "dialog_request_processing_seconds",
            "Time spent answering a conversation turn",
        ))?;

        registry.register(Box::new(conversation_depth.clone()))?;
        registry.register(Box::new(active_chats.clone()))?;
        registry.register(Box::new(request_seconds.clone()))?;

        Ok(Self {
            registry,
            conversation_depth,
            active_chats,
            request_seconds,
        })
    }

    /// Observes the elapsed time into the request histogram when dropped.
    pub fn start_request_timer(&self) -> HistogramTimer {
        self.request_seconds.start_timer()
    }

    /// Refresh gauges from the store. Chats that ended since the last
    /// sample disappear from the depth gauge.
    pub async fn sample<S: SessionStore + ?Sized>(&self, store: &S) -> Result<(), StoreError> {
        let chat_ids = store.list_active_chat_ids().await?;
        let mut depths = Vec::with_capacity(chat_ids.len());
        for chat_id in chat_ids {
            depths.push((chat_id, store.turn_count(chat_id).await?));
        }
        let active = store.count_active_sessions().await?;

        self.conversation_depth.reset();
        for (chat_id, depth) in depths {
            self.conversation_depth
                .with_label_values(&[chat_id.to_string().as_str()])
                .set(depth as i64);
        }
        self.active_chats.set(active as i64);
        Ok(())
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Poll the store every `interval` until the task is aborted.
pub fn spawn_sampler<S>(
    metrics: Arc<DialogMetrics>,
    store: Arc<S>,
    interval: Duration,
) -> JoinHandle<()>
where
    S: SessionStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match metrics.sample(store.as_ref()).await {
                Ok(()) => debug!("metrics sampled"),
                Err(e) => warn!(error = %e, "Failed to sample session metrics"),
            }
        }
    })
}
