// Progress notifications: the trade emits events, sinks decide where they go
pub mod events;
pub mod telegram;

pub use events::{leg_label, Severity, TradeEvent};
pub use telegram::TelegramSink;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Longest a single sink may take to accept one event
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// A transport for trade events
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &TradeEvent) -> anyhow::Result<()>;
}

/// Writes events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &TradeEvent) -> anyhow::Result<()> {
        match event.severity() {
            Severity::Info => tracing::info!("{}", event),
            Severity::Error => tracing::error!("{}", event),
        }
        Ok(())
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TradeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TradeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, event: &TradeEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// Fans events out to every sink. Delivery is best-effort: a failing or
/// hung sink is logged and skipped, never surfaced to the caller.
#[derive(Clone)]
pub struct Notifier {
    sinks: Vec<Arc<dyn EventSink>>,
    delivery_timeout: Duration,
}

impl Notifier {
    /// Notifier with the log sink attached
    pub fn new() -> Self {
        Self::silent().with_sink(Arc::new(LogSink))
    }

    /// Notifier with no sinks at all
    pub fn silent() -> Self {
        Self {
            sinks: Vec::new(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_delivery_timeout(mut self, delivery_timeout: Duration) -> Self {
        self.delivery_timeout = delivery_timeout;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub async fn emit(&self, event: TradeEvent) {
        for sink in &self.sinks {
            match tokio::time::timeout(self.delivery_timeout, sink.deliver(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(sink = sink.name(), "Failed to deliver event: {}", e);
                }
                Err(_) => {
                    tracing::warn!(
                        sink = sink.name(),
                        timeout_ms = self.delivery_timeout.as_millis() as u64,
                        "Event delivery timed out, dropping it"
                    );
                }
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
