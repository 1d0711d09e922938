//! The buffered producer/consumer pair behind the audit subsystem:
//! wait-free-up-to-capacity enqueue, drop-oldest under pressure, PII
//! redaction on the consumer side only, and a bounded graceful shutdown.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::sink::AuditSink;
use super::AuditEvent;
use crate::detectors::pii::redact;

struct Buffer {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Buffer {
    fn push(&self, event: AuditEvent) {
        let mut events = self.events.lock().expect("audit buffer lock poisoned");
        if events.len() >= self.capacity {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
        drop(events);
        self.notify.notify_one();
    }

    fn drain_all(&self) -> Vec<AuditEvent> {
        let mut events = self.events.lock().expect("audit buffer lock poisoned");
        events.drain(..).collect()
    }
}

/// A cheap, cloneable, non-owning handle writers use to enqueue events.
///
/// The subsystem itself owns the buffer and the background consumer task;
/// a handle only has a shared reference — the audit subsystem owns its
/// buffer, writers just get a non-owning handle to it.
#[derive(Clone)]
pub struct AuditHandle {
    buffer: Arc<Buffer>,
    redact_pii: bool,
}

impl AuditHandle {
    /// Enqueue an event. Wait-free up to capacity; at capacity the oldest
    /// buffered event is dropped and counted.
    ///
    /// Redaction happens later, on the consumer — this call never blocks on
    /// I/O or regex work.
    pub fn enqueue(&self, event: AuditEvent) {
        if self.buffer.closed.load(Ordering::Acquire) {
            return;
        }
        self.buffer.push(event);
    }

    /// Whether PII redaction is enabled for this subsystem.
    #[must_use]
    pub fn redact_pii(&self) -> bool {
        self.redact_pii
    }

    /// Number of events dropped so far due to a full buffer.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.buffer.dropped.load(Ordering::Relaxed)
    }

    /// Current buffer depth, for Health/Metrics.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.buffer.events.lock().expect("audit buffer lock poisoned").len()
    }
}

/// Owns the event buffer and the background consumer task that redacts,
/// serializes, and appends events to a [`AuditSink`].
pub struct AuditSubsystem {
    buffer: Arc<Buffer>,
    redact_pii: bool,
    consumer: Option<JoinHandle<()>>,
}

impl AuditSubsystem {
    /// Start the subsystem: spawns the background consumer task immediately.
    ///
    /// Corresponds to `Audit.configure(sink, redact_pii, buffer_size)`.
    #[must_use]
    pub fn configure(sink: Arc<dyn AuditSink>, redact_pii: bool, buffer_size: usize) -> Self {
        let buffer = Arc::new(Buffer {
            events: Mutex::new(VecDeque::with_capacity(buffer_size)),
            capacity: buffer_size.max(1),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let consumer_buffer = buffer.clone();
        let consumer = tokio::spawn(async move {
            run_consumer(consumer_buffer, sink, redact_pii).await;
        });

        Self {
            buffer,
            redact_pii,
            consumer: Some(consumer),
        }
    }

    /// A non-owning handle writers use to enqueue events.
    #[must_use]
    pub fn handle(&self) -> AuditHandle {
        AuditHandle {
            buffer: self.buffer.clone(),
            redact_pii: self.redact_pii,
        }
    }

    /// Number of events dropped so far due to a full buffer.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.buffer.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting new events, wait up to `timeout` for the consumer to
    /// drain the buffer, then abort it. Returns the number of events left
    /// unsent ("lost_events", reported on the next `configure`).
    pub async fn shutdown(mut self, timeout: Duration) -> u64 {
        self.buffer.closed.store(true, Ordering::Release);
        self.buffer.notify.notify_one();

        let drained = tokio::time::timeout(timeout, async {
            loop {
                if self.buffer.events.lock().expect("audit buffer lock poisoned").is_empty() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        if let Some(handle) = self.consumer.take() {
            handle.abort();
        }

        if drained.is_ok() {
            0
        } else {
            self.buffer.drain_all().len() as u64
        }
    }
}

async fn run_consumer(buffer: Arc<Buffer>, sink: Arc<dyn AuditSink>, redact_pii: bool) {
    loop {
        let pending: Vec<AuditEvent> = {
            let mut events = buffer.events.lock().expect("audit buffer lock poisoned");
            if events.is_empty() {
                None
            } else {
                Some(events.drain(..).collect())
            }
        }
        .unwrap_or_default();

        if pending.is_empty() {
            if buffer.closed.load(Ordering::Acquire) {
                return;
            }
            buffer.notify.notified().await;
            continue;
        }

        for mut event in pending {
            if redact_pii {
                if let Some(content) = event.redacted_content.as_ref() {
                    event.redacted_content = Some(redact(content));
                }
            }
            write_with_backoff(sink.as_ref(), &event).await;
        }
    }
}

async fn write_with_backoff(sink: &dyn AuditSink, event: &AuditEvent) {
    let Ok(line) = serde_json::to_string(event) else {
        tracing::warn!("failed to serialize audit event; dropping");
        return;
    };

    let mut delay = Duration::from_millis(10);
    for attempt in 0..5 {
        match sink.append(&line).await {
            Ok(()) => return,
            Err(err) => {
                tracing::warn!(sink = sink.name(), attempt, error = %err, "audit sink write failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
    tracing::warn!(sink = sink.name(), "audit sink write abandoned after retries");
}
