//! # Alert Dispatch
//!
//! Best-effort fan-out of threat notifications to registered sinks. The
//! hive calls [`AlertHub::notify_threat`] after releasing the threats
//! lock; sinks get a bounded retry and failures are logged, never
//! propagated. Nothing here may block on network I/O - a sink that talks
//! to the outside world must buffer internally.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::threat::{ThreatEvent, ThreatLevel};

/// Alert priority, derived from the threat level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertPriority {
    Info,
    Warning,
    Critical,
}

impl From<ThreatLevel> for AlertPriority {
    fn from(level: ThreatLevel) -> Self {
        match level {
            ThreatLevel::Critical => AlertPriority::Critical,
            ThreatLevel::High => AlertPriority::Warning,
            _ => AlertPriority::Info,
        }
    }
}

/// A delivery target for alerts.
///
/// Implementations must be cheap and non-blocking; delivery that can
/// stall belongs behind an internal queue inside the sink.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, priority: AlertPriority, title: &str, message: &str) -> std::io::Result<()>;
}

/// Default sink: structured log lines.
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn send(&self, priority: AlertPriority, title: &str, message: &str) -> std::io::Result<()> {
        match priority {
            AlertPriority::Critical => tracing::error!(title, message, "alert"),
            AlertPriority::Warning => tracing::warn!(title, message, "alert"),
            AlertPriority::Info => tracing::info!(title, message, "alert"),
        }
        Ok(())
    }
}

/// Delivery attempts per sink per alert.
const MAX_ATTEMPTS: u32 = 2;

/// The sink registry.
pub struct AlertHub {
    sinks: Mutex<Vec<Box<dyn AlertSink>>>,
    delivered: Mutex<u64>,
    failed: Mutex<u64>,
}

impl AlertHub {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
            delivered: Mutex::new(0),
            failed: Mutex::new(0),
        }
    }

    /// Hub pre-loaded with the tracing sink.
    pub fn with_defaults() -> Self {
        let hub = Self::new();
        hub.add_sink(Box::new(TracingSink));
        hub
    }

    pub fn add_sink(&self, sink: Box<dyn AlertSink>) {
        self.sinks.lock().expect("sinks lock").push(sink);
    }

    /// Fan an alert out to every sink with a bounded retry.
    pub fn send(&self, priority: AlertPriority, title: &str, message: &str) {
        let sinks = self.sinks.lock().expect("sinks lock");
        for sink in sinks.iter() {
            let mut ok = false;
            for _ in 0..MAX_ATTEMPTS {
                if sink.send(priority, title, message).is_ok() {
                    ok = true;
                    break;
                }
            }
            if ok {
                *self.delivered.lock().expect("counter") += 1;
            } else {
                *self.failed.lock().expect("counter") += 1;
                tracing::warn!(sink = sink.name(), "alert delivery failed");
            }
        }
    }

    /// Alert derived from a threat event.
    pub fn notify_threat(&self, event: &ThreatEvent) {
        self.send(
            AlertPriority::from(event.level),
            "threat detected",
            &format!(
                "event {} agent {} level {:?}: {}",
                event.event_id, event.agent_id, event.level, event.signature
            ),
        );
    }

    pub fn delivered(&self) -> u64 {
        *self.delivered.lock().expect("counter")
    }

    pub fn failed(&self) -> u64 {
        *self.failed.lock().expect("counter")
    }
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        calls: Arc<AtomicU64>,
        fail: bool,
    }

    impl AlertSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        fn send(&self, _: AlertPriority, _: &str, _: &str) -> std::io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(std::io::Error::other("down"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn priority_from_level() {
        assert_eq!(AlertPriority::from(ThreatLevel::Critical), AlertPriority::Critical);
        assert_eq!(AlertPriority::from(ThreatLevel::High), AlertPriority::Warning);
        assert_eq!(AlertPriority::from(ThreatLevel::Low), AlertPriority::Info);
    }

    #[test]
    fn healthy_sink_gets_one_call() {
        let calls = Arc::new(AtomicU64::new(0));
        let hub = AlertHub::new();
        hub.add_sink(Box::new(CountingSink {
            calls: calls.clone(),
            fail: false,
        }));
        hub.send(AlertPriority::Info, "t", "m");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.delivered(), 1);
        assert_eq!(hub.failed(), 0);
    }

    #[test]
    fn failing_sink_is_retried_then_counted_failed() {
        let calls = Arc::new(AtomicU64::new(0));
        let hub = AlertHub::new();
        hub.add_sink(Box::new(CountingSink {
            calls: calls.clone(),
            fail: true,
        }));
        hub.send(AlertPriority::Critical, "t", "m");
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS as u64);
        assert_eq!(hub.failed(), 1);
    }

    #[test]
    fn notify_threat_reaches_sinks() {
        let calls = Arc::new(AtomicU64::new(0));
        let hub = AlertHub::new();
        hub.add_sink(Box::new(CountingSink {
            calls: calls.clone(),
            fail: false,
        }));
        let mut event = ThreatEvent::new(3, ThreatLevel::Critical, crate::ThreatType::Exfil, "sig");
        event.event_id = 42;
        hub.notify_threat(&event);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
