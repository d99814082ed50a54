//! Lightweight Prometheus-compatible metrics for the CoAP adapter.
//!
//! Uses atomic counters so dispatch workers can record without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub struct Metrics {
    /// Datagrams read off the socket (counter)
    pub datagrams_received_total: AtomicU64,
    /// Datagrams dropped because the dispatch queue was full (counter)
    pub datagrams_dropped_total: AtomicU64,
    /// Datagrams that failed to parse (counter)
    pub malformed_total: AtomicU64,
    /// Responses written back to the socket (counter)
    pub responses_sent_total: AtomicU64,
    /// Requests rejected by authorization, Reset or handled (counter)
    pub auth_failures_total: AtomicU64,
    /// Subscriptions torn down by Reset (counter)
    pub unsubscribes_total: AtomicU64,
    /// Teardown calls that failed after successful authorization (counter)
    pub teardown_failures_total: AtomicU64,
    /// Transient socket read errors that were retried (counter)
    pub transient_read_errors_total: AtomicU64,
    /// Server start time (for uptime calculation)
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            datagrams_received_total: AtomicU64::new(0),
            datagrams_dropped_total: AtomicU64::new(0),
            malformed_total: AtomicU64::new(0),
            responses_sent_total: AtomicU64::new(0),
            auth_failures_total: AtomicU64::new(0),
            unsubscribes_total: AtomicU64::new(0),
            teardown_failures_total: AtomicU64::new(0),
            transient_read_errors_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let uptime = self.start_time.elapsed().as_secs();
        format!(
            "# HELP coap_datagrams_received_total Datagrams read from the socket\n\
             # TYPE coap_datagrams_received_total counter\n\
             coap_datagrams_received_total {}\n\
             # HELP coap_datagrams_dropped_total Datagrams dropped with a full dispatch queue\n\
             # TYPE coap_datagrams_dropped_total counter\n\
             coap_datagrams_dropped_total {}\n\
             # HELP coap_malformed_total Datagrams that were not valid CoAP\n\
             # TYPE coap_malformed_total counter\n\
             coap_malformed_total {}\n\
             # HELP coap_responses_sent_total Responses sent\n\
             # TYPE coap_responses_sent_total counter\n\
             coap_responses_sent_total {}\n\
             # HELP coap_auth_failures_total Requests that failed authorization\n\
             # TYPE coap_auth_failures_total counter\n\
             coap_auth_failures_total {}\n\
             # HELP coap_unsubscribes_total Subscriptions torn down by Reset\n\
             # TYPE coap_unsubscribes_total counter\n\
             coap_unsubscribes_total {}\n\
             # HELP coap_teardown_failures_total Failed subscription teardowns\n\
             # TYPE coap_teardown_failures_total counter\n\
             coap_teardown_failures_total {}\n\
             # HELP coap_transient_read_errors_total Retried socket read errors\n\
             # TYPE coap_transient_read_errors_total counter\n\
             coap_transient_read_errors_total {}\n\
             # HELP coap_uptime_seconds Adapter uptime in seconds\n\
             # TYPE coap_uptime_seconds gauge\n\
             coap_uptime_seconds {}\n",
            self.datagrams_received_total.load(Ordering::Relaxed),
            self.datagrams_dropped_total.load(Ordering::Relaxed),
            self.malformed_total.load(Ordering::Relaxed),
            self.responses_sent_total.load(Ordering::Relaxed),
            self.auth_failures_total.load(Ordering::Relaxed),
            self.unsubscribes_total.load(Ordering::Relaxed),
            self.teardown_failures_total.load(Ordering::Relaxed),
            self.transient_read_errors_total.load(Ordering::Relaxed),
            uptime,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
