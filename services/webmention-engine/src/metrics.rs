// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for inbound and outbound Webmentions.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    received: IntCounterVec,
    sent: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let received = IntCounterVec::new(
            Opts::new("webmention_received_total", "Inbound Webmentions by outcome"),
            &["outcome"],
        )?;
        let sent = IntCounterVec::new(
            Opts::new("webmention_sent_total", "Outbound Webmentions by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(sent.clone()))?;

        Ok(Self {
            registry,
            received,
            sent,
        })
    }

    /// Count an inbound request. `outcome` is "accepted", "deleted" or an error code.
    pub fn record_received(&self, outcome: &str) {
        self.received.with_label_values(&[outcome]).inc();
    }

    pub fn record_sent(&self, outcome: &str) {
        self.sent.with_label_values(&[outcome]).inc();
    }

    /// Text exposition of all counters.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
