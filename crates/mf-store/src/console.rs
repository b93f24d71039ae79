//! Console price publisher: one line per stored quote on stdout.

use std::io::Write;

use chrono::{DateTime, Utc};
use mf_core::Quote;
use mf_core::ports::PricePublisher;

#[derive(Debug, Default)]
pub struct ConsolePublisher;

impl ConsolePublisher {
    pub fn new() -> Self {
        Self
    }
}

/// `[HH:MM:SS.mmm] source:symbol: $price`
pub fn format_quote(quote: &Quote, at: DateTime<Utc>) -> String {
    format!("[{}] {}: ${:.6}", at.format("%H:%M:%S%.3f"), quote.key(), quote.price)
}

impl PricePublisher for ConsolePublisher {
    fn publish(&self, quote: &Quote) -> anyhow::Result<()> {
        let line = format_quote(quote, quote.observed_at);
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        Ok(())
    }
}
