//! Window key: the `source:symbol` identity of one rolling window.
//!
//! The rendered form is kept as the single allocation and both halves are
//! borrowed from it, since the rendered key is what every store call needs.

use std::fmt;

/// Identity of one rolling window, rendered as `source:symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey {
    rendered: String,
    split: usize,
}

impl WindowKey {
    pub fn new(source: &str, symbol: &str) -> Self {
        let mut rendered = String::with_capacity(source.len() + 1 + symbol.len());
        rendered.push_str(source);
        rendered.push(':');
        rendered.push_str(symbol);
        Self { rendered, split: source.len() }
    }

    /// Parse a rendered key. Splits on the first `:`; both halves must be
    /// non-empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let (source, symbol) = raw.split_once(':')?;
        if source.is_empty() || symbol.is_empty() {
            return None;
        }
        Some(Self::new(source, symbol))
    }

    pub fn source(&self) -> &str {
        &self.rendered[..self.split]
    }

    pub fn symbol(&self) -> &str {
        &self.rendered[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}
