//! Inbound line decoder.
//!
//! Sources speak one of three text dialects, tried in order:
//!
//! 1. JSON object: `{"symbol": "BTCUSD", "price": 42000.5}`. `pair` is an
//!    alias for `symbol`, and `price` may be a number or a numeric string.
//! 2. Colon: `ETHUSD:1800.25`, exactly one colon.
//! 3. Whitespace: `SOLUSD 20.1 ...`, first two fields, rest ignored.
//!
//! Each dialect is a pure strategy returning an [`Attempt`]. A strategy whose
//! shape matched but whose content is bad rejects the line outright; later
//! dialects are only tried when the shape did not match at all.

use mf_core::error::{DecodeError, Dialect};
use mf_core::{Quote, is_valid_price, time_util};

/// Outcome of one dialect strategy.
#[derive(Debug, PartialEq)]
pub enum Attempt {
    /// Shape matched and the line is a quote.
    Parsed { symbol: String, price: f64 },
    /// Shape matched but content is invalid. Stops the search.
    Rejected(DecodeError),
    /// Not this dialect.
    NoMatch,
}

type Strategy = fn(&str) -> Attempt;

const STRATEGIES: [Strategy; 3] = [parse_json, parse_colon, parse_whitespace];

/// Longest slice of an unparseable line carried into the error.
const MAX_ECHO_CHARS: usize = 64;

/// Decode one trimmed, non-blank line from `source` into a [`Quote`].
///
/// The quote is stamped with the decode time.
pub fn decode(line: &str, source: &str) -> Result<Quote, DecodeError> {
    for strategy in STRATEGIES {
        match strategy(line) {
            Attempt::Parsed { symbol, price } => {
                return Ok(Quote {
                    source: source.to_string(),
                    symbol,
                    price,
                    observed_at: time_util::now_utc(),
                });
            }
            Attempt::Rejected(e) => return Err(e),
            Attempt::NoMatch => {}
        }
    }
    Err(DecodeError::UnknownFormat(line.chars().take(MAX_ECHO_CHARS).collect()))
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// JSON object dialect. Valid JSON that is not an object is not a match.
pub fn parse_json(line: &str) -> Attempt {
    if !line.starts_with('{') {
        return Attempt::NoMatch;
    }
    let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(line) else {
        return Attempt::NoMatch;
    };

    let symbol = obj
        .get("symbol")
        .and_then(|v| v.as_str())
        .or_else(|| obj.get("pair").and_then(|v| v.as_str()))
        .map(str::trim)
        .unwrap_or_default();
    if symbol.is_empty() {
        return Attempt::Rejected(DecodeError::MissingSymbol(Dialect::Json));
    }

    let price = match obj.get("price") {
        Some(serde_json::Value::Number(n)) => match n.as_f64() {
            Some(p) if is_valid_price(p) => p,
            _ => return invalid_price(Dialect::Json, &n.to_string()),
        },
        Some(serde_json::Value::String(s)) => match parse_price(s.trim()) {
            Some(p) => p,
            None => return invalid_price(Dialect::Json, s),
        },
        _ => return Attempt::Rejected(DecodeError::MissingPrice(Dialect::Json)),
    };

    Attempt::Parsed { symbol: symbol.to_string(), price }
}

/// `SYMBOL:PRICE` dialect.
pub fn parse_colon(line: &str) -> Attempt {
    let Some((symbol, price)) = line.split_once(':') else {
        return Attempt::NoMatch;
    };
    if price.contains(':') {
        return Attempt::NoMatch;
    }
    fields_to_attempt(Dialect::Colon, symbol.trim(), price.trim())
}

/// `SYMBOL PRICE ...` dialect.
pub fn parse_whitespace(line: &str) -> Attempt {
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(symbol), Some(price)) => fields_to_attempt(Dialect::Whitespace, symbol, price),
        _ => Attempt::NoMatch,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fields_to_attempt(dialect: Dialect, symbol: &str, raw_price: &str) -> Attempt {
    if symbol.is_empty() {
        return Attempt::Rejected(DecodeError::MissingSymbol(dialect));
    }
    match parse_price(raw_price) {
        Some(price) => Attempt::Parsed { symbol: symbol.to_string(), price },
        None => invalid_price(dialect, raw_price),
    }
}

fn invalid_price(dialect: Dialect, raw: &str) -> Attempt {
    Attempt::Rejected(DecodeError::InvalidPrice { dialect, raw: raw.to_string() })
}

/// Parse a price string. Negative, NaN and infinite values are rejected.
#[inline]
pub fn parse_price(raw: &str) -> Option<f64> {
    fast_float2::parse::<f64, _>(raw).ok().filter(|p| is_valid_price(*p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(line: &str) -> Quote {
        decode(line, "ex1").unwrap()
    }

    #[test]
    fn structured_quote() {
        let q = ok(r#"{"symbol":"BTCUSD","price":42000.5}"#);
        assert_eq!(q.source, "ex1");
        assert_eq!(q.symbol, "BTCUSD");
        assert_eq!(q.price, 42000.5);
    }

    #[test]
    fn structured_pair_alias_and_string_price() {
        let q = ok(r#"{"pair":"ETHUSD","price":"1800.25","ts":123}"#);
        assert_eq!(q.symbol, "ETHUSD");
        assert_eq!(q.price, 1800.25);
    }

    #[test]
    fn structured_symbol_wins_over_pair() {
        let q = ok(r#"{"symbol":"A","pair":"B","price":1}"#);
        assert_eq!(q.symbol, "A");
    }

    #[test]
    fn colon_quote() {
        let q = ok("ETHUSD:1800.25");
        assert_eq!((q.symbol.as_str(), q.price), ("ETHUSD", 1800.25));

        let q = ok("ETHUSD : 1800.25");
        assert_eq!((q.symbol.as_str(), q.price), ("ETHUSD", 1800.25));
    }

    #[test]
    fn whitespace_quote_ignores_extra_fields() {
        let q = ok("SOLUSD 20.1 extra");
        assert_eq!((q.symbol.as_str(), q.price), ("SOLUSD", 20.1));

        let q = ok("SOLUSD\t20.1");
        assert_eq!(q.price, 20.1);
    }

    #[test]
    fn malformed_lines_never_decode() {
        assert!(matches!(decode("not-a-quote", "ex1"), Err(DecodeError::UnknownFormat(_))));
        assert_eq!(
            decode("BTCUSD:notaprice", "ex1"),
            Err(DecodeError::InvalidPrice { dialect: Dialect::Colon, raw: "notaprice".into() })
        );
    }

    #[test]
    fn colon_shape_with_bad_price_does_not_fall_through() {
        // One colon: owned by the colon dialect even though it has spaces.
        let err = decode("BTC 1:x", "ex1").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPrice { dialect: Dialect::Colon, .. }));
    }

    #[test]
    fn whitespace_bad_price_rejected() {
        let err = decode("SOLUSD abc", "ex1").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPrice { dialect: Dialect::Whitespace, .. }));
    }

    #[test]
    fn two_colons_is_not_colon_dialect() {
        assert!(matches!(parse_colon("a:b:c"), Attempt::NoMatch));
        assert!(matches!(decode("a:b:c", "ex1"), Err(DecodeError::UnknownFormat(_))));
    }

    #[test]
    fn structured_shape_errors_are_hard_rejects() {
        assert_eq!(decode(r#"{"price":1}"#, "ex1"), Err(DecodeError::MissingSymbol(Dialect::Json)));
        assert_eq!(decode(r#"{"symbol":"BTC"}"#, "ex1"), Err(DecodeError::MissingPrice(Dialect::Json)));
        assert_eq!(decode(r#"{"symbol":"BTC","price":true}"#, "ex1"), Err(DecodeError::MissingPrice(Dialect::Json)));
        assert!(matches!(
            decode(r#"{"symbol":"BTC","price":"abc"}"#, "ex1"),
            Err(DecodeError::InvalidPrice { dialect: Dialect::Json, .. })
        ));
    }

    #[test]
    fn non_object_json_falls_through() {
        assert!(matches!(parse_json("[1,2]"), Attempt::NoMatch));
        assert!(matches!(parse_json("42"), Attempt::NoMatch));
        assert!(matches!(decode("42", "ex1"), Err(DecodeError::UnknownFormat(_))));
    }

    #[test]
    fn negative_and_non_finite_prices_rejected() {
        assert!(matches!(decode("BTC:-1", "ex1"), Err(DecodeError::InvalidPrice { .. })));
        assert!(matches!(decode("BTC nan", "ex1"), Err(DecodeError::InvalidPrice { .. })));
        assert!(matches!(decode("BTC:inf", "ex1"), Err(DecodeError::InvalidPrice { .. })));
        assert!(matches!(decode(r#"{"symbol":"BTC","price":-5}"#, "ex1"), Err(DecodeError::InvalidPrice { .. })));
    }

    #[test]
    fn empty_symbol_rejected() {
        assert_eq!(decode(":100", "ex1"), Err(DecodeError::MissingSymbol(Dialect::Colon)));
        assert_eq!(decode(r#"{"symbol":"  ","price":1}"#, "ex1"), Err(DecodeError::MissingSymbol(Dialect::Json)));
    }

    #[test]
    fn unknown_format_echo_is_bounded() {
        let line = "x".repeat(500);
        match decode(&line, "ex1") {
            Err(DecodeError::UnknownFormat(echo)) => assert_eq!(echo.len(), MAX_ECHO_CHARS),
            other => panic!("expected UnknownFormat, got {other:?}"),
        }
    }
}
