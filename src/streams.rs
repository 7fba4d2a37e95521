//! Stream-name formatting for the market data endpoints.
//!
//! These are the logical stream identifiers that go into a [`Target`];
//! symbols are lowercased the way the server expects them.
//!
//! [`Target`]: crate::target::Target

/// Aggregated market trades, `<symbol>@aggTrade`.
#[must_use]
pub fn agg_trade(symbol: &str) -> String {
    format!("{}@aggTrade", symbol.to_lowercase())
}

/// Mark price updates, `<symbol>@markPrice` or `<symbol>@markPrice@<speed>s`.
///
/// The default 3-second cadence omits the speed suffix.
#[must_use]
pub fn mark_price(symbol: &str, speed_secs: u8) -> String {
    const DEFAULT_SPEED_SECS: u8 = 3;
    if speed_secs == DEFAULT_SPEED_SECS {
        format!("{}@markPrice", symbol.to_lowercase())
    } else {
        format!("{}@markPrice@{speed_secs}s", symbol.to_lowercase())
    }
}

/// Candlestick updates, `<symbol>@kline_<interval>`.
#[must_use]
pub fn kline(symbol: &str, interval: &str) -> String {
    format!("{}@kline_{interval}", symbol.to_lowercase())
}

/// Candlestick updates for a contract pair,
/// `<pair>_<contractType>@continuousKline_<interval>`.
///
/// The contract type (for example `perpetual`) is passed through as given.
#[must_use]
pub fn continuous_kline(pair: &str, contract_type: &str, interval: &str) -> String {
    format!(
        "{}_{contract_type}@continuousKline_{interval}",
        pair.to_lowercase()
    )
}

/// Abbreviated 24h ticker for one symbol, `<symbol>@miniTicker`.
#[must_use]
pub fn mini_ticker(symbol: &str) -> String {
    format!("{}@miniTicker", symbol.to_lowercase())
}

/// Abbreviated 24h tickers across all symbols, `!miniTicker@arr`.
#[must_use]
pub fn all_mini_tickers() -> String {
    "!miniTicker@arr".to_owned()
}

/// Full 24h ticker for one symbol, `<symbol>@ticker`.
#[must_use]
pub fn symbol_ticker(symbol: &str) -> String {
    format!("{}@ticker", symbol.to_lowercase())
}

/// Full 24h tickers across all symbols, `!ticker@arr`.
#[must_use]
pub fn all_tickers() -> String {
    "!ticker@arr".to_owned()
}

/// Best bid/ask updates for one symbol, `<symbol>@bookTicker`.
#[must_use]
pub fn book_ticker(symbol: &str) -> String {
    format!("{}@bookTicker", symbol.to_lowercase())
}

/// Best bid/ask updates across all symbols, `!bookTicker`.
#[must_use]
pub fn all_book_tickers() -> String {
    "!bookTicker".to_owned()
}

/// Liquidation orders for one symbol, `<symbol>@forceOrder`.
#[must_use]
pub fn force_order(symbol: &str) -> String {
    format!("{}@forceOrder", symbol.to_lowercase())
}

/// Liquidation orders across all symbols, `!forceOrder@arr`.
#[must_use]
pub fn all_force_orders() -> String {
    "!forceOrder@arr".to_owned()
}

const DEFAULT_DEPTH_SPEED_MS: u16 = 250;

/// Top-of-book snapshot, `<symbol>@depth<levels>` or
/// `<symbol>@depth<levels>@<speed>ms`.
///
/// The default 250ms cadence omits the speed suffix.
#[must_use]
pub fn partial_depth(symbol: &str, levels: u8, speed_ms: u16) -> String {
    if speed_ms == DEFAULT_DEPTH_SPEED_MS {
        format!("{}@depth{levels}", symbol.to_lowercase())
    } else {
        format!("{}@depth{levels}@{speed_ms}ms", symbol.to_lowercase())
    }
}

/// Order book diff updates, `<symbol>@depth` or `<symbol>@depth@<speed>ms`.
///
/// The default 250ms cadence omits the speed suffix.
#[must_use]
pub fn diff_depth(symbol: &str, speed_ms: u16) -> String {
    if speed_ms == DEFAULT_DEPTH_SPEED_MS {
        format!("{}@depth", symbol.to_lowercase())
    } else {
        format!("{}@depth@{speed_ms}ms", symbol.to_lowercase())
    }
}

/// User data stream. The stream name is the listen key itself.
#[must_use]
pub fn user_stream(listen_key: &str) -> String {
    listen_key.to_owned()
}

/// Join stream names for a combined-stream endpoint.
#[must_use]
pub fn combined(stream_names: &[String]) -> String {
    stream_names.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_lowercased() {
        assert_eq!(agg_trade("BTCUSDT"), "btcusdt@aggTrade");
        assert_eq!(kline("EthUsdt", "1m"), "ethusdt@kline_1m");
        assert_eq!(force_order("BTCUSDT"), "btcusdt@forceOrder");
        assert_eq!(mini_ticker("BTCUSDT"), "btcusdt@miniTicker");
        assert_eq!(symbol_ticker("BTCUSDT"), "btcusdt@ticker");
        assert_eq!(book_ticker("BTCUSDT"), "btcusdt@bookTicker");
    }

    #[test]
    fn mark_price_default_speed_has_no_suffix() {
        assert_eq!(mark_price("BTCUSDT", 3), "btcusdt@markPrice");
        assert_eq!(mark_price("BTCUSDT", 1), "btcusdt@markPrice@1s");
    }

    #[test]
    fn continuous_kline_lowercases_the_pair_only() {
        assert_eq!(
            continuous_kline("BTCUSDT", "perpetual", "1m"),
            "btcusdt_perpetual@continuousKline_1m"
        );
    }

    #[test]
    fn all_market_streams() {
        assert_eq!(all_mini_tickers(), "!miniTicker@arr");
        assert_eq!(all_tickers(), "!ticker@arr");
        assert_eq!(all_book_tickers(), "!bookTicker");
        assert_eq!(all_force_orders(), "!forceOrder@arr");
    }

    #[test]
    fn depth_streams_omit_the_default_speed() {
        assert_eq!(partial_depth("BTCUSDT", 10, 250), "btcusdt@depth10");
        assert_eq!(partial_depth("BTCUSDT", 5, 100), "btcusdt@depth5@100ms");
        assert_eq!(diff_depth("BTCUSDT", 250), "btcusdt@depth");
        assert_eq!(diff_depth("BTCUSDT", 500), "btcusdt@depth@500ms");
    }

    #[test]
    fn user_stream_is_the_listen_key() {
        assert_eq!(user_stream("abc123listenkey"), "abc123listenkey");
    }

    #[test]
    fn combined_joins_with_slash() {
        let names = vec!["a@aggTrade".to_owned(), "b@depth".to_owned()];
        assert_eq!(combined(&names), "a@aggTrade/b@depth");
    }
}
