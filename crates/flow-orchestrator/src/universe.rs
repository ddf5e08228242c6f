//! Default stock universe for scheduled collection runs.

/// Monitored tickers: index/sector ETFs plus liquid large- and mid-caps
/// with active option chains.
pub const DEFAULT_TICKERS: &[&str] = &[
    // Major indices ETFs
    "SPY", "QQQ", "IWM", "DIA", "TQQQ",
    // Sector ETFs
    "XLF", "XLK", "XLE", "XLU", "XLV", "XLP", "XLI", "XLB", "XLY", "XBI",
    // Technology
    "AAPL", "MSFT", "AMZN", "GOOGL", "GOOG", "META", "NVDA", "AMD", "TSM",
    "ADBE", "NOW", "PLTR", "MU", "ROKU", "SMCI", "ANET", "ARM", "AVGO",
    "INTC", "QCOM", "TXN", "ORCL", "CRM", "CSCO", "INTU",
    // Software/Cloud
    "DDOG", "SNOW", "CRWD", "PANW", "NET", "MDB", "TEAM", "ZS",
    // Finance
    "JPM", "BAC", "GS", "V", "MA", "MS", "SCHW", "PYPL", "HOOD", "SOFI",
    "COIN",
    // Energy & EV
    "TSLA", "RIVN", "NIO", "FSLR", "ENPH", "CVX", "COP", "SHEL",
    // Crypto related
    "MARA", "MSTR", "RIOT",
    // Healthcare & Biotech
    "MRNA", "NVAX", "JNJ", "UNH", "LLY", "MRK", "ABBV", "AMGN", "ISRG",
    // Retail & Consumer
    "COST", "WMT", "TGT", "HD", "LOW", "NKE", "LULU", "SBUX", "MCD", "CMG",
    "PG", "PEP", "GME",
    // Transportation & Travel
    "UAL", "DAL", "AAL", "CCL", "RCL", "ABNB", "DASH", "UBER",
    // Industrials
    "F", "GM", "CAT", "DE", "BA", "LMT", "RTX", "UNP",
    // Telecom & Media
    "VZ", "T", "TMUS", "NFLX", "SPOT", "DIS", "WBD", "EA", "TTWO", "RBLX",
    // Other
    "BRK-B", "DKNG", "SHOP", "BABA", "SE", "ETSY", "NEE", "LIN", "PLD",
    "AMC",
];

/// Tickers dropped from the default list: delisted, acquired, or without
/// usable option data.
pub const EXCLUDED_TICKERS: &[&str] = &[
    "PTRA", // delisted
    "BBBY", // bankrupt
    "ATVI", // acquired
    "WISH", // delisted
    "SDC",  // delisted
    "NCLH", // no options data
];

/// The default list with exclusions applied.
pub fn active_tickers() -> Vec<String> {
    DEFAULT_TICKERS
        .iter()
        .filter(|t| !EXCLUDED_TICKERS.contains(t))
        .map(|t| (*t).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_tickers_apply_exclusions() {
        let active = active_tickers();
        assert!(!active.is_empty());
        for excluded in EXCLUDED_TICKERS {
            assert!(!active.iter().any(|t| t == excluded));
        }
        assert!(active.iter().any(|t| t == "SPY"));
    }
}
