use sentiment_delta::{Sentiment, TickerSentiment};
use std::collections::HashMap;
use std::fmt::Write as _;

const TOP_MOVERS: usize = 5;

/// Injected read-only instrument -> sector mapping used only by display
/// layers; the engines never see it.
pub struct SectorMap {
    table: HashMap<String, String>,
    fallback: String,
}

impl SectorMap {
    pub fn with_table(table: HashMap<String, String>) -> Self {
        Self {
            table,
            fallback: "Other".to_string(),
        }
    }

    /// Default table covering the stock universe the collector ships with.
    pub fn builtin() -> Self {
        let mut table = HashMap::new();
        for (symbol, sector) in BUILTIN_SECTORS {
            table.insert((*symbol).to_string(), (*sector).to_string());
        }
        Self::with_table(table)
    }

    pub fn sector(&self, symbol: &str) -> &str {
        self.table
            .get(symbol)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

impl Default for SectorMap {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Basis-weighted market-wide sentiment over instruments with a defined
/// score. `None` when nothing is rankable.
pub fn market_score(summary: &[TickerSentiment]) -> Option<f64> {
    let mut weighted = 0.0;
    let mut basis = 0.0;
    for t in summary {
        if let Some(score) = t.normalized_score {
            weighted += score * t.basis_sum;
            basis += t.basis_sum;
        }
    }
    if basis > 0.0 {
        Some(weighted / basis)
    } else {
        None
    }
}

/// Render the sentiment dashboard as plain text.
///
/// Expects the summary ranked most bullish first, as the sentiment engine
/// emits it. Instruments without a defined score are left out of every
/// section.
pub fn render_dashboard(title: &str, summary: &[TickerSentiment], sectors: &SectorMap) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out);

    match market_score(summary) {
        Some(score) => {
            let direction = if score > 0.0 { "BULLISH" } else { "BEARISH" };
            let _ = writeln!(out, "Overall Market: {direction} ({score:.2})");
        }
        None => {
            let _ = writeln!(out, "Overall Market: n/a (no weighted coverage)");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Top Bullish:");
    for t in summary
        .iter()
        .filter(|t| t.sentiment == Some(Sentiment::Bullish))
        .take(TOP_MOVERS)
    {
        let _ = writeln!(out, "{}", mover_line(t));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Top Bearish:");
    // The ranking is descending, so the most bearish names sit at the tail.
    for t in summary
        .iter()
        .filter(|t| t.sentiment == Some(Sentiment::Bearish))
        .rev()
        .take(TOP_MOVERS)
    {
        let _ = writeln!(out, "{}", mover_line(t));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Sector Sentiment:");
    for (sector, score) in sector_scores(summary, sectors) {
        let direction = if score > 0.0 { "BULLISH" } else { "BEARISH" };
        let _ = writeln!(out, "{sector}: {direction} ({score:.2})");
    }

    out
}

fn mover_line(t: &TickerSentiment) -> String {
    let score = t.normalized_score.unwrap_or(0.0);
    format!(
        "{}: {:.2} (IV chg: {:.1}%)",
        t.symbol,
        score,
        t.mean_iv_change * 100.0
    )
}

/// Mean normalized score per sector, most bullish sector first.
fn sector_scores(summary: &[TickerSentiment], sectors: &SectorMap) -> Vec<(String, f64)> {
    let mut grouped: HashMap<&str, (f64, usize)> = HashMap::new();
    for t in summary {
        if let Some(score) = t.normalized_score {
            let entry = grouped.entry(sectors.sector(&t.symbol)).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }
    let mut scores: Vec<(String, f64)> = grouped
        .into_iter()
        .map(|(sector, (sum, n))| (sector.to_string(), sum / n as f64))
        .collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores
}

const BUILTIN_SECTORS: &[(&str, &str)] = &[
    // Indices
    ("SPY", "Index"),
    ("QQQ", "Index"),
    ("IWM", "Index"),
    ("DIA", "Index"),
    ("TQQQ", "Leveraged Index"),
    // Sector ETFs
    ("XLF", "Financials"),
    ("XLK", "Technology"),
    ("XLE", "Energy"),
    ("XLU", "Utilities"),
    ("XLV", "Healthcare"),
    ("XLP", "Consumer Staples"),
    ("XLI", "Industrials"),
    ("XLB", "Materials"),
    ("XLY", "Consumer Discretionary"),
    ("XBI", "Biotech"),
    // Technology
    ("AAPL", "Technology"),
    ("MSFT", "Technology"),
    ("GOOGL", "Technology"),
    ("GOOG", "Technology"),
    ("META", "Technology"),
    ("CSCO", "Technology"),
    ("ROKU", "Technology"),
    ("SMCI", "Technology"),
    ("ANET", "Technology"),
    // Semiconductors
    ("NVDA", "Semiconductor"),
    ("AMD", "Semiconductor"),
    ("TSM", "Semiconductor"),
    ("MU", "Semiconductor"),
    ("AVGO", "Semiconductor"),
    ("INTC", "Semiconductor"),
    ("QCOM", "Semiconductor"),
    ("TXN", "Semiconductor"),
    ("ARM", "Semiconductor"),
    ("ON", "Semiconductor"),
    // Software
    ("ADBE", "Software"),
    ("NOW", "Software"),
    ("PLTR", "Software"),
    ("ORCL", "Software"),
    ("CRM", "Software"),
    ("INTU", "Software"),
    ("DDOG", "Software"),
    ("SNOW", "Software"),
    ("CRWD", "Software"),
    ("PANW", "Software"),
    ("NET", "Software"),
    ("MDB", "Software"),
    ("TEAM", "Software"),
    // Finance
    ("JPM", "Financials"),
    ("BAC", "Financials"),
    ("GS", "Financials"),
    ("V", "Financials"),
    ("MA", "Financials"),
    ("MS", "Financials"),
    ("SCHW", "Financials"),
    ("PYPL", "Financials"),
    ("HOOD", "Financials"),
    ("SOFI", "Financials"),
    ("COIN", "Crypto Financials"),
    // Energy & EV
    ("TSLA", "EV"),
    ("RIVN", "EV"),
    ("NIO", "EV"),
    ("XPEV", "EV"),
    ("FSLR", "Clean Energy"),
    ("ENPH", "Clean Energy"),
    ("CVX", "Energy"),
    ("COP", "Energy"),
    ("SHEL", "Energy"),
    // Crypto
    ("MARA", "Crypto"),
    ("MSTR", "Crypto"),
    ("RIOT", "Crypto"),
    // Healthcare & Biotech
    ("MRNA", "Biotech"),
    ("NVAX", "Biotech"),
    ("AMGN", "Biotech"),
    ("JNJ", "Healthcare"),
    ("UNH", "Healthcare"),
    ("LLY", "Healthcare"),
    ("MRK", "Healthcare"),
    ("ABBV", "Healthcare"),
    ("ISRG", "Healthcare"),
    // Retail & Consumer
    ("COST", "Retail"),
    ("WMT", "Retail"),
    ("TGT", "Retail"),
    ("HD", "Retail"),
    ("LOW", "Retail"),
    ("NKE", "Retail"),
    ("LULU", "Retail"),
    ("GME", "Retail"),
    ("SBUX", "Restaurant"),
    ("MCD", "Restaurant"),
    ("CMG", "Restaurant"),
    ("PG", "Consumer Goods"),
    ("PEP", "Consumer Goods"),
    // Transportation & Travel
    ("UAL", "Airlines"),
    ("DAL", "Airlines"),
    ("AAL", "Airlines"),
    ("CCL", "Cruise Lines"),
    ("RCL", "Cruise Lines"),
    ("ABNB", "Travel & Leisure"),
    ("DASH", "Delivery"),
    ("UBER", "Rideshare"),
    // Industrials
    ("F", "Auto Manufacturing"),
    ("GM", "Auto Manufacturing"),
    ("CAT", "Heavy Equipment"),
    ("DE", "Heavy Equipment"),
    ("BA", "Aerospace"),
    ("LMT", "Aerospace"),
    ("RTX", "Aerospace"),
    ("UNP", "Rail"),
    // Telecom & Media
    ("VZ", "Telecom"),
    ("T", "Telecom"),
    ("TMUS", "Telecom"),
    ("NFLX", "Streaming"),
    ("SPOT", "Streaming"),
    ("DIS", "Entertainment"),
    ("WBD", "Entertainment"),
    ("EA", "Gaming"),
    ("TTWO", "Gaming"),
    ("RBLX", "Gaming"),
    // Other
    ("BRK-B", "Conglomerate"),
    ("DKNG", "Sports Betting"),
    ("SHOP", "E-Commerce"),
    ("BABA", "E-Commerce"),
    ("SE", "E-Commerce"),
    ("ETSY", "E-Commerce"),
    ("NEE", "Utilities"),
    ("LIN", "Materials"),
    ("PLD", "REITs"),
    ("AMC", "Entertainment"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, score: Option<f64>, basis: f64) -> TickerSentiment {
        TickerSentiment {
            symbol: symbol.to_string(),
            weighted_score_sum: score.unwrap_or(0.0) * basis,
            mean_sentiment_score: score.unwrap_or(0.0),
            mean_iv_change: 0.01,
            mean_price_change_pct: score.unwrap_or(0.0),
            basis_sum: basis,
            normalized_score: score,
            sentiment: score.map(|s| {
                if s > 0.0 {
                    Sentiment::Bullish
                } else {
                    Sentiment::Bearish
                }
            }),
            contracts: 1,
        }
    }

    #[test]
    fn test_sector_fallback() {
        let sectors = SectorMap::builtin();
        assert_eq!(sectors.sector("NVDA"), "Semiconductor");
        assert_eq!(sectors.sector("ZZZZ"), "Other");
    }

    #[test]
    fn test_market_score_is_basis_weighted() {
        let summary = vec![
            ticker("A", Some(2.0), 100.0),
            ticker("B", Some(-1.0), 300.0),
            ticker("DEAD", None, 0.0),
        ];
        // (2*100 - 1*300) / 400 = -0.25
        assert!((market_score(&summary).unwrap() + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_market_score_none_without_coverage() {
        assert!(market_score(&[ticker("DEAD", None, 0.0)]).is_none());
    }

    #[test]
    fn test_render_dashboard_sections() {
        let summary = vec![
            ticker("AAPL", Some(1.5), 100.0),
            ticker("NVDA", Some(0.5), 100.0),
            ticker("XOM", Some(-2.0), 100.0),
        ];
        let text = render_dashboard("DAILY SENTIMENT DASHBOARD", &summary, &SectorMap::builtin());

        assert!(text.starts_with("DAILY SENTIMENT DASHBOARD\n"));
        // Scores sum to zero across equal bases
        assert!(text.contains("Overall Market: BEARISH (0.00)"));
        assert!(text.contains("Top Bullish:\nAAPL: 1.50"));
        assert!(text.contains("Top Bearish:\nXOM: -2.00"));
        assert!(text.contains("Sector Sentiment:"));
        assert!(text.contains("Technology: BULLISH (1.50)"));
        // Unmapped symbol lands in the fallback sector
        assert!(text.contains("Other: BEARISH (-2.00)"));
    }

    #[test]
    fn test_bearish_section_most_bearish_first() {
        let summary = vec![
            ticker("MILD", Some(-0.1), 100.0),
            ticker("WORST", Some(-5.0), 100.0),
        ];
        let text = render_dashboard("X", &summary, &SectorMap::builtin());
        let worst = text.find("WORST").unwrap();
        let mild = text.find("MILD").unwrap();
        assert!(worst < mild);
    }
}
