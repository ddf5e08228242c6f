use chrono::NaiveDate;
use options_core::{strike_key, OptionSide, Snapshot, SurfaceRow};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};

/// Which pair of snapshots is being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonWindow {
    /// Previous evening against this morning.
    Overnight,
    /// Previous evening against this evening.
    Daily,
}

impl ComparisonWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonWindow::Overnight => "overnight",
            ComparisonWindow::Daily => "daily",
        }
    }
}

/// Weighting basis actually applied, carried in the result so summary rows
/// are traceable to the weighting used. Never a silent flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightingBasis {
    /// Current-snapshot traded volume (its sum was strictly positive).
    CurrentVolume,
    /// Fallback: reference-snapshot open interest.
    ReferenceOpenInterest,
}

impl WeightingBasis {
    pub fn is_volume_weighted(&self) -> bool {
        matches!(self, WeightingBasis::CurrentVolume)
    }
}

/// Directional label. Strictly bipolar at this layer; any neutral band is a
/// caller-side display concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Bullish,
    Bearish,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "BULLISH",
            Sentiment::Bearish => "BEARISH",
        }
    }
}

/// Per-contract delta between the two snapshots.
///
/// Percentage changes against a zero reference are NaN, never a panic;
/// downstream aggregation excludes non-finite values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDelta {
    pub symbol: String,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub side: OptionSide,
    pub iv_reference: f64,
    pub iv_current: f64,
    pub iv_change: f64,
    pub iv_change_pct: f64,
    pub price_reference: f64,
    pub price_current: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    /// Signed by side: rising call prices are bullish, rising put prices
    /// bearish.
    pub sentiment_score: f64,
    pub basis: f64,
    pub weighted_score: f64,
}

/// Aggregated sentiment for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSentiment {
    pub symbol: String,
    pub weighted_score_sum: f64,
    pub mean_sentiment_score: f64,
    pub mean_iv_change: f64,
    pub mean_price_change_pct: f64,
    pub basis_sum: f64,
    /// `None` when the instrument's basis sum is zero; such instruments are
    /// ranked last and carry no directional label.
    pub normalized_score: Option<f64>,
    pub sentiment: Option<Sentiment>,
    pub contracts: usize,
}

/// Full result of one snapshot comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentDelta {
    pub window: ComparisonWindow,
    pub weighting: WeightingBasis,
    pub contracts: Vec<ContractDelta>,
    /// Ranked most bullish first; undefined scores last.
    pub summary: Vec<TickerSentiment>,
}

pub struct SentimentDeltaEngine;

impl SentimentDeltaEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compare two same-shape snapshots of the same instrument universe.
    ///
    /// Contracts are inner-joined on (symbol, strike, expiration, side);
    /// anything that rolled off or newly listed between the snapshots is
    /// dropped rather than half-inferred.
    pub fn analyze(
        &self,
        window: ComparisonWindow,
        reference: &Snapshot,
        current: &Snapshot,
    ) -> SentimentDelta {
        let current_index: HashMap<(&str, i64, NaiveDate, OptionSide), &SurfaceRow> = current
            .rows
            .iter()
            .map(|r| ((r.symbol.as_str(), strike_key(r.strike), r.expiration, r.side), r))
            .collect();

        let matched: Vec<(&SurfaceRow, &SurfaceRow)> = reference
            .rows
            .iter()
            .filter_map(|r| {
                current_index
                    .get(&(r.symbol.as_str(), strike_key(r.strike), r.expiration, r.side))
                    .map(|c| (r, *c))
            })
            .collect();

        let volume_sum: f64 = matched
            .iter()
            .map(|(_, cur)| finite_or_zero(cur.volume))
            .sum();
        let weighting = if volume_sum > 0.0 {
            WeightingBasis::CurrentVolume
        } else {
            WeightingBasis::ReferenceOpenInterest
        };

        let contracts: Vec<ContractDelta> = matched
            .iter()
            .map(|(reference, current)| {
                let iv_change = current.implied_volatility - reference.implied_volatility;
                let iv_change_pct = pct_change(iv_change, reference.implied_volatility);
                let price_change = current.last_price - reference.last_price;
                let price_change_pct = pct_change(price_change, reference.last_price);

                let sentiment_score = match reference.side {
                    OptionSide::Call => price_change_pct,
                    OptionSide::Put => -price_change_pct,
                };
                let basis = match weighting {
                    WeightingBasis::CurrentVolume => finite_or_zero(current.volume),
                    WeightingBasis::ReferenceOpenInterest => finite_or_zero(reference.open_interest),
                };

                ContractDelta {
                    symbol: reference.symbol.clone(),
                    strike: reference.strike,
                    expiration: reference.expiration,
                    side: reference.side,
                    iv_reference: reference.implied_volatility,
                    iv_current: current.implied_volatility,
                    iv_change,
                    iv_change_pct,
                    price_reference: reference.last_price,
                    price_current: current.last_price,
                    price_change,
                    price_change_pct,
                    sentiment_score,
                    basis,
                    weighted_score: sentiment_score * basis,
                }
            })
            .collect();

        let summary = summarize(&contracts);

        SentimentDelta {
            window,
            weighting,
            contracts,
            summary,
        }
    }
}

/// Aggregate contract deltas per instrument and rank most bullish first.
fn summarize(contracts: &[ContractDelta]) -> Vec<TickerSentiment> {
    let mut groups: BTreeMap<&str, Vec<&ContractDelta>> = BTreeMap::new();
    for c in contracts {
        groups.entry(c.symbol.as_str()).or_default().push(c);
    }

    let mut summary: Vec<TickerSentiment> = groups
        .into_iter()
        .map(|(symbol, rows)| {
            // A contract whose reference price or IV was zero carries NaN
            // percentages; it stays in the merged table but is left out of
            // the instrument aggregates so one dead quote cannot poison the
            // score.
            let scored: Vec<&&ContractDelta> = rows
                .iter()
                .filter(|c| c.sentiment_score.is_finite())
                .collect();

            let weighted_score_sum: f64 = scored.iter().map(|c| c.weighted_score).sum();
            let basis_sum: f64 = scored.iter().map(|c| c.basis).sum();
            let mean_sentiment_score =
                mean_of(scored.iter().map(|c| c.sentiment_score));
            let mean_iv_change =
                mean_of(rows.iter().map(|c| c.iv_change).filter(|v| v.is_finite()));
            let mean_price_change_pct =
                mean_of(scored.iter().map(|c| c.price_change_pct));

            let normalized_score = if basis_sum > 0.0 {
                Some(weighted_score_sum / basis_sum)
            } else {
                None
            };
            let sentiment = normalized_score.map(|s| {
                if s > 0.0 {
                    Sentiment::Bullish
                } else {
                    Sentiment::Bearish
                }
            });

            TickerSentiment {
                symbol: symbol.to_string(),
                weighted_score_sum,
                mean_sentiment_score,
                mean_iv_change,
                mean_price_change_pct,
                basis_sum,
                normalized_score,
                sentiment,
                contracts: rows.len(),
            }
        })
        .collect();

    summary.sort_by(|a, b| match (a.normalized_score, b.normalized_score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.symbol.cmp(&b.symbol),
    });
    summary
}

fn pct_change(change: f64, reference: f64) -> f64 {
    if reference == 0.0 || !reference.is_finite() {
        f64::NAN
    } else {
        change / reference * 100.0
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        0.0
    } else {
        collected.mean()
    }
}
