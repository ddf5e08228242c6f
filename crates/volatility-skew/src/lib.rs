use chrono::NaiveDate;
use options_core::{OptionSide, Snapshot, SurfaceRow};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Moneyness below which a put counts as out-of-the-money.
const OTM_PUT_MONEYNESS: f64 = 0.95;
/// Moneyness above which a call counts as out-of-the-money.
const OTM_CALL_MONEYNESS: f64 = 1.05;
/// Legs sampled per side, nearest the money first.
const LEGS_PER_SIDE: usize = 3;
/// A side needs strictly more rows than this for the group to qualify.
const MIN_ROWS_PER_SIDE: usize = 3;

/// Which tail carries the richer implied volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkewDirection {
    /// Puts richer than calls: downside protection is bid.
    Downside,
    /// Calls at or above puts.
    Upside,
}

impl SkewDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkewDirection::Downside => "Downside",
            SkewDirection::Upside => "Upside",
        }
    }
}

/// OTM put/call implied-volatility skew for one (symbol, expiration) group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkewRecord {
    pub symbol: String,
    pub expiration: NaiveDate,
    pub dte: i64,
    pub put_iv: f64,
    pub call_iv: f64,
    pub skew: f64,
    pub direction: SkewDirection,
}

pub struct SkewEngine;

impl SkewEngine {
    pub fn new() -> Self {
        Self
    }

    /// One record per (symbol, expiration) group with enough coverage.
    ///
    /// Thin groups (3 or fewer rows on either side, or no qualifying OTM
    /// selection) are skipped silently; that is a coverage gap, not an
    /// error. Output is sorted by (symbol, expiration).
    pub fn analyze(&self, snapshot: &Snapshot) -> Vec<SkewRecord> {
        let mut groups: BTreeMap<(&str, NaiveDate), Vec<&SurfaceRow>> = BTreeMap::new();
        for row in &snapshot.rows {
            groups
                .entry((row.symbol.as_str(), row.expiration))
                .or_default()
                .push(row);
        }

        let mut records = Vec::new();
        for ((symbol, expiration), rows) in groups {
            let calls: Vec<&SurfaceRow> = rows
                .iter()
                .copied()
                .filter(|r| r.side == OptionSide::Call)
                .collect();
            let puts: Vec<&SurfaceRow> = rows
                .iter()
                .copied()
                .filter(|r| r.side == OptionSide::Put)
                .collect();

            if calls.len() <= MIN_ROWS_PER_SIDE || puts.len() <= MIN_ROWS_PER_SIDE {
                continue;
            }

            let mut otm_puts: Vec<&SurfaceRow> = puts
                .iter()
                .copied()
                .filter(|r| r.moneyness < OTM_PUT_MONEYNESS && r.implied_volatility.is_finite())
                .collect();
            otm_puts.sort_by(|a, b| b.moneyness.total_cmp(&a.moneyness));
            otm_puts.truncate(LEGS_PER_SIDE);

            let mut otm_calls: Vec<&SurfaceRow> = calls
                .iter()
                .copied()
                .filter(|r| r.moneyness > OTM_CALL_MONEYNESS && r.implied_volatility.is_finite())
                .collect();
            otm_calls.sort_by(|a, b| a.moneyness.total_cmp(&b.moneyness));
            otm_calls.truncate(LEGS_PER_SIDE);

            if otm_puts.is_empty() || otm_calls.is_empty() {
                continue;
            }

            let put_ivs: Vec<f64> = otm_puts.iter().map(|r| r.implied_volatility).collect();
            let call_ivs: Vec<f64> = otm_calls.iter().map(|r| r.implied_volatility).collect();
            let put_iv = put_ivs.mean();
            let call_iv = call_ivs.mean();
            let skew = put_iv - call_iv;

            records.push(SkewRecord {
                symbol: symbol.to_string(),
                expiration,
                dte: rows[0].dte,
                put_iv,
                call_iv,
                skew,
                direction: if skew > 0.0 {
                    SkewDirection::Downside
                } else {
                    SkewDirection::Upside
                },
            });
        }
        records
    }
}
