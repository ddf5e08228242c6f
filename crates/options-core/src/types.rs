use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Call => "call",
            OptionSide::Put => "put",
        }
    }
}

/// One observed option contract leg.
///
/// Open interest and volume are kept as `f64` because upstream feeds report
/// them as nullable floats; NaN is tolerated and treated as zero by the
/// engines. An implied volatility of 0 is the feed's "untradeable" sentinel
/// and contributes zero gamma, it is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub implied_volatility: f64,
    pub open_interest: f64,
    pub volume: f64,
    pub last_price: f64,
    pub in_the_money: bool,
}

impl OptionQuote {
    /// Rejects rows that violate the input contract (non-finite or
    /// non-positive strike). A rejected row is skipped, never fatal.
    pub fn is_well_formed(&self) -> bool {
        self.strike.is_finite() && self.strike > 0.0
    }
}

/// Calls and puts for a single expiration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirySlice {
    pub expiration: NaiveDate,
    pub calls: Vec<OptionQuote>,
    pub puts: Vec<OptionQuote>,
}

/// Full option chain for one instrument at one capture instant.
///
/// Constructed fresh per fetch cycle and immutable once captured; two chains
/// for the same symbol at different times are the unit the sentiment engine
/// compares (after flattening).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub symbol: String,
    pub spot: f64,
    pub prev_close: Option<f64>,
    pub captured_at: DateTime<Utc>,
    pub slices: Vec<ExpirySlice>,
}

impl OptionChain {
    /// Flatten the chain into surface rows: one row per contract per
    /// expiration, with day count and moneyness precomputed.
    ///
    /// Expirations before `trading_date` and malformed quotes are skipped.
    pub fn surface_rows(&self, trading_date: NaiveDate) -> Vec<SurfaceRow> {
        let mut rows = Vec::new();
        for slice in &self.slices {
            let dte = (slice.expiration - trading_date).num_days();
            if dte < 0 {
                continue;
            }
            for (side, quotes) in [
                (OptionSide::Call, &slice.calls),
                (OptionSide::Put, &slice.puts),
            ] {
                for q in quotes.iter().filter(|q| q.is_well_formed()) {
                    rows.push(SurfaceRow {
                        symbol: self.symbol.clone(),
                        strike: q.strike,
                        expiration: slice.expiration,
                        side,
                        implied_volatility: q.implied_volatility,
                        open_interest: q.open_interest,
                        volume: q.volume,
                        last_price: q.last_price,
                        in_the_money: q.in_the_money,
                        dte,
                        moneyness: q.strike / self.spot,
                        underlying_price: self.spot,
                        prev_close: self.prev_close,
                    });
                }
            }
        }
        rows
    }
}

/// Flattened cross-instrument contract row, the unit the skew and sentiment
/// engines consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceRow {
    pub symbol: String,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub side: OptionSide,
    pub implied_volatility: f64,
    pub open_interest: f64,
    pub volume: f64,
    pub last_price: f64,
    pub in_the_money: bool,
    pub dte: i64,
    pub moneyness: f64,
    pub underlying_price: f64,
    pub prev_close: Option<f64>,
}

/// Collection session within the trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Morning,
    Evening,
}

impl Session {
    /// Classify by local wall-clock hour: evening runs happen after the close
    /// (20:00 onward) or in the overnight carry-over window before 04:00.
    pub fn from_hour(hour: u32) -> Self {
        if hour >= 20 || hour < 4 {
            Session::Evening
        } else {
            Session::Morning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Morning => "morning",
            Session::Evening => "evening",
        }
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One time-stamped cross-instrument snapshot of the volatility surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub trading_date: NaiveDate,
    pub session: Session,
    pub rows: Vec<SurfaceRow>,
}

impl Snapshot {
    pub fn new(trading_date: NaiveDate, session: Session) -> Self {
        Self {
            trading_date,
            session,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Integer key for joining on float strikes (tenth-of-a-cent resolution).
/// Listed strikes are exact decimals, so round-tripping is lossless at this
/// granularity.
pub fn strike_key(strike: f64) -> i64 {
    (strike * 1000.0).round() as i64
}
