use chrono::NaiveDate;
use options_core::{strike_key, years_to_expiry, OptionChain, OptionQuote};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Grid resolution of the exposure scan.
const GRID_POINTS: usize = 30;
/// Option contract multiplier (shares per contract).
const CONTRACT_MULTIPLIER: f64 = 100.0;
/// Net exposure is reported in billions of dollars.
const BILLION: f64 = 1e9;

const SQRT_2PI: f64 = 2.5066282746310007;

/// Net dollar gamma exposure at one spot level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GammaLevel {
    pub price: f64,
    pub net_exposure: f64,
}

/// Gamma exposure profile for one instrument across its whole chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureProfile {
    pub symbol: String,
    pub levels: Vec<GammaLevel>,
    /// Spot price of the first (lowest-price) zero crossing, if any.
    pub flip: Option<f64>,
    /// Up to two call strikes with the highest summed open interest.
    pub call_strikes: Vec<f64>,
    /// Up to two put strikes with the highest summed open interest.
    pub put_strikes: Vec<f64>,
}

impl ExposureProfile {
    /// Compact delimited record consumed by the charting overlay:
    /// `"<symbol>:<c1>,<c2>,<p1>,<p2>,<flip>"` with integer-rounded strikes.
    /// An undefined flip renders as `nan`.
    pub fn tradingview_record(&self) -> String {
        let join = |strikes: &[f64]| {
            strikes
                .iter()
                .map(|s| format!("{}", s.round() as i64))
                .collect::<Vec<_>>()
                .join(",")
        };
        let flip = match self.flip {
            Some(f) => format!("{f:.0}"),
            None => "nan".to_string(),
        };
        format!(
            "{}:{},{},{}",
            self.symbol,
            join(&self.call_strikes),
            join(&self.put_strikes),
            flip
        )
    }
}

/// Join per-instrument records into the cross-instrument feed line.
pub fn join_records(records: &[String]) -> String {
    records.join(";")
}

/// Call and put legs matched on (expiration, strike).
struct MatchedStrike {
    strike: f64,
    years: f64,
    call_iv: f64,
    call_oi: f64,
    put_iv: f64,
    put_oi: f64,
}

pub struct GammaExposureEngine;

impl GammaExposureEngine {
    pub fn new() -> Self {
        Self
    }

    /// Exposure profile over the standard liquidity band `[0.5*spot, 2.0*spot]`.
    ///
    /// Returns `None` when the chain has no matched coverage inside the band;
    /// that is a coverage gap for the caller to count, not an error.
    pub fn profile(&self, chain: &OptionChain, valuation_date: NaiveDate) -> Option<ExposureProfile> {
        self.profile_in_band(chain, 0.5 * chain.spot, 2.0 * chain.spot, valuation_date)
    }

    /// Exposure profile over an explicit strike band.
    pub fn profile_in_band(
        &self,
        chain: &OptionChain,
        from_strike: f64,
        to_strike: f64,
        valuation_date: NaiveDate,
    ) -> Option<ExposureProfile> {
        let in_band = |q: &&OptionQuote| {
            q.is_well_formed() && q.strike >= from_strike && q.strike <= to_strike
        };

        let mut n_calls = 0;
        let mut n_puts = 0;
        let mut matched: Vec<MatchedStrike> = Vec::new();

        for slice in &chain.slices {
            let years = years_to_expiry(valuation_date, slice.expiration);
            let calls: Vec<&OptionQuote> = slice.calls.iter().filter(in_band).collect();
            let puts: Vec<&OptionQuote> = slice.puts.iter().filter(in_band).collect();
            n_calls += calls.len();
            n_puts += puts.len();

            let put_index: HashMap<i64, &OptionQuote> =
                puts.iter().map(|q| (strike_key(q.strike), *q)).collect();

            // Inner join: a strike quoted on only one side carries no
            // exposure row. Interpreting open interest symmetrically needs
            // both legs.
            for call in &calls {
                if let Some(put) = put_index.get(&strike_key(call.strike)) {
                    matched.push(MatchedStrike {
                        strike: call.strike,
                        years,
                        call_iv: call.implied_volatility,
                        call_oi: call.open_interest,
                        put_iv: put.implied_volatility,
                        put_oi: put.open_interest,
                    });
                }
            }
        }

        if n_calls == 0 || n_puts == 0 || matched.is_empty() {
            return None;
        }

        let step = (to_strike - from_strike) / (GRID_POINTS - 1) as f64;
        let prices: Vec<f64> = (0..GRID_POINTS)
            .map(|i| from_strike + step * i as f64)
            .collect();

        // Levels outer, rows inner: one cheap closed-form evaluation per cell.
        let values: Vec<f64> = prices
            .par_iter()
            .map(|&spot| {
                let net: f64 = matched
                    .iter()
                    .map(|m| {
                        dollar_gamma(spot, m.strike, m.call_iv, m.years, m.call_oi)
                            - dollar_gamma(spot, m.strike, m.put_iv, m.years, m.put_oi)
                    })
                    .sum();
                net / BILLION
            })
            .collect();

        let flip = first_zero_crossing(&prices, &values);
        let call_strikes = top_open_interest_strikes(&matched, |m| m.call_oi);
        let put_strikes = top_open_interest_strikes(&matched, |m| m.put_oi);

        Some(ExposureProfile {
            symbol: chain.symbol.clone(),
            levels: prices
                .into_iter()
                .zip(values)
                .map(|(price, net_exposure)| GammaLevel { price, net_exposure })
                .collect(),
            flip,
            call_strikes,
            put_strikes,
        })
    }
}

/// Black-Scholes dollar gamma for one leg at spot level `spot`.
///
/// Zero time, zero volatility, and NaN inputs all collapse to zero exposure;
/// one dead quote must not invalidate the instrument's profile. Risk-free
/// rate and dividend yield are fixed at zero (no carry model).
fn dollar_gamma(spot: f64, strike: f64, vol: f64, years: f64, open_interest: f64) -> f64 {
    if years <= 0.0 || vol <= 0.0 || !vol.is_finite() || !open_interest.is_finite() {
        return 0.0;
    }
    let sqrt_t = years.sqrt();
    let d1 = ((spot / strike).ln() + 0.5 * vol * vol * years) / (vol * sqrt_t);
    let gamma = normal_pdf(d1) / (spot * vol * sqrt_t);
    open_interest * CONTRACT_MULTIPLIER * spot * spot * 0.01 * gamma
}

fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

/// First sign change scanning low to high, linearly interpolated.
///
/// Later crossings are deliberately ignored. A flat pair (`y0 == y1`) has no
/// unique root and is skipped.
fn first_zero_crossing(prices: &[f64], values: &[f64]) -> Option<f64> {
    for i in 0..prices.len().saturating_sub(1) {
        let (y0, y1) = (values[i], values[i + 1]);
        if y0 * y1 <= 0.0 && y0 != y1 {
            let (x0, x1) = (prices[i], prices[i + 1]);
            return Some(x0 - y0 * (x1 - x0) / (y1 - y0));
        }
    }
    None
}

/// Two strikes with the highest summed open interest on one side.
///
/// Grouping is ascending by strike and the ranking sort is stable, so ties
/// resolve to the lower strike.
fn top_open_interest_strikes(matched: &[MatchedStrike], oi: impl Fn(&MatchedStrike) -> f64) -> Vec<f64> {
    let mut by_strike: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for m in matched {
        let entry = by_strike.entry(strike_key(m.strike)).or_insert((m.strike, 0.0));
        let value = oi(m);
        if value.is_finite() {
            entry.1 += value;
        }
    }
    let mut ranked: Vec<(f64, f64)> = by_strike.into_values().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(2).map(|(strike, _)| strike).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use options_core::ExpirySlice;

    fn quote(strike: f64, iv: f64, oi: f64) -> OptionQuote {
        OptionQuote {
            strike,
            implied_volatility: iv,
            open_interest: oi,
            volume: 0.0,
            last_price: 1.0,
            in_the_money: false,
        }
    }

    fn chain(symbol: &str, spot: f64, slices: Vec<ExpirySlice>) -> OptionChain {
        OptionChain {
            symbol: symbol.to_string(),
            spot,
            prev_close: None,
            captured_at: Utc::now(),
            slices,
        }
    }

    fn valuation() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn expiry() -> NaiveDate {
        valuation() + Duration::days(30)
    }

    #[test]
    fn test_no_strikes_in_band_returns_none() {
        let c = chain(
            "X",
            100.0,
            vec![ExpirySlice {
                expiration: expiry(),
                calls: vec![quote(10.0, 0.3, 50.0)],
                puts: vec![quote(10.0, 0.3, 50.0)],
            }],
        );
        assert!(GammaExposureEngine::new().profile(&c, valuation()).is_none());
    }

    #[test]
    fn test_unmatched_strikes_return_none() {
        // Calls and puts exist in band but never at the same strike
        let c = chain(
            "X",
            100.0,
            vec![ExpirySlice {
                expiration: expiry(),
                calls: vec![quote(110.0, 0.3, 50.0)],
                puts: vec![quote(90.0, 0.3, 50.0)],
            }],
        );
        assert!(GammaExposureEngine::new().profile(&c, valuation()).is_none());
    }

    #[test]
    fn test_zero_vol_contributes_zero_everywhere() {
        assert_eq!(dollar_gamma(100.0, 100.0, 0.0, 0.1, 500.0), 0.0);
        assert_eq!(dollar_gamma(100.0, 100.0, f64::NAN, 0.1, 500.0), 0.0);
        assert_eq!(dollar_gamma(100.0, 100.0, 0.3, 0.1, f64::NAN), 0.0);

        let c = chain(
            "X",
            100.0,
            vec![ExpirySlice {
                expiration: expiry(),
                calls: vec![quote(100.0, 0.0, 500.0)],
                puts: vec![quote(100.0, 0.0, 500.0)],
            }],
        );
        let profile = GammaExposureEngine::new().profile(&c, valuation()).unwrap();
        assert_eq!(profile.levels.len(), 30);
        assert!(profile.levels.iter().all(|l| l.net_exposure == 0.0));
        assert!(profile.flip.is_none());
    }

    #[test]
    fn test_symmetric_open_interest_nets_to_zero() {
        // Identical OI and IV on both sides at every strike: the Greek is
        // side-independent, so the net profile is exactly zero and no
        // crossing is interpolable.
        let slice = ExpirySlice {
            expiration: expiry(),
            calls: vec![
                quote(90.0, 0.3, 50.0),
                quote(100.0, 0.3, 80.0),
                quote(110.0, 0.3, 50.0),
            ],
            puts: vec![
                quote(90.0, 0.3, 50.0),
                quote(100.0, 0.3, 80.0),
                quote(110.0, 0.3, 50.0),
            ],
        };
        let c = chain("X", 100.0, vec![slice]);
        let profile = GammaExposureEngine::new().profile(&c, valuation()).unwrap();
        assert!(profile.levels.iter().all(|l| l.net_exposure.abs() < 1e-15));
        assert!(profile.flip.is_none());
        // Highest-OI strike on each side is the 100 line, then the tie at
        // 90/110 resolves to the lower strike.
        assert_eq!(profile.call_strikes, vec![100.0, 90.0]);
        assert_eq!(profile.put_strikes, vec![100.0, 90.0]);
    }

    #[test]
    fn test_asymmetric_open_interest_flip_near_spot() {
        // Call OI stacked above spot, put OI below: net exposure is negative
        // at the low end of the band (puts dominate) and positive at the
        // high end, flipping close to the geometric midpoint of the strikes.
        let slice = ExpirySlice {
            expiration: expiry(),
            calls: vec![quote(110.0, 0.3, 1000.0), quote(90.0, 0.3, 1.0)],
            puts: vec![quote(90.0, 0.3, 1000.0), quote(110.0, 0.3, 1.0)],
        };
        let c = chain("X", 100.0, vec![slice]);
        let profile = GammaExposureEngine::new().profile(&c, valuation()).unwrap();

        let flip = profile.flip.expect("sign change inside the band");
        assert!(flip > 50.0 && flip < 200.0);
        assert!((flip - 100.0).abs() < 5.0);

        // The reported flip must match a hand interpolation over the
        // returned grid.
        let prices: Vec<f64> = profile.levels.iter().map(|l| l.price).collect();
        let values: Vec<f64> = profile.levels.iter().map(|l| l.net_exposure).collect();
        let manual = first_zero_crossing(&prices, &values).unwrap();
        assert!((flip - manual).abs() < 1e-12);
    }

    #[test]
    fn test_first_zero_crossing_interpolation() {
        assert_eq!(first_zero_crossing(&[100.0, 110.0], &[2.0, -2.0]), Some(105.0));
        assert_eq!(first_zero_crossing(&[100.0, 110.0], &[1.0, -3.0]), Some(102.5));
        // No sign change anywhere
        assert_eq!(first_zero_crossing(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), None);
        // Flat zero pair is skipped, next pair crosses at its left edge
        assert_eq!(
            first_zero_crossing(&[1.0, 2.0, 3.0], &[0.0, 0.0, -1.0]),
            Some(2.0)
        );
        // Only the first crossing is reported
        let v = first_zero_crossing(&[0.0, 1.0, 2.0, 3.0], &[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(v, Some(0.5));
    }

    #[test]
    fn test_key_strikes_sum_across_expirations() {
        let slices = vec![
            ExpirySlice {
                expiration: expiry(),
                calls: vec![quote(100.0, 0.3, 40.0), quote(105.0, 0.3, 70.0)],
                puts: vec![quote(100.0, 0.3, 90.0), quote(105.0, 0.3, 10.0)],
            },
            ExpirySlice {
                expiration: expiry() + Duration::days(7),
                calls: vec![quote(100.0, 0.3, 40.0)],
                puts: vec![quote(100.0, 0.3, 5.0)],
            },
        ];
        let c = chain("X", 100.0, slices);
        let profile = GammaExposureEngine::new().profile(&c, valuation()).unwrap();
        // Calls: 100 -> 80, 105 -> 70; puts: 100 -> 95, 105 -> 10
        assert_eq!(profile.call_strikes, vec![100.0, 105.0]);
        assert_eq!(profile.put_strikes, vec![100.0, 105.0]);
    }

    #[test]
    fn test_tradingview_record_format() {
        let profile = ExposureProfile {
            symbol: "SPY".to_string(),
            levels: vec![],
            flip: Some(497.6),
            call_strikes: vec![500.0, 505.0],
            put_strikes: vec![495.0, 490.0],
        };
        assert_eq!(profile.tradingview_record(), "SPY:500,505,495,490,498");

        let short = ExposureProfile {
            symbol: "IWM".to_string(),
            levels: vec![],
            flip: None,
            call_strikes: vec![200.0],
            put_strikes: vec![],
        };
        // Fewer than two strikes per side just shortens the list
        assert_eq!(short.tradingview_record(), "IWM:200,,nan");
    }

    #[test]
    fn test_join_records() {
        let records = vec!["SPY:1,2,3,4,5".to_string(), "QQQ:9,8,7,6,5".to_string()];
        assert_eq!(join_records(&records), "SPY:1,2,3,4,5;QQQ:9,8,7,6,5");
    }
}
