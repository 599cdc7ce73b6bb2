//! Top-K symbol selector (v1)
//!
//! Ranks candidates by a weighted score of range/chop, liquidity and trend
//! penalty, after hard gates (toxicity, spread, thin book, warmup). All
//! arithmetic is integer/decimal; the liquidity logarithm is computed by
//! digit counting so selection is bit-identical across platforms. Ties
//! break lexicographically by symbol.

use crate::core::digest::dec_value;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Integer floor(log10(n)) via digit counting; 0 for n <= 0.
pub fn ilog10(n: i64) -> u32 {
    if n <= 0 {
        return 0;
    }
    let mut digits = 0u32;
    let mut value = n;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

/// Hard gate failure labels, recorded per candidate.
pub const GATE_TOXICITY_BLOCKED: &str = "TOXICITY_BLOCKED";
pub const GATE_SPREAD_TOO_WIDE: &str = "SPREAD_TOO_WIDE";
pub const GATE_THIN_BOOK: &str = "THIN_BOOK";
pub const GATE_WARMUP_INSUFFICIENT: &str = "WARMUP_INSUFFICIENT";

/// Scoring input for one symbol.
#[derive(Debug, Clone)]
pub struct SelectionCandidate {
    pub symbol: String,
    /// Chop measure in bps (higher = more range trading opportunity).
    pub range_score: i64,
    pub spread_bps: i64,
    /// Thinner L1 side quantity (liquidity proxy).
    pub thin_l1: Decimal,
    /// Signed net return over the window, in bps.
    pub net_return_bps: i64,
    pub warmup_bars: u32,
    pub toxicity_blocked: bool,
}

#[derive(Debug, Clone)]
pub struct TopKConfig {
    pub k: usize,
    /// Exclude toxicity-blocked candidates outright; otherwise penalize.
    pub tox_blocked_exclude: bool,
    pub spread_max_bps: i64,
    pub thin_l1_min: Decimal,
    pub warmup_min: u32,
    /// Component weights in percent (100 = 1.0x).
    pub w_range: i64,
    pub w_liquidity: i64,
    pub w_trend: i64,
    /// Flat penalty when a toxic candidate is scored instead of excluded.
    pub toxicity_penalty: i64,
}

impl Default for TopKConfig {
    fn default() -> Self {
        Self {
            k: 3,
            tox_blocked_exclude: true,
            spread_max_bps: 50,
            thin_l1_min: Decimal::ONE,
            warmup_min: 15,
            w_range: 100,
            w_liquidity: 50,
            w_trend: 100,
            toxicity_penalty: 1_000,
        }
    }
}

impl TopKConfig {
    pub fn to_value(&self) -> Value {
        json!({
            "k": self.k,
            "tox_blocked_exclude": self.tox_blocked_exclude,
            "spread_max_bps": self.spread_max_bps,
            "thin_l1_min": dec_value(&self.thin_l1_min),
            "warmup_min": self.warmup_min,
            "w_range": self.w_range,
            "w_liquidity": self.w_liquidity,
            "w_trend": self.w_trend,
            "toxicity_penalty": self.toxicity_penalty,
        })
    }
}

/// Score breakdown for one candidate, selected or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolScore {
    pub symbol: String,
    pub score: i64,
    pub range_component: i64,
    pub liquidity_component: i64,
    pub trend_penalty: i64,
    pub toxicity_penalty: i64,
    pub gates_failed: Vec<&'static str>,
    pub selected: bool,
    /// 1-based rank among selected symbols; 0 when not selected.
    pub rank: usize,
}

impl SymbolScore {
    pub fn to_value(&self) -> Value {
        json!({
            "symbol": self.symbol,
            "score": self.score,
            "range_component": self.range_component,
            "liquidity_component": self.liquidity_component,
            "trend_penalty": self.trend_penalty,
            "toxicity_penalty": self.toxicity_penalty,
            "gates_failed": self.gates_failed,
            "selected": self.selected,
            "rank": self.rank,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TopKResult {
    pub selected: Vec<String>,
    pub scores: Vec<SymbolScore>,
    pub k: usize,
    pub total_candidates: usize,
    pub gate_excluded: usize,
}

impl TopKResult {
    pub fn to_value(&self) -> Value {
        json!({
            "selected": self.selected,
            "scores": self.scores.iter().map(SymbolScore::to_value).collect::<Vec<_>>(),
            "k": self.k,
            "total_candidates": self.total_candidates,
            "gate_excluded": self.gate_excluded,
        })
    }
}

fn gates_failed(candidate: &SelectionCandidate, config: &TopKConfig) -> Vec<&'static str> {
    let mut failed = Vec::new();
    if config.tox_blocked_exclude && candidate.toxicity_blocked {
        failed.push(GATE_TOXICITY_BLOCKED);
    }
    if candidate.spread_bps > config.spread_max_bps {
        failed.push(GATE_SPREAD_TOO_WIDE);
    }
    if candidate.thin_l1 < config.thin_l1_min {
        failed.push(GATE_THIN_BOOK);
    }
    if candidate.warmup_bars < config.warmup_min {
        failed.push(GATE_WARMUP_INSUFFICIENT);
    }
    failed
}

/// Pure Top-K selection over scored candidates.
pub fn select_topk(candidates: &[SelectionCandidate], config: &TopKConfig) -> TopKResult {
    let mut scores: Vec<SymbolScore> = Vec::with_capacity(candidates.len());
    let mut gate_excluded = 0usize;

    for candidate in candidates {
        let failed = gates_failed(candidate, config);
        if !failed.is_empty() {
            gate_excluded += 1;
        }

        let range_component = candidate.range_score * config.w_range / 100;

        // Liquidity: floor(log10(floor(thin_l1) + 1)) scaled to milli-units.
        let thin_units = candidate.thin_l1.floor().to_i64().unwrap_or(0).max(0);
        let liq_raw = i64::from(ilog10(thin_units + 1)) * 1_000;
        let liquidity_component = liq_raw * config.w_liquidity / 100;

        let trend_penalty = candidate.net_return_bps.abs() * config.w_trend / 100;

        let toxicity_penalty = if candidate.toxicity_blocked && !config.tox_blocked_exclude {
            config.toxicity_penalty
        } else {
            0
        };

        let score = range_component + liquidity_component - trend_penalty - toxicity_penalty;

        scores.push(SymbolScore {
            symbol: candidate.symbol.clone(),
            score,
            range_component,
            liquidity_component,
            trend_penalty,
            toxicity_penalty,
            gates_failed: failed,
            selected: false,
            rank: 0,
        });
    }

    // Rank eligible candidates: score descending, symbol ascending.
    let mut eligible: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.gates_failed.is_empty())
        .map(|(i, _)| i)
        .collect();
    eligible.sort_by(|&a, &b| {
        scores[b]
            .score
            .cmp(&scores[a].score)
            .then_with(|| scores[a].symbol.cmp(&scores[b].symbol))
    });

    let mut selected = Vec::new();
    for (rank, &idx) in eligible.iter().take(config.k).enumerate() {
        scores[idx].selected = true;
        scores[idx].rank = rank + 1;
        selected.push(scores[idx].symbol.clone());
    }

    // Report scores in a deterministic order as well.
    scores.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    TopKResult {
        selected,
        scores,
        k: config.k,
        total_candidates: candidates.len(),
        gate_excluded,
    }
}

/// Stateful selector fed by the replay scan pass: records per-symbol mid
/// prices and L1 state, then builds candidates and delegates to
/// `select_topk`.
pub struct TopKSelector {
    config: TopKConfig,
    window_size: usize,
    prices: HashMap<String, Vec<Decimal>>,
    last_spread_bps: HashMap<String, i64>,
    last_thin_l1: HashMap<String, Decimal>,
    toxic: HashMap<String, bool>,
}

impl TopKSelector {
    pub fn new(config: TopKConfig, window_size: usize) -> Self {
        Self {
            config,
            window_size,
            prices: HashMap::new(),
            last_spread_bps: HashMap::new(),
            last_thin_l1: HashMap::new(),
            toxic: HashMap::new(),
        }
    }

    pub fn record(
        &mut self,
        symbol: &str,
        mid_price: Decimal,
        spread_bps: i64,
        thin_l1: Decimal,
    ) {
        let window = self.prices.entry(symbol.to_string()).or_default();
        window.push(mid_price);
        if window.len() > self.window_size {
            window.remove(0);
        }
        self.last_spread_bps.insert(symbol.to_string(), spread_bps);
        self.last_thin_l1.insert(symbol.to_string(), thin_l1);
    }

    pub fn mark_toxic(&mut self, symbol: &str, blocked: bool) {
        self.toxic.insert(symbol.to_string(), blocked);
    }

    pub fn select(&self) -> TopKResult {
        let mut symbols: Vec<&String> = self.prices.keys().collect();
        symbols.sort();

        let candidates: Vec<SelectionCandidate> = symbols
            .into_iter()
            .map(|symbol| {
                let window = &self.prices[symbol];
                let (sum_abs, net) = returns_bps(window);
                SelectionCandidate {
                    symbol: symbol.clone(),
                    range_score: (sum_abs - net.abs()).max(0),
                    spread_bps: self.last_spread_bps.get(symbol).copied().unwrap_or(0),
                    thin_l1: self
                        .last_thin_l1
                        .get(symbol)
                        .copied()
                        .unwrap_or(Decimal::ZERO),
                    net_return_bps: net,
                    // Replay selection warms up from recorded points rather
                    // than completed bars.
                    warmup_bars: window.len() as u32,
                    toxicity_blocked: self.toxic.get(symbol).copied().unwrap_or(false),
                }
            })
            .collect();

        select_topk(&candidates, &self.config)
    }

    pub fn reset(&mut self) {
        self.prices.clear();
        self.last_spread_bps.clear();
        self.last_thin_l1.clear();
        self.toxic.clear();
    }
}

fn returns_bps(window: &[Decimal]) -> (i64, i64) {
    if window.len() < 2 {
        return (0, 0);
    }
    let mut sum_abs = 0i64;
    for pair in window.windows(2) {
        if pair[0] > Decimal::ZERO {
            sum_abs += ((pair[1] - pair[0]).abs() * Decimal::from(10_000) / pair[0])
                .floor()
                .to_i64()
                .unwrap_or(0);
        }
    }
    let first = window[0];
    let last = window[window.len() - 1];
    let net = if first > Decimal::ZERO {
        ((last - first) * Decimal::from(10_000) / first)
            .floor()
            .to_i64()
            .unwrap_or(0)
    } else {
        0
    };
    (sum_abs, net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(symbol: &str) -> SelectionCandidate {
        SelectionCandidate {
            symbol: symbol.into(),
            range_score: 100,
            spread_bps: 10,
            thin_l1: dec!(10.0),
            net_return_bps: 50,
            warmup_bars: 20,
            toxicity_blocked: false,
        }
    }

    #[test]
    fn test_ilog10_digit_counting() {
        assert_eq!(ilog10(1), 0);
        assert_eq!(ilog10(9), 0);
        assert_eq!(ilog10(10), 1);
        assert_eq!(ilog10(99), 1);
        assert_eq!(ilog10(100), 2);
        assert_eq!(ilog10(999), 2);
        assert_eq!(ilog10(1000), 3);
        assert_eq!(ilog10(0), 0);
        assert_eq!(ilog10(-1), 0);
    }

    #[test]
    fn test_toxicity_blocked_excluded() {
        let mut toxic = candidate("TOXICUSDT");
        toxic.range_score = 200;
        toxic.toxicity_blocked = true;
        let good = candidate("GOODUSDT");

        let config = TopKConfig {
            k: 2,
            ..Default::default()
        };
        let result = select_topk(&[good, toxic], &config);

        assert_eq!(result.selected, vec!["GOODUSDT".to_string()]);
        assert_eq!(result.gate_excluded, 1);
        let toxic_score = result
            .scores
            .iter()
            .find(|s| s.symbol == "TOXICUSDT")
            .unwrap();
        assert!(toxic_score.gates_failed.contains(&GATE_TOXICITY_BLOCKED));
    }

    #[test]
    fn test_toxicity_penalty_when_not_excluded() {
        let mut toxic = candidate("TOXICUSDT");
        toxic.range_score = 500;
        toxic.toxicity_blocked = true;
        let clean = candidate("CLEANUSDT");

        let config = TopKConfig {
            k: 2,
            tox_blocked_exclude: false,
            ..Default::default()
        };
        let result = select_topk(&[toxic, clean], &config);

        assert_eq!(result.gate_excluded, 0);
        let toxic_score = result
            .scores
            .iter()
            .find(|s| s.symbol == "TOXICUSDT")
            .unwrap();
        assert!(toxic_score.toxicity_penalty > 0);
    }

    #[test]
    fn test_spread_and_thin_and_warmup_gates() {
        let mut wide = candidate("WIDEUSDT");
        wide.spread_bps = 100;
        let mut thin = candidate("THINUSDT");
        thin.thin_l1 = dec!(0.5);
        let mut cold = candidate("COLDUSDT");
        cold.warmup_bars = 3;

        let result = select_topk(&[wide, thin, cold], &TopKConfig::default());
        assert!(result.selected.is_empty());
        assert_eq!(result.gate_excluded, 3);

        let by_symbol = |sym: &str| {
            result
                .scores
                .iter()
                .find(|s| s.symbol == sym)
                .unwrap()
                .gates_failed
                .clone()
        };
        assert!(by_symbol("WIDEUSDT").contains(&GATE_SPREAD_TOO_WIDE));
        assert!(by_symbol("THINUSDT").contains(&GATE_THIN_BOOK));
        assert!(by_symbol("COLDUSDT").contains(&GATE_WARMUP_INSUFFICIENT));
    }

    #[test]
    fn test_multiple_gate_failures_recorded() {
        let mut bad = candidate("BADUSDT");
        bad.toxicity_blocked = true;
        bad.spread_bps = 100;
        bad.thin_l1 = dec!(0.1);
        bad.warmup_bars = 0;

        let result = select_topk(&[bad], &TopKConfig::default());
        assert_eq!(result.gate_excluded, 1);
        let failed = &result.scores[0].gates_failed;
        assert_eq!(failed.len(), 4);
    }

    #[test]
    fn test_higher_range_score_wins() {
        let mut choppy = candidate("CHOPPYUSDT");
        choppy.range_score = 200;
        let mut smooth = candidate("SMOOTHUSDT");
        smooth.range_score = 50;

        let result = select_topk(&[smooth, choppy], &TopKConfig { k: 1, ..Default::default() });
        assert_eq!(result.selected, vec!["CHOPPYUSDT".to_string()]);
    }

    #[test]
    fn test_liquidity_component_monotone() {
        let mut liquid = candidate("LIQUIDUSDT");
        liquid.thin_l1 = dec!(1000);
        let mut illiquid = candidate("ILLIQUIDUSDT");
        illiquid.thin_l1 = dec!(2);

        let result = select_topk(&[liquid, illiquid], &TopKConfig::default());
        let liq = result
            .scores
            .iter()
            .find(|s| s.symbol == "LIQUIDUSDT")
            .unwrap();
        let ill = result
            .scores
            .iter()
            .find(|s| s.symbol == "ILLIQUIDUSDT")
            .unwrap();
        assert!(liq.liquidity_component > ill.liquidity_component);
    }

    #[test]
    fn test_trend_penalized() {
        let mut trend = candidate("TRENDUSDT");
        trend.net_return_bps = 400;
        let range = candidate("RANGEUSDT");

        let result = select_topk(&[trend, range], &TopKConfig::default());
        let t = result
            .scores
            .iter()
            .find(|s| s.symbol == "TRENDUSDT")
            .unwrap();
        let r = result
            .scores
            .iter()
            .find(|s| s.symbol == "RANGEUSDT")
            .unwrap();
        assert!(t.trend_penalty > r.trend_penalty);
    }

    #[test]
    fn test_ties_break_lexicographically() {
        let result = select_topk(
            &[candidate("ZZZUSDT"), candidate("AAAUSDT"), candidate("MMMUSDT")],
            &TopKConfig { k: 3, ..Default::default() },
        );
        assert_eq!(
            result.selected,
            vec![
                "AAAUSDT".to_string(),
                "MMMUSDT".to_string(),
                "ZZZUSDT".to_string()
            ]
        );
    }

    #[test]
    fn test_k_clamps_to_survivors() {
        let result = select_topk(
            &[candidate("ONLYUSDT")],
            &TopKConfig { k: 5, ..Default::default() },
        );
        assert_eq!(result.selected, vec!["ONLYUSDT".to_string()]);
    }

    #[test]
    fn test_empty_candidates() {
        let result = select_topk(&[], &TopKConfig::default());
        assert!(result.selected.is_empty());
        assert_eq!(result.total_candidates, 0);
        assert_eq!(result.gate_excluded, 0);
    }

    #[test]
    fn test_ranks_one_based() {
        let mut first = candidate("FIRSTUSDT");
        first.range_score = 300;
        let mut second = candidate("SECONDUSDT");
        second.range_score = 200;
        let mut third = candidate("THIRDUSDT");
        third.range_score = 100;

        let result = select_topk(
            &[first, second, third],
            &TopKConfig { k: 2, ..Default::default() },
        );
        let rank_of = |sym: &str| result.scores.iter().find(|s| s.symbol == sym).unwrap().rank;
        assert_eq!(rank_of("FIRSTUSDT"), 1);
        assert_eq!(rank_of("SECONDUSDT"), 2);
        assert_eq!(rank_of("THIRDUSDT"), 0);
    }

    #[test]
    fn test_selector_replay_path() {
        let mut selector = TopKSelector::new(
            TopKConfig {
                k: 1,
                warmup_min: 0,
                ..Default::default()
            },
            10,
        );
        // Choppy symbol: alternating prices.
        for px in [100, 102, 100, 102, 100] {
            selector.record("CHOPUSDT", Decimal::from(px as i64), 5, dec!(10));
        }
        // Trending symbol.
        for px in [100, 101, 102, 103, 104] {
            selector.record("TRENDUSDT", Decimal::from(px as i64), 5, dec!(10));
        }

        let result = selector.select();
        assert_eq!(result.selected, vec!["CHOPUSDT".to_string()]);

        // Determinism across calls.
        let again = selector.select();
        assert_eq!(result.selected, again.selected);
    }
}
