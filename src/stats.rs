//! Statistics over draw and bet snapshots.
//!
//! Every function here is a pure fold over its inputs: nothing is cached
//! between calls and nothing fails. Bets pointing at a missing draw are
//! skipped where a draw is needed, and every ratio with a zero denominator
//! is reported as 0.

use std::collections::{BTreeMap, HashMap};

use crate::mappings::{Category, Color, MAX_NUMBER, MIN_NUMBER, NUMBER_COUNT, Zodiac, is_valid_number};
use crate::types::{
    Bet, CategoryResult, CategoryStat, Draw, NumberBetStat, NumberStat, PeriodStat, PlayType,
    Selection, TrendPoint,
};
use crate::utils::compare_periods;

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() { value } else { 0.0 }
}

fn index_draws(draws: &[Draw]) -> HashMap<&str, &Draw> {
    draws.iter().map(|d| (d.id.as_str(), d)).collect()
}

/// Keeps only bets with a non-zero settled result.
pub fn settled(bets: &[Bet]) -> Vec<Bet> {
    bets.iter().filter(|b| b.is_settled()).cloned().collect()
}

#[derive(Default)]
struct GapState {
    frequency: u32,
    current_gap: u32,
    max_gap: u32,
    last_appear: Option<String>,
}

/// Frequency and gap statistics for every number, hottest first.
///
/// Draws are walked oldest to newest by `open_time` (input order breaks
/// ties), so `current_gap` counts the draws since the latest appearance.
pub fn compute_number_stats(draws: &[Draw]) -> Vec<NumberStat> {
    let mut ordered: Vec<&Draw> = draws.iter().collect();
    ordered.sort_by_key(|d| d.open_time);

    let states = ordered.iter().fold(
        (0..NUMBER_COUNT).map(|_| GapState::default()).collect::<Vec<_>>(),
        |mut states, draw| {
            let mut appeared = [false; NUMBER_COUNT];
            for n in draw.all_numbers() {
                if is_valid_number(n) {
                    let idx = (n - MIN_NUMBER) as usize;
                    states[idx].frequency += 1;
                    appeared[idx] = true;
                }
            }
            for (idx, state) in states.iter_mut().enumerate() {
                if appeared[idx] {
                    state.current_gap = 0;
                    state.last_appear = Some(draw.period.clone());
                } else {
                    state.current_gap += 1;
                    state.max_gap = state.max_gap.max(state.current_gap);
                }
            }
            states
        },
    );

    let total = ordered.len() as f64;
    let mut stats: Vec<NumberStat> = states
        .into_iter()
        .zip(MIN_NUMBER..=MAX_NUMBER)
        .map(|(state, number)| NumberStat {
            number,
            frequency: state.frequency,
            current_gap: state.current_gap,
            max_gap: state.max_gap,
            avg_gap: if state.frequency > 0 {
                (total - state.frequency as f64) / state.frequency as f64
            } else {
                0.0
            },
            last_appear: state.last_appear,
        })
        .collect();

    stats.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.number.cmp(&b.number)));
    stats
}

#[derive(Default, Clone)]
struct Tally {
    bets: u32,
    hits: u32,
    stake: f64,
    result: f64,
}

impl Tally {
    fn add(mut self, bet: &Bet) -> Self {
        self.bets += 1;
        self.stake += bet.stake;
        self.result += bet.outcome();
        if bet.is_hit() {
            self.hits += 1;
        }
        self
    }

    fn hit_rate(&self) -> f64 {
        ratio(self.hits as f64, self.bets as f64)
    }

    fn profit_rate(&self) -> f64 {
        ratio(self.result, self.stake)
    }
}

/// Totals per play type, largest stake first.
///
/// Every bet counts, including bets whose draw is unknown or that are not
/// settled yet. Use [`settled`] beforehand to restrict to settled bets.
pub fn compute_category_stats(bets: &[Bet]) -> Vec<CategoryStat> {
    let tallies = bets
        .iter()
        .fold(BTreeMap::<PlayType, Tally>::new(), |mut acc, bet| {
            let tally = acc.entry(bet.play_type()).or_default();
            *tally = std::mem::take(tally).add(bet);
            acc
        });

    let mut stats: Vec<CategoryStat> = tallies
        .into_iter()
        .map(|(play_type, t)| CategoryStat {
            play_type,
            total_bets: t.bets,
            total_stake: t.stake,
            total_result: t.result,
            hit_rate: t.hit_rate(),
            profit_rate: t.profit_rate(),
        })
        .collect();

    stats.sort_by(|a, b| {
        b.total_stake
            .total_cmp(&a.total_stake)
            .then(a.play_type.cmp(&b.play_type))
    });
    stats
}

/// Spreads `stake` evenly over every number covered by `categories` and
/// returns each category's share. A selection covering no numbers gets 0.
pub fn allocate_stake<C: Category>(stake: f64, categories: &[C]) -> Vec<(C, f64)> {
    let total_numbers: usize = categories.iter().map(|c| c.numbers().len()).sum();
    let per_number = if total_numbers > 0 {
        stake / total_numbers as f64
    } else {
        0.0
    };
    categories
        .iter()
        .map(|&c| (c, per_number * c.numbers().len() as f64))
        .collect()
}

fn compute_split_stats<C: Category>(
    bets: &[Bet],
    draws: &[Draw],
    play_type: PlayType,
    picked: fn(&Selection) -> &[C],
) -> BTreeMap<C, CategoryResult> {
    let draws_by_id = index_draws(draws);
    let initial: BTreeMap<C, CategoryResult> = C::all()
        .iter()
        .map(|&c| (c, CategoryResult::default()))
        .collect();

    let mut stats = bets
        .iter()
        .filter(|bet| bet.play_type() == play_type)
        .filter_map(|bet| Some((bet, *draws_by_id.get(bet.draw_id.as_str())?)))
        .fold(initial, |mut stats, (bet, draw)| {
            let drawn: Vec<C> = draw.all_numbers().into_iter().filter_map(C::of).collect();
            for (category, allocated) in allocate_stake(bet.stake, picked(&bet.selection)) {
                let entry = stats.entry(category).or_default();
                entry.total_bets += 1;
                entry.total_stake += allocated;
                if drawn.contains(&category) {
                    entry.hits += 1;
                    entry.total_result += allocated * bet.odds;
                } else {
                    entry.total_result -= allocated;
                }
            }
            stats
        });

    for result in stats.values_mut() {
        result.hit_rate = ratio(result.hits as f64, result.total_bets as f64);
        result.profit_rate = ratio(result.total_result, result.total_stake);
    }
    stats
}

/// Zodiac bets with their stake split across the selected signs.
///
/// A hit pays `allocated * odds`; a miss loses the allocated stake.
pub fn compute_zodiac_stats(bets: &[Bet], draws: &[Draw]) -> BTreeMap<Zodiac, CategoryResult> {
    compute_split_stats(bets, draws, PlayType::Zodiac, Selection::zodiacs)
}

/// Color bets, split and settled the same way as zodiac bets.
pub fn compute_color_stats(bets: &[Bet], draws: &[Draw]) -> BTreeMap<Color, CategoryResult> {
    compute_split_stats(bets, draws, PlayType::Color, Selection::colors)
}

// Buckets in chronological period order.
fn period_tallies(bets: &[Bet], draws: &[Draw]) -> Vec<(String, Tally)> {
    let draws_by_id = index_draws(draws);
    let buckets = bets
        .iter()
        .filter_map(|bet| Some((bet, draws_by_id.get(bet.draw_id.as_str())?)))
        .fold(HashMap::<&str, Tally>::new(), |mut acc, (bet, draw)| {
            let tally = acc.entry(draw.period.as_str()).or_default();
            *tally = std::mem::take(tally).add(bet);
            acc
        });

    let mut buckets: Vec<(String, Tally)> = buckets
        .into_iter()
        .map(|(period, tally)| (period.to_string(), tally))
        .collect();
    buckets.sort_by(|a, b| compare_periods(&a.0, &b.0));
    buckets
}

/// Per period totals with a running profit/loss, oldest period first.
pub fn compute_trend(bets: &[Bet], draws: &[Draw]) -> Vec<TrendPoint> {
    period_tallies(bets, draws)
        .into_iter()
        .scan(0.0, |cumulative, (period, t)| {
            *cumulative += t.result;
            Some(TrendPoint {
                hit_rate: t.hit_rate(),
                period,
                total_bets: t.bets,
                total_stake: t.stake,
                total_result: t.result,
                cumulative_result: *cumulative,
            })
        })
        .collect()
}

/// Per period totals, newest period first.
pub fn compute_period_stats(bets: &[Bet], draws: &[Draw]) -> Vec<PeriodStat> {
    period_tallies(bets, draws)
        .into_iter()
        .rev()
        .map(|(period, t)| PeriodStat {
            hit_rate: t.hit_rate(),
            period,
            total_bets: t.bets,
            total_stake: t.stake,
            total_result: t.result,
        })
        .collect()
}

/// Per number totals over number based bets (special, regular and
/// combination). Each selected number is charged the full bet stake.
pub fn compute_number_bet_stats(bets: &[Bet]) -> Vec<NumberBetStat> {
    let tallies = bets
        .iter()
        .filter(|bet| bet.play_type().is_number_based())
        .fold(vec![Tally::default(); NUMBER_COUNT], |mut acc, bet| {
            for &n in bet.selection.numbers() {
                if is_valid_number(n) {
                    let idx = (n - MIN_NUMBER) as usize;
                    acc[idx] = std::mem::take(&mut acc[idx]).add(bet);
                }
            }
            acc
        });

    let mut stats: Vec<NumberBetStat> = tallies
        .into_iter()
        .zip(MIN_NUMBER..=MAX_NUMBER)
        .map(|(t, number)| NumberBetStat {
            number,
            total_bets: t.bets,
            total_stake: t.stake,
            total_result: t.result,
            hit_rate: t.hit_rate(),
            profit_rate: t.profit_rate(),
        })
        .collect();

    stats.sort_by(|a, b| {
        b.total_stake
            .total_cmp(&a.total_stake)
            .then(a.number.cmp(&b.number))
    });
    stats
}

/// Appearance counts per number for consecutive windows of `window` draws,
/// in input order. The last row may cover fewer draws.
pub fn generate_heatmap(draws: &[Draw], window: usize) -> Vec<[u32; NUMBER_COUNT]> {
    if window == 0 {
        return Vec::new();
    }
    draws
        .chunks(window)
        .map(|chunk| {
            let mut row = [0u32; NUMBER_COUNT];
            for n in chunk.iter().flat_map(|d| d.all_numbers()) {
                if is_valid_number(n) {
                    row[(n - MIN_NUMBER) as usize] += 1;
                }
            }
            row
        })
        .collect()
}
