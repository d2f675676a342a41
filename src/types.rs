use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::mappings::{Color, Parity, Size, UnknownCategory, Zodiac, is_valid_number};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DrawError {
    #[error("draw period must not be empty")]
    EmptyPeriod,
    #[error("number {value} in slot {slot} is outside 1-49")]
    NumberOutOfRange { slot: usize, value: u8 },
}

/// One settled draw: six regular numbers plus the special number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DrawRecord", into = "DrawRecord")]
pub struct Draw {
    pub id: String,
    pub period: String,
    pub open_time: DateTime<Utc>,
    pub numbers: [u8; 6],
    pub special: u8,
    pub created_at: DateTime<Utc>,
}

impl Draw {
    pub fn new(
        period: &str,
        open_time: DateTime<Utc>,
        numbers: [u8; 6],
        special: u8,
    ) -> Result<Self, DrawError> {
        Self::with_id(&Uuid::new_v4().to_string(), period, open_time, numbers, special)
    }

    pub fn with_id(
        id: &str,
        period: &str,
        open_time: DateTime<Utc>,
        numbers: [u8; 6],
        special: u8,
    ) -> Result<Self, DrawError> {
        let draw = Draw {
            id: id.to_string(),
            period: period.trim().to_string(),
            open_time,
            numbers,
            special,
            created_at: Utc::now(),
        };
        draw.validate()?;
        Ok(draw)
    }

    pub fn validate(&self) -> Result<(), DrawError> {
        if self.period.is_empty() {
            return Err(DrawError::EmptyPeriod);
        }
        for (slot, &value) in self.all_numbers().iter().enumerate() {
            if !is_valid_number(value) {
                return Err(DrawError::NumberOutOfRange { slot, value });
            }
        }
        Ok(())
    }

    /// Regular numbers followed by the special number.
    pub fn all_numbers(&self) -> [u8; 7] {
        let [n1, n2, n3, n4, n5, n6] = self.numbers;
        [n1, n2, n3, n4, n5, n6, self.special]
    }
}

// Flat n1..n6/sp shape used by backups and the browser app.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrawRecord {
    id: String,
    period: String,
    open_time: DateTime<Utc>,
    n1: u8,
    n2: u8,
    n3: u8,
    n4: u8,
    n5: u8,
    n6: u8,
    sp: u8,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl TryFrom<DrawRecord> for Draw {
    type Error = DrawError;

    fn try_from(r: DrawRecord) -> Result<Self, Self::Error> {
        let draw = Draw {
            id: r.id,
            period: r.period,
            open_time: r.open_time,
            numbers: [r.n1, r.n2, r.n3, r.n4, r.n5, r.n6],
            special: r.sp,
            created_at: r.created_at,
        };
        draw.validate()?;
        Ok(draw)
    }
}

impl From<Draw> for DrawRecord {
    fn from(d: Draw) -> Self {
        let [n1, n2, n3, n4, n5, n6] = d.numbers;
        DrawRecord {
            id: d.id,
            period: d.period,
            open_time: d.open_time,
            n1,
            n2,
            n3,
            n4,
            n5,
            n6,
            sp: d.special,
            created_at: d.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlayType {
    #[serde(rename = "TE_MA")]
    Special,
    #[serde(rename = "ZHENG_MA")]
    Regular,
    #[serde(rename = "LIAN_MA")]
    Combination,
    #[serde(rename = "SE_BO")]
    Color,
    #[serde(rename = "SHENG_XIAO")]
    Zodiac,
    #[serde(rename = "HE_DAN_SHUANG")]
    SumParity,
    #[serde(rename = "HE_DA_XIAO")]
    SumSize,
    #[serde(rename = "WEI_DA_XIAO")]
    TailSize,
}

impl PlayType {
    pub const ALL: [PlayType; 8] = [
        PlayType::Special,
        PlayType::Regular,
        PlayType::Combination,
        PlayType::Color,
        PlayType::Zodiac,
        PlayType::SumParity,
        PlayType::SumSize,
        PlayType::TailSize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlayType::Special => "TE_MA",
            PlayType::Regular => "ZHENG_MA",
            PlayType::Combination => "LIAN_MA",
            PlayType::Color => "SE_BO",
            PlayType::Zodiac => "SHENG_XIAO",
            PlayType::SumParity => "HE_DAN_SHUANG",
            PlayType::SumSize => "HE_DA_XIAO",
            PlayType::TailSize => "WEI_DA_XIAO",
        }
    }

    pub fn is_number_based(self) -> bool {
        matches!(
            self,
            PlayType::Special | PlayType::Regular | PlayType::Combination
        )
    }
}

impl fmt::Display for PlayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayType {
    type Err = BetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        PlayType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(tag) || format!("{:?}", p).eq_ignore_ascii_case(tag))
            .ok_or_else(|| BetError::UnknownPlayType(tag.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BetError {
    #[error("unknown play type: {0}")]
    UnknownPlayType(String),
    #[error("selection for {play_type} is empty")]
    EmptySelection { play_type: PlayType },
    #[error("combination bets need at least 2 distinct numbers, got {0}")]
    CombinationTooSmall(usize),
    #[error("number {0} is outside 1-49")]
    NumberOutOfRange(i64),
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("selection payload for {play_type} has an unsupported shape: {payload}")]
    MalformedSelection { play_type: PlayType, payload: String },
    #[error("stake must be a positive amount, got {0}")]
    InvalidStake(f64),
    #[error("odds must be a positive multiplier, got {0}")]
    InvalidOdds(f64),
}

/// What a bet picks. The variant decides the play type.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Special(Vec<u8>),
    Regular(Vec<u8>),
    Combination(Vec<u8>),
    Color(Vec<Color>),
    Zodiac(Vec<Zodiac>),
    SumParity(Parity),
    SumSize(Size),
    TailSize(Size),
}

impl Selection {
    pub fn play_type(&self) -> PlayType {
        match self {
            Selection::Special(_) => PlayType::Special,
            Selection::Regular(_) => PlayType::Regular,
            Selection::Combination(_) => PlayType::Combination,
            Selection::Color(_) => PlayType::Color,
            Selection::Zodiac(_) => PlayType::Zodiac,
            Selection::SumParity(_) => PlayType::SumParity,
            Selection::SumSize(_) => PlayType::SumSize,
            Selection::TailSize(_) => PlayType::TailSize,
        }
    }

    pub fn numbers(&self) -> &[u8] {
        match self {
            Selection::Special(n) | Selection::Regular(n) | Selection::Combination(n) => n,
            _ => &[],
        }
    }

    pub fn zodiacs(&self) -> &[Zodiac] {
        match self {
            Selection::Zodiac(z) => z,
            _ => &[],
        }
    }

    pub fn colors(&self) -> &[Color] {
        match self {
            Selection::Color(c) => c,
            _ => &[],
        }
    }

    /// Range-checks numbers, drops duplicates and rejects empty picks.
    pub fn validate(self) -> Result<Self, BetError> {
        let play_type = self.play_type();
        let selection = match self {
            Selection::Special(n) => Selection::Special(checked_numbers(n, play_type)?),
            Selection::Regular(n) => Selection::Regular(checked_numbers(n, play_type)?),
            Selection::Combination(n) => {
                let n = checked_numbers(n, play_type)?;
                if n.len() < 2 {
                    return Err(BetError::CombinationTooSmall(n.len()));
                }
                Selection::Combination(n)
            }
            Selection::Color(c) => Selection::Color(non_empty(dedup(c), play_type)?),
            Selection::Zodiac(z) => Selection::Zodiac(non_empty(dedup(z), play_type)?),
            other => other,
        };
        Ok(selection)
    }

    /// Builds a selection from the loosely shaped payloads older records carry:
    /// `[8]`, `"1,2,3"`, `{"numbers": [..]}`, `{"color": "红"}`, `{"sx": ["鼠"]}`,
    /// `{"heDanShuang": "单"}`, `"大"`. A `null` payload is malformed.
    pub fn coerce(play_type: PlayType, payload: &Value) -> Result<Self, BetError> {
        let malformed = || BetError::MalformedSelection {
            play_type,
            payload: payload.to_string(),
        };
        let selection = match play_type {
            PlayType::Special | PlayType::Regular | PlayType::Combination => {
                let numbers = payload_numbers(unwrap_keyed(payload, &["numbers", "number"]))
                    .ok_or_else(malformed)?
                    .into_iter()
                    .map(|n| u8::try_from(n).map_err(|_| BetError::NumberOutOfRange(n)))
                    .collect::<Result<Vec<u8>, _>>()?;
                match play_type {
                    PlayType::Special => Selection::Special(numbers),
                    PlayType::Regular => Selection::Regular(numbers),
                    _ => Selection::Combination(numbers),
                }
            }
            PlayType::Color => {
                let names = payload_names(unwrap_keyed(payload, &["color", "colors", "seBo"]))
                    .ok_or_else(malformed)?;
                Selection::Color(parse_all(&names)?)
            }
            PlayType::Zodiac => {
                let names = payload_names(unwrap_keyed(payload, &["sx", "zodiac", "zodiacs"]))
                    .ok_or_else(malformed)?;
                Selection::Zodiac(parse_all(&names)?)
            }
            PlayType::SumParity | PlayType::SumSize | PlayType::TailSize => {
                let keys = ["value", "heDanShuang", "heDaXiao", "weiDaXiao"];
                let name = payload_names(unwrap_keyed(payload, &keys))
                    .and_then(|names| names.into_iter().next())
                    .ok_or_else(malformed)?;
                match play_type {
                    PlayType::SumParity => Selection::SumParity(name.parse()?),
                    PlayType::SumSize => Selection::SumSize(name.parse()?),
                    _ => Selection::TailSize(name.parse()?),
                }
            }
        };
        selection.validate()
    }

    /// Canonical payload, readable again by [`Selection::coerce`].
    pub fn to_payload(&self) -> Value {
        match self {
            Selection::Special(n) | Selection::Regular(n) | Selection::Combination(n) => {
                Value::from(n.clone())
            }
            Selection::Color(c) => Value::from(c.iter().map(|c| c.to_string()).collect::<Vec<_>>()),
            Selection::Zodiac(z) => Value::from(z.iter().map(|z| z.to_string()).collect::<Vec<_>>()),
            Selection::SumParity(p) => Value::from(format!("{:?}", p)),
            Selection::SumSize(s) | Selection::TailSize(s) => Value::from(format!("{:?}", s)),
        }
    }
}

fn checked_numbers(numbers: Vec<u8>, play_type: PlayType) -> Result<Vec<u8>, BetError> {
    if let Some(&bad) = numbers.iter().find(|&&n| !is_valid_number(n)) {
        return Err(BetError::NumberOutOfRange(bad as i64));
    }
    non_empty(dedup(numbers), play_type)
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn non_empty<T>(items: Vec<T>, play_type: PlayType) -> Result<Vec<T>, BetError> {
    if items.is_empty() {
        Err(BetError::EmptySelection { play_type })
    } else {
        Ok(items)
    }
}

fn unwrap_keyed<'a>(payload: &'a Value, keys: &[&str]) -> &'a Value {
    match payload {
        Value::Object(map) => keys
            .iter()
            .find_map(|k| map.get(*k))
            .unwrap_or(payload),
        _ => payload,
    }
}

fn payload_numbers(value: &Value) -> Option<Vec<i64>> {
    match value {
        Value::Number(n) => n.as_i64().map(|n| vec![n]),
        Value::String(s) => s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| part.trim().parse::<i64>().ok())
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn payload_names(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.trim().to_string()))
            .collect(),
        _ => None,
    }
}

fn parse_all<T: FromStr<Err = UnknownCategory>>(names: &[String]) -> Result<Vec<T>, BetError> {
    names
        .iter()
        .map(|name| name.parse::<T>().map_err(BetError::from))
        .collect()
}

/// One wager against a draw. `result` is the settled profit or loss;
/// `None` or zero means not settled yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BetRecord", into = "BetRecord")]
pub struct Bet {
    pub id: String,
    pub draw_id: String,
    pub selection: Selection,
    pub stake: f64,
    pub odds: f64,
    pub result: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Bet {
    pub fn new(draw_id: &str, selection: Selection, stake: f64, odds: f64) -> Result<Self, BetError> {
        let bet = Bet {
            id: Uuid::new_v4().to_string(),
            draw_id: draw_id.to_string(),
            selection: selection.validate()?,
            stake,
            odds,
            result: None,
            created_at: Utc::now(),
        };
        bet.check_amounts()?;
        Ok(bet)
    }

    pub fn with_result(mut self, result: f64) -> Self {
        self.result = Some(result);
        self
    }

    pub fn check_amounts(&self) -> Result<(), BetError> {
        if !(self.stake.is_finite() && self.stake > 0.0) {
            return Err(BetError::InvalidStake(self.stake));
        }
        if !(self.odds.is_finite() && self.odds > 0.0) {
            return Err(BetError::InvalidOdds(self.odds));
        }
        Ok(())
    }

    pub fn play_type(&self) -> PlayType {
        self.selection.play_type()
    }

    /// Settled amount, zero while unsettled.
    pub fn outcome(&self) -> f64 {
        self.result.unwrap_or(0.0)
    }

    pub fn is_settled(&self) -> bool {
        self.result.is_some_and(|r| r != 0.0)
    }

    pub fn is_hit(&self) -> bool {
        self.outcome() > 0.0
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BetRecord {
    id: String,
    draw_id: String,
    play_type: String,
    numbers: Value,
    stake: f64,
    odds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<f64>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl TryFrom<BetRecord> for Bet {
    type Error = BetError;

    fn try_from(r: BetRecord) -> Result<Self, Self::Error> {
        let play_type: PlayType = r.play_type.parse()?;
        let bet = Bet {
            id: r.id,
            draw_id: r.draw_id,
            selection: Selection::coerce(play_type, &r.numbers)?,
            stake: r.stake,
            odds: r.odds,
            result: r.result,
            created_at: r.created_at,
        };
        bet.check_amounts()?;
        Ok(bet)
    }
}

impl From<Bet> for BetRecord {
    fn from(b: Bet) -> Self {
        BetRecord {
            id: b.id,
            draw_id: b.draw_id,
            play_type: b.selection.play_type().as_str().to_string(),
            numbers: b.selection.to_payload(),
            stake: b.stake,
            odds: b.odds,
            result: b.result,
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub draws: Vec<Draw>,
    pub bets: Vec<Bet>,
    #[serde(default)]
    pub settings: Vec<Setting>,
    pub version: String,
    pub export_time: DateTime<Utc>,
}

pub const EXPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberStat {
    pub number: u8,
    pub frequency: u32,
    pub current_gap: u32,
    pub max_gap: u32,
    pub avg_gap: f64,
    pub last_appear: Option<String>,
}

/// Per play type totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStat {
    pub play_type: PlayType,
    pub total_bets: u32,
    pub total_stake: f64,
    pub total_result: f64,
    pub hit_rate: f64,
    pub profit_rate: f64,
}

/// Per zodiac or color totals after stake splitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryResult {
    pub total_bets: u32,
    pub hits: u32,
    pub total_stake: f64,
    pub total_result: f64,
    pub hit_rate: f64,
    pub profit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStat {
    pub period: String,
    pub total_bets: u32,
    pub total_stake: f64,
    pub total_result: f64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period: String,
    pub total_bets: u32,
    pub total_stake: f64,
    pub total_result: f64,
    pub hit_rate: f64,
    pub cumulative_result: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberBetStat {
    pub number: u8,
    pub total_bets: u32,
    pub total_stake: f64,
    pub total_result: f64,
    pub hit_rate: f64,
    pub profit_rate: f64,
}

// Remote feed wire types.

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RawLatestItem {
    pub expect: String,
    #[serde(rename = "openTime")]
    pub open_time: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "openCode")]
    pub open_code: String,
    pub wave: Option<String>,
    pub zodiac: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct RawHistoryResponse {
    pub result: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub data: Vec<RawLatestItem>,
    #[serde(default)]
    pub timestamp: i64,
}
