use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use mark_stats::api::{
    fetch_and_save_history, fetch_latest, fetch_live, parse_and_insert_raw_json, parse_backup,
};
use mark_stats::config::Config;
use mark_stats::database::*;
use mark_stats::utils::parse_open_time;
use mark_stats::{
    Bet, Draw, PlayType, Selection, attributes_of, compute_category_stats,
    compute_color_stats, compute_number_bet_stats, compute_number_stats, compute_period_stats,
    compute_trend, compute_zodiac_stats, generate_heatmap, settled,
};

type Arguments = HashMap<String, Value>;

fn required_str<'a>(arguments: &'a Arguments, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing {} parameter", key))
}

fn required_f64(arguments: &Arguments, key: &str) -> Result<f64> {
    arguments
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow!("Missing {} parameter", key))
}

fn optional_i64(arguments: &Arguments, key: &str, default: i64) -> i64 {
    arguments.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

fn optional_bool(arguments: &Arguments, key: &str, default: bool) -> bool {
    arguments.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn parse_numbers(value: &Value) -> Result<[u8; 6]> {
    let numbers: Vec<u8> =
        serde_json::from_value(value.clone()).context("numbers must be a list of integers")?;
    let count = numbers.len();
    numbers
        .try_into()
        .map_err(|_| anyhow!("numbers must hold exactly 6 regular numbers, got {}", count))
}

pub struct DrawUseCase {
    connection: Arc<rusqlite::Connection>,
}

impl DrawUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>) -> Self {
        Self { connection }
    }

    pub async fn add_draw(&self, arguments: &Arguments) -> Result<String> {
        let period = required_str(arguments, "period")?;
        let open_time = match arguments.get("open_time").and_then(|v| v.as_str()) {
            Some(raw) => parse_open_time(raw)?,
            None => Utc::now(),
        };
        let numbers = parse_numbers(
            arguments
                .get("numbers")
                .ok_or_else(|| anyhow!("Missing numbers parameter"))?,
        )?;
        let special = arguments
            .get("special")
            .and_then(|v| v.as_u64())
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| anyhow!("Missing special parameter"))?;

        let draw = Draw::new(period, open_time, numbers, special)?;
        add_draw(&self.connection, &draw)?;

        Ok(json!({
            "success": true,
            "draw": draw
        })
        .to_string())
    }

    pub async fn list_draws(&self, arguments: &Arguments) -> Result<String> {
        let limit = optional_i64(arguments, "limit", 100);
        let draws = get_draws(&self.connection, limit)?;

        Ok(json!({
            "success": true,
            "draws": draws
        })
        .to_string())
    }

    pub async fn get_draw(&self, arguments: &Arguments) -> Result<String> {
        let draw = if let Some(id) = arguments.get("id").and_then(|v| v.as_str()) {
            get_draw_by_id(&self.connection, id)?
        } else {
            get_draw_by_period(&self.connection, required_str(arguments, "period")?)?
        };
        let bets = match &draw {
            Some(draw) => get_bets_by_draw(&self.connection, &draw.id)?,
            None => Vec::new(),
        };

        Ok(json!({
            "success": true,
            "draw": draw,
            "bets": bets
        })
        .to_string())
    }

    pub async fn update_draw(&self, arguments: &Arguments) -> Result<String> {
        let id = required_str(arguments, "id")?;
        let current = get_draw_by_id(&self.connection, id)?.ok_or_else(|| anyhow!("No draw with id {}", id))?;

        let period = arguments
            .get("period")
            .and_then(|v| v.as_str())
            .unwrap_or(&current.period);
        let open_time = match arguments.get("open_time").and_then(|v| v.as_str()) {
            Some(raw) => parse_open_time(raw)?,
            None => current.open_time,
        };
        let numbers = match arguments.get("numbers") {
            Some(value) => parse_numbers(value)?,
            None => current.numbers,
        };
        let special = match arguments.get("special").and_then(|v| v.as_u64()) {
            Some(value) => u8::try_from(value).map_err(|_| anyhow!("special out of range: {}", value))?,
            None => current.special,
        };

        let mut draw = Draw::with_id(id, period, open_time, numbers, special)?;
        draw.created_at = current.created_at;
        update_draw(&self.connection, &draw)?;

        Ok(json!({
            "success": true,
            "draw": draw
        })
        .to_string())
    }

    pub async fn delete_draw(&self, arguments: &Arguments) -> Result<String> {
        let id = required_str(arguments, "id")?;
        let deleted = delete_draw(&self.connection, id)?;

        Ok(json!({
            "success": deleted,
            "message": if deleted {
                format!("Deleted draw {} and its bets", id)
            } else {
                format!("No draw with id {}", id)
            }
        })
        .to_string())
    }

    pub async fn next_period(&self, _arguments: &Arguments) -> Result<String> {
        let period = get_next_period(&self.connection, Utc::now().year())?;

        Ok(json!({
            "success": true,
            "period": period
        })
        .to_string())
    }

    pub async fn parse_and_insert_raw_json(&self, arguments: &Arguments) -> Result<String> {
        let raw_json = required_str(arguments, "raw_json")?;
        let summary = parse_and_insert_raw_json(&self.connection, raw_json)?;

        Ok(json!({
            "success": true,
            "draws_added": summary.draws_added,
            "bets_added": summary.bets_added,
            "skipped": summary.skipped
        })
        .to_string())
    }

    pub async fn export_all(&self, _arguments: &Arguments) -> Result<String> {
        let data = export_all(&self.connection)?;
        Ok(serde_json::to_string(&data)?)
    }

    pub async fn import_all(&self, arguments: &Arguments) -> Result<String> {
        let data = arguments
            .get("data")
            .ok_or_else(|| anyhow!("Missing data parameter"))?;
        let (data, skipped) = parse_backup(data.clone())?;
        import_all(&self.connection, &data)?;

        Ok(json!({
            "success": true,
            "draws": data.draws.len(),
            "bets": data.bets.len(),
            "settings": data.settings.len(),
            "skipped": skipped
        })
        .to_string())
    }
}

pub struct BetUseCase {
    connection: Arc<rusqlite::Connection>,
}

impl BetUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>) -> Self {
        Self { connection }
    }

    pub async fn add_bet(&self, arguments: &Arguments) -> Result<String> {
        let draw_id = required_str(arguments, "draw_id")?;
        let play_type: PlayType = required_str(arguments, "play_type")?.parse()?;
        let payload = arguments
            .get("selection")
            .ok_or_else(|| anyhow!("Missing selection parameter"))?;
        let selection = Selection::coerce(play_type, payload)?;
        let mut bet = Bet::new(
            draw_id,
            selection,
            required_f64(arguments, "stake")?,
            required_f64(arguments, "odds")?,
        )?;
        bet.result = arguments.get("result").and_then(|v| v.as_f64());

        if get_draw_by_id(&self.connection, draw_id)?.is_none() {
            tracing::warn!("Bet {} references unknown draw {}", bet.id, draw_id);
        }
        add_bet(&self.connection, &bet)?;

        Ok(json!({
            "success": true,
            "bet": bet
        })
        .to_string())
    }

    pub async fn list_bets(&self, arguments: &Arguments) -> Result<String> {
        let bets = if let Some(draw_id) = arguments.get("draw_id").and_then(|v| v.as_str()) {
            get_bets_by_draw(&self.connection, draw_id)?
        } else if let Some(play_type) = arguments.get("play_type").and_then(|v| v.as_str()) {
            get_bets_by_play_type(&self.connection, play_type.parse()?)?
        } else {
            get_bets(&self.connection, optional_i64(arguments, "limit", 200))?
        };

        Ok(json!({
            "success": true,
            "bets": bets
        })
        .to_string())
    }

    pub async fn update_bet(&self, arguments: &Arguments) -> Result<String> {
        let id = required_str(arguments, "id")?;
        let mut bet = get_bet(&self.connection, id)?.ok_or_else(|| anyhow!("No bet with id {}", id))?;

        if let Some(draw_id) = arguments.get("draw_id").and_then(|v| v.as_str()) {
            bet.draw_id = draw_id.to_string();
        }
        if let Some(payload) = arguments.get("selection") {
            let play_type = match arguments.get("play_type").and_then(|v| v.as_str()) {
                Some(tag) => tag.parse()?,
                None => bet.play_type(),
            };
            bet.selection = Selection::coerce(play_type, payload)?;
        }
        if let Some(stake) = arguments.get("stake").and_then(|v| v.as_f64()) {
            bet.stake = stake;
        }
        if let Some(odds) = arguments.get("odds").and_then(|v| v.as_f64()) {
            bet.odds = odds;
        }
        match arguments.get("result") {
            Some(Value::Null) => bet.result = None,
            Some(value) => bet.result = value.as_f64(),
            None => {}
        }
        bet.check_amounts()?;
        update_bet(&self.connection, &bet)?;

        Ok(json!({
            "success": true,
            "bet": bet
        })
        .to_string())
    }

    pub async fn delete_bet(&self, arguments: &Arguments) -> Result<String> {
        let id = required_str(arguments, "id")?;
        let deleted = delete_bet(&self.connection, id)?;

        Ok(json!({
            "success": deleted
        })
        .to_string())
    }

    pub async fn get_setting(&self, arguments: &Arguments) -> Result<String> {
        let key = required_str(arguments, "key")?;
        let value = get_setting(&self.connection, key)?;

        Ok(json!({
            "success": true,
            "key": key,
            "value": value
        })
        .to_string())
    }

    pub async fn set_setting(&self, arguments: &Arguments) -> Result<String> {
        let key = required_str(arguments, "key")?;
        let value = arguments.get("value").cloned().unwrap_or(Value::Null);
        set_setting(&self.connection, key, &value)?;

        Ok(json!({
            "success": true,
            "key": key
        })
        .to_string())
    }
}

pub struct StatsUseCase {
    connection: Arc<rusqlite::Connection>,
}

impl StatsUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>) -> Self {
        Self { connection }
    }

    fn snapshot(&self, arguments: &Arguments) -> Result<(Vec<Draw>, Vec<Bet>)> {
        let draws = get_draws(&self.connection, optional_i64(arguments, "draw_limit", 200))?;
        let mut bets = get_bets(&self.connection, optional_i64(arguments, "bet_limit", 1000))?;
        if optional_bool(arguments, "settled_only", false) {
            bets = settled(&bets);
        }
        Ok((draws, bets))
    }

    pub async fn number_stats(&self, arguments: &Arguments) -> Result<String> {
        let (draws, _) = self.snapshot(arguments)?;
        Ok(json!({
            "success": true,
            "draw_count": draws.len(),
            "stats": compute_number_stats(&draws)
        })
        .to_string())
    }

    pub async fn play_type_stats(&self, arguments: &Arguments) -> Result<String> {
        let (_, bets) = self.snapshot(arguments)?;
        Ok(json!({
            "success": true,
            "stats": compute_category_stats(&bets)
        })
        .to_string())
    }

    pub async fn number_bet_stats(&self, arguments: &Arguments) -> Result<String> {
        let (_, bets) = self.snapshot(arguments)?;
        Ok(json!({
            "success": true,
            "stats": compute_number_bet_stats(&bets)
        })
        .to_string())
    }

    pub async fn zodiac_stats(&self, arguments: &Arguments) -> Result<String> {
        let (draws, bets) = self.snapshot(arguments)?;
        Ok(json!({
            "success": true,
            "stats": compute_zodiac_stats(&bets, &draws)
        })
        .to_string())
    }

    pub async fn color_stats(&self, arguments: &Arguments) -> Result<String> {
        let (draws, bets) = self.snapshot(arguments)?;
        Ok(json!({
            "success": true,
            "stats": compute_color_stats(&bets, &draws)
        })
        .to_string())
    }

    pub async fn trend(&self, arguments: &Arguments) -> Result<String> {
        let (draws, bets) = self.snapshot(arguments)?;
        Ok(json!({
            "success": true,
            "trend": compute_trend(&bets, &draws)
        })
        .to_string())
    }

    pub async fn period_stats(&self, arguments: &Arguments) -> Result<String> {
        let (draws, bets) = self.snapshot(arguments)?;
        Ok(json!({
            "success": true,
            "stats": compute_period_stats(&bets, &draws)
        })
        .to_string())
    }

    pub async fn heatmap(&self, arguments: &Arguments) -> Result<String> {
        let (mut draws, _) = self.snapshot(arguments)?;
        draws.sort_by_key(|d| d.open_time);
        let window = optional_i64(arguments, "window", 20).max(0) as usize;
        let rows: Vec<Vec<u32>> = generate_heatmap(&draws, window)
            .into_iter()
            .map(|row| row.to_vec())
            .collect();

        Ok(json!({
            "success": true,
            "window": window,
            "rows": rows
        })
        .to_string())
    }

    pub async fn number_attributes(&self, arguments: &Arguments) -> Result<String> {
        let number = arguments
            .get("number")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("Missing number parameter"))?;
        let attributes = u8::try_from(number).ok().and_then(attributes_of);

        Ok(json!({
            "success": attributes.is_some(),
            "attributes": attributes
        })
        .to_string())
    }
}

pub struct RemoteUseCase {
    connection: Arc<rusqlite::Connection>,
    config: Config,
}

impl RemoteUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>, config: Config) -> Self {
        Self { connection, config }
    }

    pub async fn fetch_history(&self, arguments: &Arguments) -> Result<String> {
        let years_json = arguments
            .get("years")
            .ok_or_else(|| anyhow!("Missing years parameter"))?;
        let years: Vec<String> = match years_json {
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(anyhow!("invalid year {}", other)),
                })
                .collect::<Result<_>>()?,
            other => return Err(anyhow!("years must be an array, got {}", other)),
        };

        let saved = fetch_and_save_history(&self.connection, &self.config, &years).await?;

        Ok(json!({
            "success": true,
            "saved_count": saved.len(),
            "periods": saved.iter().map(|d| d.period.as_str()).collect::<Vec<_>>()
        })
        .to_string())
    }

    pub async fn fetch_latest(&self, arguments: &Arguments) -> Result<String> {
        let draw = if optional_bool(arguments, "live", false) {
            fetch_live(&self.config).await?
        } else {
            fetch_latest(&self.config).await?
        };
        let saved = match &draw {
            Some(draw) if optional_bool(arguments, "save", true) => save_draw(&self.connection, draw)?,
            _ => false,
        };

        Ok(json!({
            "success": true,
            "draw": draw,
            "saved": saved
        })
        .to_string())
    }
}
