use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{check_existing_periods, merge_import, save_multiple_draws};
use crate::types::{Bet, Draw, EXPORT_VERSION, ExportData, RawHistoryResponse, RawLatestItem, Setting};
use crate::utils::{parse_open_code, parse_open_time};

const FETCH_PAUSE: Duration = Duration::from_secs(1);

/// Turns one feed item into a draw keyed by its period.
pub fn normalize_to_draw(item: &RawLatestItem) -> Result<Draw> {
    let (numbers, special) = parse_open_code(&item.open_code)?;
    let open_time = parse_open_time(&item.open_time)?;
    Draw::with_id(&item.expect, &item.expect, open_time, numbers, special)
        .with_context(|| format!("invalid draw for period {}", item.expect))
}

fn normalize_all(items: &[RawLatestItem]) -> Vec<Draw> {
    items
        .iter()
        .filter_map(|item| match normalize_to_draw(item) {
            Ok(draw) => Some(draw),
            Err(e) => {
                warn!("⚠ Skipping feed item {}: {:#}", item.expect, e);
                None
            }
        })
        .collect()
}

async fn get_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("fetch from {} failed: {}", url, status);
    }

    let body = response
        .json::<T>()
        .await
        .with_context(|| format!("unexpected response body from {}", url))?;
    Ok(body)
}

pub async fn fetch_history_by_year(config: &Config, year: &str) -> Result<Vec<Draw>> {
    let response: RawHistoryResponse = get_json(&config.history_url_for(year)).await?;
    if !response.result {
        warn!("History feed for {} returned no result: {}", year, response.message);
        return Ok(Vec::new());
    }
    Ok(normalize_all(&response.data))
}

async fn fetch_first(url: &str) -> Result<Option<Draw>> {
    let items: Vec<RawLatestItem> = get_json(url).await?;
    items.first().map(normalize_to_draw).transpose()
}

pub async fn fetch_latest(config: &Config) -> Result<Option<Draw>> {
    fetch_first(&config.latest_url).await
}

/// Draw currently being revealed ball by ball; same shape as the latest feed.
pub async fn fetch_live(config: &Config) -> Result<Option<Draw>> {
    fetch_first(&config.live_url).await
}

/// Fetches every requested year and stores the periods not already present.
pub async fn fetch_and_save_history(
    conn: &Connection,
    config: &Config,
    years: &[String],
) -> Result<Vec<Draw>> {
    let mut all_saved = Vec::new();

    for (i, year) in years.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(FETCH_PAUSE).await;
        }

        info!("Fetching draw history for {}", year);
        let draws = match fetch_history_by_year(config, year).await {
            Ok(draws) => draws,
            Err(e) => {
                warn!("✗ Error fetching history for {}: {:#}", year, e);
                continue;
            }
        };

        let (draws_to_save, existing_periods) = check_existing_periods(conn, draws)?;
        if !existing_periods.is_empty() {
            info!(
                "📋 {} periods of {} already stored",
                existing_periods.len(),
                year
            );
        }
        if draws_to_save.is_empty() {
            continue;
        }

        let saved = save_multiple_draws(conn, &draws_to_save)?;
        info!("✓ Saved {} new draws for {}", saved, year);
        all_saved.extend(draws_to_save);
    }

    Ok(all_saved)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub draws_added: usize,
    pub bets_added: usize,
    /// Records left out because they could not be represented.
    pub skipped: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBackup {
    #[serde(default)]
    draws: Vec<Value>,
    #[serde(default)]
    bets: Vec<Value>,
    #[serde(default)]
    settings: Vec<Setting>,
    #[serde(default)]
    version: String,
    #[serde(default = "Utc::now")]
    export_time: DateTime<Utc>,
}

const DRAW_NUMBER_FIELDS: [&str; 7] = ["n1", "n2", "n3", "n4", "n5", "n6", "sp"];

// Browser backups store all-zero draws for periods that were bet on before the draw.
fn is_placeholder_draw(value: &Value) -> bool {
    DRAW_NUMBER_FIELDS
        .iter()
        .all(|field| value.get(field).and_then(Value::as_u64) == Some(0))
}

fn record_id(value: &Value) -> &str {
    value.get("id").and_then(Value::as_str).unwrap_or("?")
}

/// Reads a backup bundle record by record.
///
/// Placeholder draws, draws with numbers outside 1-49 and bets whose play type
/// or selection cannot be read (`MIXED_BET`, `null` payloads) are left out
/// with a warning; the rest of the bundle is kept. Bets on a skipped draw are
/// kept and simply have no draw. Returns the bundle and the number of records
/// left out.
pub fn parse_backup(value: Value) -> Result<(ExportData, usize)> {
    let raw: RawBackup = serde_json::from_value(value).context("invalid backup bundle")?;
    let mut skipped = 0;

    let mut draws = Vec::with_capacity(raw.draws.len());
    for value in raw.draws {
        if is_placeholder_draw(&value) {
            warn!("⚠ Skipping placeholder draw {}", record_id(&value));
            skipped += 1;
            continue;
        }
        match serde_json::from_value::<Draw>(value.clone()) {
            Ok(draw) => draws.push(draw),
            Err(e) => {
                warn!("⚠ Skipping draw {}: {}", record_id(&value), e);
                skipped += 1;
            }
        }
    }

    let mut bets = Vec::with_capacity(raw.bets.len());
    for value in raw.bets {
        match serde_json::from_value::<Bet>(value.clone()) {
            Ok(bet) => bets.push(bet),
            Err(e) => {
                warn!("⚠ Skipping bet {}: {}", record_id(&value), e);
                skipped += 1;
            }
        }
    }

    let data = ExportData {
        draws,
        bets,
        settings: raw.settings,
        version: if raw.version.is_empty() {
            EXPORT_VERSION.to_string()
        } else {
            raw.version
        },
        export_time: raw.export_time,
    };
    Ok((data, skipped))
}

/// Accepts a backup bundle, a history feed response or a bare list of feed
/// items and merges it into the store.
pub fn parse_and_insert_raw_json(conn: &Connection, raw_json: &str) -> Result<ImportSummary> {
    let value: Value = serde_json::from_str(raw_json).context("invalid JSON")?;

    let (data, skipped) = if value.get("draws").is_some() {
        parse_backup(value)?
    } else {
        let items: Vec<RawLatestItem> = if value.is_array() {
            serde_json::from_value(value).context("invalid feed item list")?
        } else {
            let response: RawHistoryResponse =
                serde_json::from_value(value).context("invalid history response")?;
            if !response.result {
                bail!("history response has result=false: {}", response.message);
            }
            response.data
        };
        let draws = normalize_all(&items);
        let skipped = items.len() - draws.len();
        let data = ExportData {
            draws,
            bets: Vec::new(),
            settings: Vec::new(),
            version: EXPORT_VERSION.to_string(),
            export_time: Utc::now(),
        };
        (data, skipped)
    };

    let (draws_added, bets_added) = merge_import(conn, &data)?;
    Ok(ImportSummary {
        draws_added,
        bets_added,
        skipped,
    })
}

/// Imports every `*.json` file in `dir`, in file name order.
pub fn import_json_dir(conn: &Connection, dir: &Path) -> Result<ImportSummary> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut total = ImportSummary::default();
    for path in paths {
        info!("Reading file: {}", path.display());
        let raw = fs::read_to_string(&path)?;
        match parse_and_insert_raw_json(conn, &raw) {
            Ok(summary) => {
                info!(
                    "🎟️ {}: {} draws, {} bets added, {} skipped",
                    path.display(),
                    summary.draws_added,
                    summary.bets_added,
                    summary.skipped
                );
                total.draws_added += summary.draws_added;
                total.bets_added += summary.bets_added;
                total.skipped += summary.skipped;
            }
            Err(e) => warn!("✗ Skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_database_with_connection, get_all_bets, get_all_draws, get_draw_by_id};
    use chrono::TimeZone;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_database_with_connection(&conn).unwrap();
        conn
    }

    fn item(expect: &str, open_code: &str) -> RawLatestItem {
        RawLatestItem {
            expect: expect.to_string(),
            open_time: "2025-05-03 21:32:32".to_string(),
            kind: "1".to_string(),
            open_code: open_code.to_string(),
            wave: None,
            zodiac: None,
        }
    }

    #[test]
    fn test_normalize_to_draw() {
        let draw = normalize_to_draw(&item("2025123", "37,30,49,16,09,12,45")).unwrap();
        assert_eq!(draw.id, "2025123");
        assert_eq!(draw.period, "2025123");
        assert_eq!(draw.numbers, [37, 30, 49, 16, 9, 12]);
        assert_eq!(draw.special, 45);
        assert_eq!(draw.open_time, Utc.with_ymd_and_hms(2025, 5, 3, 13, 32, 32).unwrap());
    }

    #[test]
    fn test_normalize_rejects_bad_codes() {
        assert!(normalize_to_draw(&item("1", "1,2,3")).is_err());
        assert!(normalize_to_draw(&item("1", "1,2,3,4,5,6,50")).is_err());
    }

    #[test]
    fn test_import_history_response_skips_bad_items() {
        let conn = open();
        let raw = r#"{
            "result": true,
            "message": "ok",
            "code": 200,
            "timestamp": 0,
            "data": [
                {"expect": "2025001", "openTime": "2025-01-01 21:32:00", "type": "1", "openCode": "1,2,3,4,5,6,7"},
                {"expect": "2025002", "openTime": "2025-01-02 21:32:00", "type": "1", "openCode": "1,2,3"}
            ]
        }"#;
        let summary = parse_and_insert_raw_json(&conn, raw).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                draws_added: 1,
                bets_added: 0,
                skipped: 1
            }
        );
        assert!(get_draw_by_id(&conn, "2025001").unwrap().is_some());

        // importing again adds nothing
        let summary = parse_and_insert_raw_json(&conn, raw).unwrap();
        assert_eq!(summary.draws_added, 0);
    }

    #[test]
    fn test_import_item_list_and_backup() {
        let conn = open();
        let items = r#"[{"expect": "2025003", "openTime": "2025-01-03 21:32:00", "openCode": "8,9,10,11,12,13,14"}]"#;
        assert_eq!(parse_and_insert_raw_json(&conn, items).unwrap().draws_added, 1);

        let backup = r#"{
            "draws": [{"id": "x1", "period": "2025-004", "openTime": "2025-01-04T13:32:00Z",
                       "n1": 1, "n2": 2, "n3": 3, "n4": 4, "n5": 5, "n6": 6, "sp": 7,
                       "createdAt": "2025-01-04T13:40:00Z"}],
            "bets": [{"id": "b1", "drawId": "x1", "playType": "SE_BO", "numbers": {"color": "红"},
                      "stake": 10, "odds": 2.8, "createdAt": "2025-01-04T12:00:00Z"}],
            "settings": [],
            "version": "1.0.0",
            "exportTime": "2025-01-05T00:00:00Z"
        }"#;
        let summary = parse_and_insert_raw_json(&conn, backup).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                draws_added: 1,
                bets_added: 1,
                skipped: 0
            }
        );
        assert_eq!(get_all_draws(&conn).unwrap().len(), 2);
        assert_eq!(get_all_bets(&conn).unwrap()[0].draw_id, "x1");
    }

    #[test]
    fn test_import_backup_keeps_readable_records() {
        let conn = open();
        let backup = r#"{
            "draws": [
                {"id": "real", "period": "2025-020", "openTime": "2025-01-20T13:32:00Z",
                 "n1": 1, "n2": 2, "n3": 3, "n4": 4, "n5": 5, "n6": 6, "sp": 7},
                {"id": "pending", "period": "2025-021", "openTime": "2025-01-21T13:32:00Z",
                 "n1": 0, "n2": 0, "n3": 0, "n4": 0, "n5": 0, "n6": 0, "sp": 0}
            ],
            "bets": [
                {"id": "te", "drawId": "pending", "playType": "TE_MA", "numbers": [8],
                 "stake": 10, "odds": 47},
                {"id": "hds", "drawId": "real", "playType": "HE_DAN_SHUANG",
                 "numbers": {"heDanShuang": "单"}, "stake": 10, "odds": 1.9, "result": 9},
                {"id": "hdx", "drawId": "real", "playType": "HE_DA_XIAO", "numbers": "大",
                 "stake": 10, "odds": 1.9},
                {"id": "empty", "drawId": "real", "playType": "WEI_DA_XIAO", "numbers": null,
                 "stake": 10, "odds": 1.9},
                {"id": "mixed", "drawId": "real", "playType": "MIXED_BET", "numbers": [1, 2],
                 "stake": 10, "odds": 3}
            ],
            "settings": [{"key": "theme", "value": "dark"}],
            "version": "1.0.0",
            "exportTime": "2025-01-22T00:00:00Z"
        }"#;

        let summary = parse_and_insert_raw_json(&conn, backup).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                draws_added: 1,
                bets_added: 3,
                skipped: 3
            }
        );

        let draws = get_all_draws(&conn).unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].id, "real");

        let bets = get_all_bets(&conn).unwrap();
        let ids: Vec<&str> = bets.iter().map(|b| b.id.as_str()).collect();
        assert!(ids.contains(&"te"));
        assert!(ids.contains(&"hds"));
        assert!(ids.contains(&"hdx"));
        assert!(get_draw_by_id(&conn, "pending").unwrap().is_none());
    }

    #[test]
    fn test_parse_backup_fills_missing_header() {
        let (data, skipped) = parse_backup(serde_json::json!({"draws": []})).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(data.version, EXPORT_VERSION);
        assert!(data.bets.is_empty());
        assert!(parse_backup(serde_json::json!({"draws": 5})).is_err());
    }

    #[test]
    fn test_import_rejects_failed_response() {
        let conn = open();
        let raw = r#"{"result": false, "message": "no data", "data": []}"#;
        assert!(parse_and_insert_raw_json(&conn, raw).is_err());
        assert!(parse_and_insert_raw_json(&conn, "not json").is_err());
    }

    #[test]
    fn test_import_json_dir() {
        let conn = open();
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"[{"expect": "2025010", "openTime": "2025-01-10 21:32:00", "openCode": "1,2,3,4,5,6,7"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let summary = import_json_dir(&conn, dir.path()).unwrap();
        assert_eq!(summary.draws_added, 1);
    }
}
