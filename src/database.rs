use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::types::{Bet, Draw, EXPORT_VERSION, ExportData, PlayType, Selection, Setting};
use crate::utils::next_period;

const DRAW_COLUMNS: &str = "id, period, open_time, n1, n2, n3, n4, n5, n6, sp, created_at";
const BET_COLUMNS: &str = "id, draw_id, play_type, selection, stake, odds, result, created_at";

pub fn ensure_parent_dir(database_path: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
            debug!("📁 Ensured directory {}", parent.display());
        }
    }
    Ok(())
}

pub fn create_database(database_path: &str) -> Result<Connection> {
    ensure_parent_dir(database_path).map_err(|e| {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some(format!("Failed to create database directory: {}", e)),
        )
    })?;

    let conn = Connection::open(database_path)?;
    create_database_with_connection(&conn)?;
    Ok(conn)
}

pub fn create_database_with_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS draws (
            id TEXT PRIMARY KEY,
            period TEXT NOT NULL,
            open_time TEXT NOT NULL,
            n1 INTEGER NOT NULL,
            n2 INTEGER NOT NULL,
            n3 INTEGER NOT NULL,
            n4 INTEGER NOT NULL,
            n5 INTEGER NOT NULL,
            n6 INTEGER NOT NULL,
            sp INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_draws_period ON draws (period);
        CREATE INDEX IF NOT EXISTS idx_draws_open_time ON draws (open_time);

        CREATE TABLE IF NOT EXISTS bets (
            id TEXT PRIMARY KEY,
            draw_id TEXT NOT NULL,
            play_type TEXT NOT NULL,
            selection TEXT NOT NULL,
            stake REAL NOT NULL,
            odds REAL NOT NULL,
            result REAL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bets_draw_id ON bets (draw_id);
        CREATE INDEX IF NOT EXISTS idx_bets_play_type ON bets (play_type);
        CREATE INDEX IF NOT EXISTS idx_bets_created_at ON bets (created_at);

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn row_to_draw(row: &Row) -> Result<Draw> {
    let draw = Draw {
        id: row.get(0)?,
        period: row.get(1)?,
        open_time: row.get(2)?,
        numbers: [
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        ],
        special: row.get(9)?,
        created_at: row.get(10)?,
    };
    draw.validate().map_err(|e| conversion_error(3, e))?;
    Ok(draw)
}

fn row_to_bet(row: &Row) -> Result<Bet> {
    let play_type: PlayType = row
        .get::<_, String>(2)?
        .parse()
        .map_err(|e| conversion_error(2, e))?;
    let payload: Value =
        serde_json::from_str(&row.get::<_, String>(3)?).map_err(|e| conversion_error(3, e))?;
    let selection = Selection::coerce(play_type, &payload).map_err(|e| conversion_error(3, e))?;

    Ok(Bet {
        id: row.get(0)?,
        draw_id: row.get(1)?,
        selection,
        stake: row.get(4)?,
        odds: row.get(5)?,
        result: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn query_draws<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(sql)?;
    let draw_iter = stmt.query_map(params, row_to_draw)?;

    let mut draws = Vec::new();
    for draw in draw_iter {
        draws.push(draw?);
    }
    Ok(draws)
}

fn query_bets<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Bet>> {
    let mut stmt = conn.prepare(sql)?;
    let bet_iter = stmt.query_map(params, row_to_bet)?;

    let mut bets = Vec::new();
    for bet in bet_iter {
        bets.push(bet?);
    }
    Ok(bets)
}

fn insert_draw(conn: &Connection, verb: &str, draw: &Draw) -> Result<usize> {
    let [n1, n2, n3, n4, n5, n6] = draw.numbers;
    conn.execute(
        &format!("{} INTO draws ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)", verb, DRAW_COLUMNS),
        params![
            draw.id,
            draw.period,
            draw.open_time,
            n1,
            n2,
            n3,
            n4,
            n5,
            n6,
            draw.special,
            draw.created_at
        ],
    )
}

fn insert_bet(conn: &Connection, verb: &str, bet: &Bet) -> Result<usize> {
    conn.execute(
        &format!("{} INTO bets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", verb, BET_COLUMNS),
        params![
            bet.id,
            bet.draw_id,
            bet.play_type().as_str(),
            bet.selection.to_payload().to_string(),
            bet.stake,
            bet.odds,
            bet.result,
            bet.created_at
        ],
    )
}

pub fn add_draw(conn: &Connection, draw: &Draw) -> Result<()> {
    insert_draw(conn, "INSERT", draw)?;
    Ok(())
}

/// Inserts the draw unless one with the same id exists. Returns whether a row was added.
pub fn save_draw(conn: &Connection, draw: &Draw) -> Result<bool> {
    Ok(insert_draw(conn, "INSERT OR IGNORE", draw)? > 0)
}

pub fn save_multiple_draws(conn: &Connection, draws: &[Draw]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    for draw in draws {
        if save_draw(&tx, draw)? {
            inserted += 1;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

/// Most recent draws first.
pub fn get_draws(conn: &Connection, limit: i64) -> Result<Vec<Draw>> {
    query_draws(
        conn,
        &format!("SELECT {} FROM draws ORDER BY open_time DESC LIMIT ?1", DRAW_COLUMNS),
        [limit],
    )
}

pub fn get_all_draws(conn: &Connection) -> Result<Vec<Draw>> {
    query_draws(
        conn,
        &format!("SELECT {} FROM draws ORDER BY open_time DESC", DRAW_COLUMNS),
        [],
    )
}

pub fn get_draw_by_id(conn: &Connection, id: &str) -> Result<Option<Draw>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM draws WHERE id = ?1", DRAW_COLUMNS))?;
    stmt.query_row([id], row_to_draw).optional()
}

pub fn get_draw_by_period(conn: &Connection, period: &str) -> Result<Option<Draw>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM draws WHERE period = ?1 ORDER BY open_time DESC LIMIT 1",
        DRAW_COLUMNS
    ))?;
    stmt.query_row([period], row_to_draw).optional()
}

pub fn update_draw(conn: &Connection, draw: &Draw) -> Result<bool> {
    let [n1, n2, n3, n4, n5, n6] = draw.numbers;
    let changed = conn.execute(
        "UPDATE draws SET period = ?2, open_time = ?3, n1 = ?4, n2 = ?5, n3 = ?6,
                n4 = ?7, n5 = ?8, n6 = ?9, sp = ?10
         WHERE id = ?1",
        params![draw.id, draw.period, draw.open_time, n1, n2, n3, n4, n5, n6, draw.special],
    )?;
    Ok(changed > 0)
}

/// Deletes a draw together with every bet placed on it.
pub fn delete_draw(conn: &Connection, id: &str) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let bets_removed = tx.execute("DELETE FROM bets WHERE draw_id = ?1", [id])?;
    let draws_removed = tx.execute("DELETE FROM draws WHERE id = ?1", [id])?;
    tx.commit()?;

    info!("🗑️ Deleted draw {} ({} bets removed)", id, bets_removed);
    Ok(draws_removed > 0)
}

pub fn draw_exists_for_period(conn: &Connection, period: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM draws WHERE period = ?1")?;
    let count: i64 = stmt.query_row([period], |row| row.get(0))?;
    Ok(count > 0)
}

/// Splits `draws` into those not stored yet and the periods already present.
pub fn check_existing_periods(conn: &Connection, draws: Vec<Draw>) -> Result<(Vec<Draw>, Vec<String>)> {
    let mut draws_to_save = Vec::new();
    let mut existing_periods = Vec::new();

    for draw in draws {
        if draw_exists_for_period(conn, &draw.period)? {
            existing_periods.push(draw.period);
        } else {
            draws_to_save.push(draw);
        }
    }

    Ok((draws_to_save, existing_periods))
}

pub fn get_latest_draw(conn: &Connection) -> Result<Option<Draw>> {
    Ok(get_draws(conn, 1)?.into_iter().next())
}

pub fn get_next_period(conn: &Connection, current_year: i32) -> Result<String> {
    let latest = get_latest_draw(conn)?;
    Ok(next_period(latest.as_ref().map(|d| d.period.as_str()), current_year))
}

pub fn add_bet(conn: &Connection, bet: &Bet) -> Result<()> {
    insert_bet(conn, "INSERT", bet)?;
    Ok(())
}

/// Most recently created bets first.
pub fn get_bets(conn: &Connection, limit: i64) -> Result<Vec<Bet>> {
    query_bets(
        conn,
        &format!("SELECT {} FROM bets ORDER BY created_at DESC LIMIT ?1", BET_COLUMNS),
        [limit],
    )
}

pub fn get_all_bets(conn: &Connection) -> Result<Vec<Bet>> {
    query_bets(
        conn,
        &format!("SELECT {} FROM bets ORDER BY created_at DESC", BET_COLUMNS),
        [],
    )
}

pub fn get_bet(conn: &Connection, id: &str) -> Result<Option<Bet>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM bets WHERE id = ?1", BET_COLUMNS))?;
    stmt.query_row([id], row_to_bet).optional()
}

pub fn get_bets_by_draw(conn: &Connection, draw_id: &str) -> Result<Vec<Bet>> {
    query_bets(
        conn,
        &format!("SELECT {} FROM bets WHERE draw_id = ?1 ORDER BY created_at", BET_COLUMNS),
        [draw_id],
    )
}

pub fn get_bets_by_play_type(conn: &Connection, play_type: PlayType) -> Result<Vec<Bet>> {
    query_bets(
        conn,
        &format!("SELECT {} FROM bets WHERE play_type = ?1 ORDER BY created_at DESC", BET_COLUMNS),
        [play_type.as_str()],
    )
}

pub fn update_bet(conn: &Connection, bet: &Bet) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE bets SET draw_id = ?2, play_type = ?3, selection = ?4, stake = ?5, odds = ?6, result = ?7
         WHERE id = ?1",
        params![
            bet.id,
            bet.draw_id,
            bet.play_type().as_str(),
            bet.selection.to_payload().to_string(),
            bet.stake,
            bet.odds,
            bet.result
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete_bet(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM bets WHERE id = ?1", [id])? > 0)
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
    let raw: Option<String> = stmt.query_row([key], |row| row.get(0)).optional()?;
    raw.map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_error(0, e)))
        .transpose()
}

pub fn set_setting(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value.to_string()],
    )?;
    Ok(())
}

pub fn get_all_settings(conn: &Connection) -> Result<Vec<Setting>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
    let setting_iter = stmt.query_map([], |row| {
        let raw: String = row.get(1)?;
        Ok(Setting {
            key: row.get(0)?,
            value: serde_json::from_str(&raw).map_err(|e| conversion_error(1, e))?,
        })
    })?;

    let mut settings = Vec::new();
    for setting in setting_iter {
        settings.push(setting?);
    }
    Ok(settings)
}

pub fn export_all(conn: &Connection) -> Result<ExportData> {
    Ok(ExportData {
        draws: get_all_draws(conn)?,
        bets: get_all_bets(conn)?,
        settings: get_all_settings(conn)?,
        version: EXPORT_VERSION.to_string(),
        export_time: Utc::now(),
    })
}

/// Replaces every draw, bet and setting with the contents of `data`.
pub fn import_all(conn: &Connection, data: &ExportData) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("DELETE FROM draws; DELETE FROM bets; DELETE FROM settings;")?;
    for draw in &data.draws {
        insert_draw(&tx, "INSERT", draw)?;
    }
    for bet in &data.bets {
        insert_bet(&tx, "INSERT", bet)?;
    }
    for setting in &data.settings {
        set_setting(&tx, &setting.key, &setting.value)?;
    }
    tx.commit()?;

    info!(
        "📥 Imported backup {}: {} draws, {} bets, {} settings",
        data.version,
        data.draws.len(),
        data.bets.len(),
        data.settings.len()
    );
    Ok(())
}

/// Adds records from `data` that are not stored yet; existing ids are kept.
/// Returns the number of draws and bets added.
pub fn merge_import(conn: &Connection, data: &ExportData) -> Result<(usize, usize)> {
    let tx = conn.unchecked_transaction()?;
    let mut draws_added = 0;
    for draw in &data.draws {
        draws_added += insert_draw(&tx, "INSERT OR IGNORE", draw)?;
    }
    let mut bets_added = 0;
    for bet in &data.bets {
        bets_added += insert_bet(&tx, "INSERT OR IGNORE", bet)?;
    }
    for setting in &data.settings {
        set_setting(&tx, &setting.key, &setting.value)?;
    }
    tx.commit()?;
    Ok((draws_added, bets_added))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::Zodiac;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_database_with_connection(&conn).unwrap();
        conn
    }

    fn test_draw(id: &str, period: &str, day: i64) -> Draw {
        let open_time = Utc.with_ymd_and_hms(2025, 3, 1, 21, 30, 0).unwrap() + Duration::days(day);
        Draw::with_id(id, period, open_time, [1, 2, 3, 4, 5, 6], 7).unwrap()
    }

    #[test]
    fn test_draw_round_trip_and_ordering() {
        let conn = open();
        add_draw(&conn, &test_draw("a", "2025-001", 0)).unwrap();
        add_draw(&conn, &test_draw("b", "2025-002", 1)).unwrap();

        let draws = get_draws(&conn, 10).unwrap();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].id, "b");
        assert_eq!(draws[1].numbers, [1, 2, 3, 4, 5, 6]);
        assert_eq!(draws[1].special, 7);
        assert_eq!(draws[1].open_time, test_draw("a", "2025-001", 0).open_time);

        assert_eq!(get_draw_by_period(&conn, "2025-001").unwrap().unwrap().id, "a");
        assert!(get_draw_by_id(&conn, "zzz").unwrap().is_none());
        assert_eq!(get_latest_draw(&conn).unwrap().unwrap().period, "2025-002");
    }

    #[test]
    fn test_duplicate_draw_ignored_on_save() {
        let conn = open();
        assert!(save_draw(&conn, &test_draw("a", "2025-001", 0)).unwrap());
        assert!(!save_draw(&conn, &test_draw("a", "2025-001", 0)).unwrap());
        assert!(add_draw(&conn, &test_draw("a", "2025-001", 0)).is_err());

        let inserted = save_multiple_draws(
            &conn,
            &[test_draw("a", "2025-001", 0), test_draw("b", "2025-002", 1)],
        )
        .unwrap();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn test_update_draw() {
        let conn = open();
        let mut draw = test_draw("a", "2025-001", 0);
        add_draw(&conn, &draw).unwrap();

        draw.special = 49;
        assert!(update_draw(&conn, &draw).unwrap());
        assert_eq!(get_draw_by_id(&conn, "a").unwrap().unwrap().special, 49);
    }

    #[test]
    fn test_delete_draw_cascades_to_bets() {
        let conn = open();
        add_draw(&conn, &test_draw("a", "2025-001", 0)).unwrap();
        add_draw(&conn, &test_draw("b", "2025-002", 1)).unwrap();
        let kept = Bet::new("b", Selection::Special(vec![8]), 10.0, 47.0).unwrap();
        add_bet(&conn, &Bet::new("a", Selection::Special(vec![8]), 10.0, 47.0).unwrap()).unwrap();
        add_bet(&conn, &kept).unwrap();

        assert!(delete_draw(&conn, "a").unwrap());
        assert!(get_bets_by_draw(&conn, "a").unwrap().is_empty());
        assert_eq!(get_all_bets(&conn).unwrap(), vec![kept]);
        assert!(!delete_draw(&conn, "a").unwrap());
    }

    #[test]
    fn test_bet_round_trip_and_queries() {
        let conn = open();
        let zodiac = Bet::new("a", Selection::Zodiac(vec![Zodiac::Rat, Zodiac::Ox]), 120.0, 1.9).unwrap();
        let special = Bet::new("a", Selection::Special(vec![8]), 10.0, 47.0)
            .unwrap()
            .with_result(-10.0);
        add_bet(&conn, &zodiac).unwrap();
        add_bet(&conn, &special).unwrap();

        assert_eq!(get_bet(&conn, &zodiac.id).unwrap().unwrap(), zodiac);
        assert_eq!(get_bets_by_play_type(&conn, PlayType::Special).unwrap(), vec![special.clone()]);
        assert_eq!(get_bets(&conn, 1).unwrap().len(), 1);

        let mut settled = zodiac.clone();
        settled.result = Some(108.0);
        assert!(update_bet(&conn, &settled).unwrap());
        assert_eq!(get_bet(&conn, &zodiac.id).unwrap().unwrap().result, Some(108.0));

        assert!(delete_bet(&conn, &special.id).unwrap());
        assert!(!delete_bet(&conn, &special.id).unwrap());
    }

    #[test]
    fn test_corrupt_selection_surfaces_as_conversion_error() {
        let conn = open();
        conn.execute(
            "INSERT INTO bets (id, draw_id, play_type, selection, stake, odds, result, created_at)
             VALUES ('x', 'a', 'SHENG_XIAO', '[\"Unicorn\"]', 1.0, 1.0, NULL, '2025-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        assert!(matches!(
            get_bet(&conn, "x"),
            Err(rusqlite::Error::FromSqlConversionFailure(3, _, _))
        ));
    }

    #[test]
    fn test_settings() {
        let conn = open();
        assert!(get_setting(&conn, "theme").unwrap().is_none());
        set_setting(&conn, "theme", &json!("dark")).unwrap();
        set_setting(&conn, "theme", &json!({"mode": "light"})).unwrap();
        assert_eq!(get_setting(&conn, "theme").unwrap(), Some(json!({"mode": "light"})));
    }

    #[test]
    fn test_next_period_from_store() {
        let conn = open();
        assert_eq!(get_next_period(&conn, 2025).unwrap(), "2025-001");
        add_draw(&conn, &test_draw("a", "2025-041", 0)).unwrap();
        assert_eq!(get_next_period(&conn, 2025).unwrap(), "2025-042");
    }

    #[test]
    fn test_check_existing_periods() {
        let conn = open();
        add_draw(&conn, &test_draw("a", "2025-001", 0)).unwrap();
        let (to_save, existing) = check_existing_periods(
            &conn,
            vec![test_draw("a2", "2025-001", 0), test_draw("b", "2025-002", 1)],
        )
        .unwrap();
        assert_eq!(existing, vec!["2025-001".to_string()]);
        assert_eq!(to_save.len(), 1);
        assert_eq!(to_save[0].id, "b");
    }

    #[test]
    fn test_export_then_import_replaces_everything() {
        let source = open();
        add_draw(&source, &test_draw("a", "2025-001", 0)).unwrap();
        add_bet(&source, &Bet::new("a", Selection::Color(vec![crate::mappings::Color::Red]), 5.0, 2.8).unwrap())
            .unwrap();
        set_setting(&source, "k", &json!(1)).unwrap();
        let backup = export_all(&source).unwrap();
        assert_eq!(backup.version, EXPORT_VERSION);

        let target = open();
        add_draw(&target, &test_draw("old", "2024-150", 0)).unwrap();
        import_all(&target, &backup).unwrap();

        let restored = export_all(&target).unwrap();
        assert_eq!(restored.draws, backup.draws);
        assert_eq!(restored.bets, backup.bets);
        assert_eq!(restored.settings, backup.settings);
    }

    #[test]
    fn test_merge_import_keeps_existing() {
        let conn = open();
        add_draw(&conn, &test_draw("a", "2025-001", 0)).unwrap();
        let data = ExportData {
            draws: vec![test_draw("a", "2025-001", 0), test_draw("b", "2025-002", 1)],
            bets: vec![],
            settings: vec![],
            version: EXPORT_VERSION.to_string(),
            export_time: Utc::now(),
        };
        assert_eq!(merge_import(&conn, &data).unwrap(), (1, 0));
        assert_eq!(get_all_draws(&conn).unwrap().len(), 2);
    }
}
