use anyhow::Result;
use rusqlite::Connection;

/// Opens the store at `database_url`, creating the file and tables when missing.
pub fn conn(database_url: &str) -> Result<Connection> {
    let conn = mark_stats::database::create_database(database_url)?;
    Ok(conn)
}

pub fn in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    mark_stats::database::create_database_with_connection(&conn)?;
    Ok(conn)
}
