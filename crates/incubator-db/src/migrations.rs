use rusqlite::{Connection, TransactionBehavior};
use tracing::{info, warn};

use crate::error::{DbError, Result};

/// Column sets every entry point must agree on.
const EXPECTED_COLUMNS: &[(&str, &[&str])] = &[
    ("users", &["id", "username", "credential"]),
    ("devices", &["id", "user_id", "serial_number"]),
    (
        "readings",
        &["id", "serial_number", "timestamp", "temperature", "humidity"],
    ),
];

/// Constraints storage must enforce, per table: `(not_null, unique)` columns.
const REQUIRED_CONSTRAINTS: &[(&str, &[&str], &[&str])] = &[
    ("users", &["username", "credential"], &["username"]),
    ("devices", &["serial_number"], &["serial_number"]),
    (
        "readings",
        &["serial_number", "timestamp", "temperature", "humidity"],
        &[],
    ),
];

/// Readings table written by older dashboard builds.
const LEGACY_READINGS: &str = "incubator_readings";

/// Bring the schema up to date, then verify it.
///
/// Runs inside an IMMEDIATE transaction so two processes opening the same
/// file serialize on the migration instead of racing it.
pub fn run(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        tx.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        tx.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT UNIQUE NOT NULL,
                credential  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS devices (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER REFERENCES users(id),
                serial_number   TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS readings (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                serial_number   TEXT NOT NULL,
                timestamp       TEXT NOT NULL,
                temperature     REAL NOT NULL,
                humidity        REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_serial_ts
                ON readings(serial_number, timestamp);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (legacy readings import)");
        import_legacy_readings(&tx)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
    }

    for (table, expected) in EXPECTED_COLUMNS {
        verify_columns(&tx, table, expected)?;
    }
    for (table, not_null, unique) in REQUIRED_CONSTRAINTS {
        verify_constraints(&tx, table, not_null, unique)?;
    }

    tx.commit()?;
    info!("Database migrations complete");
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn verify_columns(conn: &Connection, table: &'static str, expected: &[&'static str]) -> Result<()> {
    let found = table_columns(conn, table)?;
    if found.iter().map(String::as_str).eq(expected.iter().copied()) {
        return Ok(());
    }
    Err(DbError::SchemaMismatch {
        table,
        expected: expected.to_vec(),
        found,
    })
}

/// Constraints present on `table`, rendered as `"<column> NOT NULL"` and
/// `"<column> UNIQUE"`. Only single-column, non-partial unique indexes count.
fn table_constraints(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut constraints = Vec::new();

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let not_null = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, bool>(3)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    constraints.extend(
        not_null
            .into_iter()
            .filter(|(_, notnull)| *notnull)
            .map(|(column, _)| format!("{} NOT NULL", column)),
    );

    let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table))?;
    let unique_indexes = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, bool>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (index, unique, partial) in unique_indexes {
        if !unique || partial {
            continue;
        }
        let mut stmt = conn.prepare(&format!("PRAGMA index_info(\"{}\")", index))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, Option<String>>(2))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if let [Some(column)] = columns.as_slice() {
            constraints.push(format!("{} UNIQUE", column));
        }
    }

    Ok(constraints)
}

fn verify_constraints(
    conn: &Connection,
    table: &'static str,
    not_null: &[&'static str],
    unique: &[&'static str],
) -> Result<()> {
    let found = table_constraints(conn, table)?;
    let expected: Vec<String> = not_null
        .iter()
        .map(|c| format!("{} NOT NULL", c))
        .chain(unique.iter().map(|c| format!("{} UNIQUE", c)))
        .collect();

    if expected.iter().all(|c| found.contains(c)) {
        return Ok(());
    }
    Err(DbError::MissingConstraints {
        table,
        expected,
        found,
    })
}

/// Copy rows from a serial-keyed legacy table. Any other shape (the
/// username-keyed generator table, the bare timestamp table) cannot be
/// attributed to a device and is left in place.
fn import_legacy_readings(conn: &Connection) -> Result<()> {
    let columns = table_columns(conn, LEGACY_READINGS)?;
    if columns.is_empty() {
        return Ok(());
    }

    let needed = ["serial_number", "timestamp", "temperature", "humidity"];
    if !needed.iter().all(|c| columns.iter().any(|found| found == c)) {
        warn!(
            "Legacy table {} has incompatible columns {:?}, not importing",
            LEGACY_READINGS, columns
        );
        return Ok(());
    }

    let copied = conn.execute(
        &format!(
            "INSERT INTO readings (serial_number, timestamp, temperature, humidity)
             SELECT serial_number, timestamp, temperature, humidity FROM {}
             WHERE serial_number IS NOT NULL AND timestamp IS NOT NULL
               AND temperature IS NOT NULL AND humidity IS NOT NULL
             ORDER BY rowid",
            LEGACY_READINGS
        ),
        [],
    )?;
    info!("Imported {} rows from {}", copied, LEGACY_READINGS);
    Ok(())
}
