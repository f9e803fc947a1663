use chrono::NaiveDateTime;
use rusqlite::Connection;
use rusqlite::types::Value;

use incubator_types::TIMESTAMP_FORMAT;
use incubator_types::models::{NewReading, Reading};

use crate::Database;
use crate::error::{DbError, Result};
use crate::models::{DeviceRow, UserRow};

/// Narrows a readings query. All bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    /// Hour-of-day window, e.g. `(8, 17)`.
    pub hours: Option<(u32, u32)>,
    /// Keep only the most recent `limit` rows.
    pub limit: Option<u32>,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, credential: &str) -> Result<i64> {
        self.create_user_with_devices(username, credential, &[])
    }

    /// Insert a user and its devices atomically. A duplicate username or
    /// serial number rolls the whole registration back.
    pub fn create_user_with_devices(
        &self,
        username: &str,
        credential: &str,
        serial_numbers: &[String],
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (username, credential) VALUES (?1, ?2)",
                (username, credential),
            )?;
            let user_id = tx.last_insert_rowid();
            for serial in serial_numbers {
                tx.execute(
                    "INSERT INTO devices (user_id, serial_number) VALUES (?1, ?2)",
                    (user_id, serial),
                )?;
            }
            tx.commit()?;
            Ok(user_id)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    /// Overwrite a user's credential. Returns false when no such user exists.
    pub fn update_credential(&self, username: &str, credential: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET credential = ?1 WHERE username = ?2",
                (credential, username),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Devices --

    pub fn add_device(&self, user_id: i64, serial_number: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO devices (user_id, serial_number) VALUES (?1, ?2)",
                (user_id, serial_number),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn devices_for_user(&self, user_id: i64) -> Result<Vec<DeviceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, serial_number FROM devices WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(DeviceRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        serial_number: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every registered serial number, read fresh on each call.
    pub fn list_serial_numbers(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT serial_number FROM devices ORDER BY id")?;
            let serials = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(serials)
        })
    }

    // -- Readings --

    pub fn insert_reading(&self, reading: &NewReading) -> Result<i64> {
        let timestamp = reading.timestamp.format(TIMESTAMP_FORMAT).to_string();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO readings (serial_number, timestamp, temperature, humidity)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    reading.serial_number,
                    timestamp,
                    reading.temperature,
                    reading.humidity
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Readings for a set of devices, oldest first.
    pub fn readings_for_serials(
        &self,
        serial_numbers: &[String],
        filter: &ReadingFilter,
    ) -> Result<Vec<Reading>> {
        if serial_numbers.is_empty() {
            return Ok(vec![]);
        }

        let placeholders = vec!["?"; serial_numbers.len()].join(", ");
        let mut sql = format!(
            "SELECT id, serial_number, timestamp, temperature, humidity FROM readings
             WHERE serial_number IN ({})",
            placeholders
        );
        let mut params: Vec<Value> = serial_numbers
            .iter()
            .map(|s| Value::Text(s.clone()))
            .collect();

        if let Some(from) = filter.from {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::Text(from.format(TIMESTAMP_FORMAT).to_string()));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND timestamp <= ?");
            params.push(Value::Text(to.format(TIMESTAMP_FORMAT).to_string()));
        }
        if let Some((start, end)) = filter.hours {
            sql.push_str(" AND CAST(strftime('%H', timestamp) AS INTEGER) BETWEEN ? AND ?");
            params.push(Value::Integer(start.into()));
            params.push(Value::Integer(end.into()));
        }
        if let Some(limit) = filter.limit {
            sql = format!(
                "SELECT * FROM ({} ORDER BY timestamp DESC, id DESC LIMIT ?)",
                sql
            );
            params.push(Value::Integer(limit.into()));
        }
        sql.push_str(" ORDER BY timestamp, id");

        let raw = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        raw.into_iter()
            .map(|(id, serial_number, ts, temperature, humidity)| {
                let timestamp = NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT)
                    .map_err(|_| DbError::InvalidTimestamp(ts))?;
                Ok(Reading {
                    id,
                    serial_number,
                    timestamp,
                    temperature,
                    humidity,
                })
            })
            .collect()
    }

    pub fn count_readings(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, username, credential FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                credential: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("incubator.db")).unwrap();
        (dir, db)
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn reading(serial: &str, ts: NaiveDateTime) -> NewReading {
        NewReading {
            serial_number: serial.to_string(),
            timestamp: ts,
            temperature: 36.8,
            humidity: 50.0,
        }
    }

    #[test]
    fn duplicate_username_is_a_unique_violation() {
        let (_dir, db) = open();
        db.create_user("alice", "aa:bb").unwrap();

        match db.create_user("alice", "cc:dd") {
            Err(DbError::UniqueViolation { column }) => assert_eq!(column, "users.username"),
            other => panic!("expected unique violation, got {:?}", other),
        }

        let user = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(user.credential, "aa:bb");
    }

    #[test]
    fn username_lookup_is_case_sensitive() {
        let (_dir, db) = open();
        db.create_user("alice", "aa:bb").unwrap();
        db.create_user("Alice", "cc:dd").unwrap();

        assert!(db.get_user_by_username("ALICE").unwrap().is_none());
        assert_eq!(db.get_user_by_username("Alice").unwrap().unwrap().credential, "cc:dd");
    }

    #[test]
    fn duplicate_serial_rolls_back_registration() {
        let (_dir, db) = open();
        db.create_user_with_devices("alice", "aa:bb", &["DEV-1".into()])
            .unwrap();

        let err = db
            .create_user_with_devices("bob", "cc:dd", &["DEV-2".into(), "DEV-1".into()])
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref column } if column == "devices.serial_number"));

        assert!(db.get_user_by_username("bob").unwrap().is_none());
        assert_eq!(db.list_serial_numbers().unwrap(), ["DEV-1"]);
    }

    #[test]
    fn update_credential_reports_missing_user() {
        let (_dir, db) = open();
        assert!(!db.update_credential("ghost", "aa:bb").unwrap());

        db.create_user("alice", "aa:bb").unwrap();
        assert!(db.update_credential("alice", "cc:dd").unwrap());
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().credential, "cc:dd");
    }

    #[test]
    fn devices_are_listed_per_user() {
        let (_dir, db) = open();
        let alice = db
            .create_user_with_devices("alice", "aa:bb", &["DEV-1".into()])
            .unwrap();
        let bob = db.create_user("bob", "cc:dd").unwrap();
        db.add_device(alice, "DEV-2").unwrap();
        db.add_device(bob, "DEV-3").unwrap();

        let serials: Vec<String> = db
            .devices_for_user(alice)
            .unwrap()
            .into_iter()
            .map(|d| d.serial_number)
            .collect();
        assert_eq!(serials, ["DEV-1", "DEV-2"]);
        assert_eq!(db.list_serial_numbers().unwrap().len(), 3);
    }

    #[test]
    fn readings_round_trip_through_text_timestamps() {
        let (_dir, db) = open();
        db.insert_reading(&reading("DEV-1", at(10, 0, 0))).unwrap();

        let rows = db
            .readings_for_serials(&["DEV-1".into()], &ReadingFilter::default())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, at(10, 0, 0));
        assert_eq!(rows[0].temperature, 36.8);
    }

    #[test]
    fn readings_filter_by_serial_range_and_hour() {
        let (_dir, db) = open();
        for (serial, ts) in [
            ("DEV-1", at(7, 59, 59)),
            ("DEV-1", at(8, 0, 0)),
            ("DEV-1", at(12, 30, 0)),
            ("DEV-1", at(18, 0, 0)),
            ("DEV-2", at(12, 0, 0)),
        ] {
            db.insert_reading(&reading(serial, ts)).unwrap();
        }
        let dev1 = ["DEV-1".to_string()];

        let hours = ReadingFilter {
            hours: Some((8, 17)),
            ..Default::default()
        };
        let rows = db.readings_for_serials(&dev1, &hours).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.serial_number == "DEV-1"));

        let range = ReadingFilter {
            from: Some(at(8, 0, 0)),
            to: Some(at(12, 30, 0)),
            ..Default::default()
        };
        let rows = db.readings_for_serials(&dev1, &range).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
            [at(8, 0, 0), at(12, 30, 0)]
        );
    }

    #[test]
    fn readings_limit_keeps_latest_in_ascending_order() {
        let (_dir, db) = open();
        for s in 0..5 {
            db.insert_reading(&reading("DEV-1", at(9, 0, s))).unwrap();
        }

        let filter = ReadingFilter {
            limit: Some(2),
            ..Default::default()
        };
        let rows = db.readings_for_serials(&["DEV-1".into()], &filter).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
            [at(9, 0, 3), at(9, 0, 4)]
        );
    }

    #[test]
    fn empty_serial_set_yields_nothing() {
        let (_dir, db) = open();
        db.insert_reading(&reading("DEV-1", at(9, 0, 0))).unwrap();
        assert!(db
            .readings_for_serials(&[], &ReadingFilter::default())
            .unwrap()
            .is_empty());
    }
}
