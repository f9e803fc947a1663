//! Database row types. These map directly to SQLite rows and stay distinct
//! from the incubator-types records so the DB layer can change independently.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    /// `"<hash_hex>:<salt_hex>"`, decoded by incubator-auth.
    pub credential: String,
}

pub struct DeviceRow {
    pub id: i64,
    pub user_id: i64,
    pub serial_number: String,
}

impl From<DeviceRow> for incubator_types::models::Device {
    fn from(row: DeviceRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            serial_number: row.serial_number,
        }
    }
}
