use std::sync::Arc;

use incubator_db::{Database, DbError};
use incubator_types::models::Device;
use tracing::{error, info, warn};

use crate::credential::{Credential, GeneratedPassword, hash_password};
use crate::error::{AuthError, Result};

/// Salt used to burn one hash when the username is unknown, so a miss
/// costs the same as a wrong password.
const DUMMY_SALT: &str = "00000000000000000000000000000000";

/// Registers users, verifies logins and resets passwords against shared storage.
#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Database>,
}

impl CredentialStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn register(&self, username: &str, password: &str) -> Result<i64> {
        self.register_with_devices(username, password, &[])
    }

    /// Create a user and its devices in one transaction.
    pub fn register_with_devices(
        &self,
        username: &str,
        password: &str,
        serial_numbers: &[String],
    ) -> Result<i64> {
        require("username", username)?;
        require("password", password)?;
        for serial in serial_numbers {
            require("serial_number", serial)?;
        }

        let credential = Credential::derive(password);
        match self
            .db
            .create_user_with_devices(username, &credential.encode(), serial_numbers)
        {
            Ok(user_id) => {
                info!("Registered user {} with {} devices", username, serial_numbers.len());
                Ok(user_id)
            }
            Err(e) => Err(registration_error(username, e)),
        }
    }

    /// Check a password. An unknown user is `Ok(false)`, not an error.
    pub fn login(&self, username: &str, password: &str) -> Result<bool> {
        let Some(user) = self.db.get_user_by_username(username).map_err(storage_fault)? else {
            std::hint::black_box(hash_password(password, DUMMY_SALT));
            warn!("Login failed: unknown user");
            return Ok(false);
        };

        let credential = Credential::parse(&user.credential)
            .inspect_err(|_| error!("Stored credential for user id {} is malformed", user.id))?;

        if credential.verify(password) {
            info!("Login successful for {}", username);
            Ok(true)
        } else {
            warn!("Login failed: bad password for {}", username);
            Ok(false)
        }
    }

    /// Replace a user's password with a generated one under a new salt.
    pub fn reset_password(&self, username: &str) -> Result<GeneratedPassword> {
        let password = GeneratedPassword::generate();
        let credential = Credential::derive(password.as_str());

        let updated = self
            .db
            .update_credential(username, &credential.encode())
            .map_err(storage_fault)?;
        if !updated {
            return Err(AuthError::UserNotFound);
        }

        info!("Password reset for {}", username);
        Ok(password)
    }

    pub fn add_device(&self, username: &str, serial_number: &str) -> Result<Device> {
        require("serial_number", serial_number)?;
        let user = self
            .db
            .get_user_by_username(username)
            .map_err(storage_fault)?
            .ok_or(AuthError::UserNotFound)?;

        match self.db.add_device(user.id, serial_number) {
            Ok(id) => Ok(Device {
                id,
                user_id: user.id,
                serial_number: serial_number.to_string(),
            }),
            Err(DbError::UniqueViolation { .. }) => {
                warn!("Serial number {} already registered", serial_number);
                Err(AuthError::DuplicateSerialNumber)
            }
            Err(e) => Err(storage_fault(e)),
        }
    }

    pub fn devices(&self, username: &str) -> Result<Vec<Device>> {
        let user = self
            .db
            .get_user_by_username(username)
            .map_err(storage_fault)?
            .ok_or(AuthError::UserNotFound)?;

        let rows = self.db.devices_for_user(user.id).map_err(storage_fault)?;
        Ok(rows.into_iter().map(Device::from).collect())
    }
}

fn registration_error(username: &str, err: DbError) -> AuthError {
    match err {
        DbError::UniqueViolation { column } if column == "users.username" => {
            warn!("Registration rejected: username {} already exists", username);
            AuthError::DuplicateUsername
        }
        DbError::UniqueViolation { column } if column == "devices.serial_number" => {
            warn!("Registration rejected: duplicate serial number for {}", username);
            AuthError::DuplicateSerialNumber
        }
        other => storage_fault(other),
    }
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AuthError::MissingField(field));
    }
    Ok(())
}

fn storage_fault(err: DbError) -> AuthError {
    if err.is_transient() {
        warn!("Storage contention: {}", err);
    } else {
        error!("Storage fault: {}", err);
    }
    AuthError::Storage(err)
}
