//! Credential lifecycle and session gate for the incubator dashboard.
//!
//! Passwords are stored as `"<hex(sha256(password ‖ salt))>:<salt_hex>"`.
//! That is the scheme existing databases were written with; it is weaker
//! than a dedicated password-hashing function such as Argon2 and is kept
//! only for compatibility with stored credentials.

pub mod credential;
pub mod error;
pub mod session;
pub mod store;

pub use credential::{Credential, GeneratedPassword, hash_password};
pub use error::{AuthError, Result};
pub use session::{SessionGuard, SessionToken};
pub use store::CredentialStore;
