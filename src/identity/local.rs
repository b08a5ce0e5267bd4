//! SQLite-backed identity provider for single-machine deployments.
//!
//! Accounts live in an `accounts` table with salted SHA-256 password
//! digests.  The device's current credential lives in a single-row
//! `credentials` table, so a sign-in survives process restarts until an
//! explicit sign-out invalidates it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::provider::{ChangeFeed, Identity, IdentityChanges, IdentityProvider};
use crate::errors::CatalogError;

/// Identity provider backed by a local SQLite database.
pub struct LocalIdentityProvider {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

fn unavailable(err: impl Into<anyhow::Error>) -> CatalogError {
    CatalogError::StoreUnavailable(err.into())
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_hex(len: usize) -> String {
    let bytes: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();
    hex::encode(bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl LocalIdentityProvider {
    /// Open (or create) the account database at `path`.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS accounts (
                uid            TEXT PRIMARY KEY,
                email          TEXT NOT NULL UNIQUE,
                display_name   TEXT NOT NULL DEFAULT '',
                password_salt  TEXT NOT NULL,
                password_hash  TEXT NOT NULL,
                created_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS credentials (
                slot       INTEGER PRIMARY KEY CHECK (slot = 1),
                uid        TEXT NOT NULL,
                token      TEXT NOT NULL,
                issued_at  TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        })
    }

    fn load_account(conn: &Connection, uid: &str) -> Result<Option<Identity>, CatalogError> {
        conn.query_row(
            "SELECT uid, display_name, email FROM accounts WHERE uid = ?1",
            params![uid],
            |row| {
                Ok(Identity {
                    uid: row.get(0)?,
                    display_name: row.get(1)?,
                    email: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(unavailable)
    }

    /// The identity holding the device credential, if any.
    fn current(&self) -> Result<Option<Identity>, CatalogError> {
        let conn = self.conn.lock().expect("mutex poisoned");
        let uid: Option<String> = conn
            .query_row("SELECT uid FROM credentials WHERE slot = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(unavailable)?;
        match uid {
            Some(uid) => Self::load_account(&conn, &uid),
            None => Ok(None),
        }
    }

    fn issue_credential(conn: &Connection, uid: &str) -> Result<(), CatalogError> {
        conn.execute(
            "INSERT OR REPLACE INTO credentials (slot, uid, token, issued_at)
             VALUES (1, ?1, ?2, ?3)",
            params![uid, random_hex(32), chrono::Utc::now().to_rfc3339()],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn sign_in_sync(&self, email: &str, password: &str) -> Result<Identity, CatalogError> {
        let conn = self.conn.lock().expect("mutex poisoned");
        let row: Option<(String, String, String, String, String)> = conn
            .query_row(
                "SELECT uid, display_name, email, password_salt, password_hash
                 FROM accounts WHERE email = ?1",
                params![normalize_email(email)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()
            .map_err(unavailable)?;

        let Some((uid, display_name, email, salt, expected)) = row else {
            return Err(CatalogError::Unauthenticated);
        };
        let actual = hash_password(&salt, password);
        if !bool::from(actual.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(CatalogError::Unauthenticated);
        }

        Self::issue_credential(&conn, &uid)?;
        Ok(Identity {
            uid,
            display_name,
            email,
        })
    }

    fn sign_up_sync(&self, email: &str, password: &str) -> Result<Identity, CatalogError> {
        let email = normalize_email(email);
        let conn = self.conn.lock().expect("mutex poisoned");
        let taken: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )
            .map_err(unavailable)?;
        if taken {
            return Err(CatalogError::validation(format!(
                "An account already exists for {email}"
            )));
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        let salt = random_hex(16);
        conn.execute(
            "INSERT INTO accounts (uid, email, display_name, password_salt, password_hash, created_at)
             VALUES (?1, ?2, '', ?3, ?4, ?5)",
            params![
                uid,
                email,
                salt,
                hash_password(&salt, password),
                chrono::Utc::now().to_rfc3339()
            ],
        )
        .map_err(unavailable)?;
        Self::issue_credential(&conn, &uid)?;

        Ok(Identity {
            uid,
            display_name: String::new(),
            email,
        })
    }

    fn sign_out_sync(&self) -> Result<(), CatalogError> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute("DELETE FROM credentials WHERE slot = 1", [])
            .map_err(unavailable)?;
        Ok(())
    }

    fn rename_sync(&self, identity: &Identity, name: &str) -> Result<(Identity, bool), CatalogError> {
        let conn = self.conn.lock().expect("mutex poisoned");
        let updated = conn
            .execute(
                "UPDATE accounts SET display_name = ?1 WHERE uid = ?2",
                params![name, identity.uid],
            )
            .map_err(unavailable)?;
        if updated == 0 {
            return Err(CatalogError::not_found(format!("account {}", identity.uid)));
        }
        let is_current: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM credentials WHERE slot = 1 AND uid = ?1)",
                params![identity.uid],
                |row| row.get(0),
            )
            .map_err(unavailable)?;
        let renamed = Identity {
            display_name: name.to_string(),
            ..identity.clone()
        };
        Ok((renamed, is_current))
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>> {
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            let identity = self.sign_in_sync(&email, &password)?;
            tracing::info!(uid = %identity.uid, "Signed in");
            self.feed.publish(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>> {
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            let identity = self.sign_up_sync(&email, &password)?;
            tracing::info!(uid = %identity.uid, "Account created");
            self.feed.publish(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_out(&self) -> Pin<Box<dyn Future<Output = Result<(), CatalogError>> + Send + '_>> {
        Box::pin(async move {
            self.sign_out_sync()?;
            self.feed.publish(None);
            Ok(())
        })
    }

    fn update_display_name(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>> {
        let identity = identity.clone();
        let name = name.to_string();
        Box::pin(async move {
            let (renamed, is_current) = self.rename_sync(&identity, &name)?;
            if is_current {
                self.feed.publish(Some(renamed.clone()));
            }
            Ok(renamed)
        })
    }

    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<IdentityChanges, CatalogError>> + Send + '_>> {
        Box::pin(async move {
            let initial = self.current();
            Ok(self.feed.register(initial))
        })
    }
}
