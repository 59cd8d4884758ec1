use super::schema::Database;
use super::types::{SettingError, StoreError};
use crate::crypto::{is_encrypted, Cipher};

impl Database {
    // ========================================================================
    // Settings
    // ========================================================================

    /// Get a single setting by key, `None` when unset.
    ///
    /// Keys use a dotted convention: `fetch.deadline`, `sync.token`, etc.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT Value FROM Settings WHERE Key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a setting value (UPSERT), refreshing its timestamp.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO Settings (Key, Value, UpdatedAt)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(Key) DO UPDATE SET Value = excluded.Value, UpdatedAt = excluded.UpdatedAt
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All settings whose key starts with `prefix`, ordered by key.
    ///
    /// `prefix` is matched literally: `%` and `_` have no wildcard meaning.
    pub async fn settings_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT Key, Value FROM Settings WHERE substr(Key, 1, length(?1)) = ?1 ORDER BY Key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ========================================================================
    // Protected Settings
    // ========================================================================

    /// Encrypt `value` with `cipher` and store the envelope under `key`.
    ///
    /// An empty value is stored as empty.
    pub async fn set_protected_setting(
        &self,
        cipher: &Cipher,
        key: &str,
        value: &str,
    ) -> Result<(), SettingError> {
        let sealed = cipher.encrypt(value)?;
        self.set_setting(key, &sealed).await?;
        Ok(())
    }

    /// Read and decrypt the value under `key`.
    ///
    /// # Errors
    ///
    /// `CryptoError::DecryptionFailed` when the value was sealed on another
    /// machine or has been altered, `CryptoError::InvalidCiphertext` when it is
    /// not an envelope at all (e.g. legacy plaintext that was never migrated).
    pub async fn get_protected_setting(
        &self,
        cipher: &Cipher,
        key: &str,
    ) -> Result<Option<String>, SettingError> {
        match self.get_setting(key).await? {
            Some(sealed) => Ok(Some(cipher.decrypt(&sealed)?)),
            None => Ok(None),
        }
    }

    /// Re-store a legacy plaintext value under `key` as an envelope.
    ///
    /// Returns `true` if the value was migrated. Values that already look
    /// like envelopes, empty values and missing keys are left alone. Only
    /// call this for keys known to hold secrets: the envelope check is a
    /// shape heuristic and a plaintext that happens to be long valid base64
    /// is indistinguishable from an envelope.
    pub async fn migrate_protected_setting(
        &self,
        cipher: &Cipher,
        key: &str,
    ) -> Result<bool, SettingError> {
        let Some(value) = self.get_setting(key).await? else {
            return Ok(false);
        };
        if value.is_empty() || is_encrypted(&value) {
            return Ok(false);
        }

        let sealed = cipher.encrypt(&value)?;
        self.set_setting(key, &sealed).await?;
        tracing::info!(key = %key, "Migrated plaintext setting to encrypted storage");
        Ok(true)
    }
}
