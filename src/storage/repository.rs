use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{JournalEntry, LedgerCommand, Principal};

use super::MIGRATION_001_INITIAL;

/// Statistics for journal integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub entry_count: i64,
    pub has_sequence_gaps: bool,
    /// Entries addressing a wallet that had not been created before them
    pub invalid_wallet_refs: i64,
}

impl IntegrityStats {
    /// Human-readable description of each problem found in the journal.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.has_sequence_gaps {
            issues.push("journal sequence numbers are not contiguous from 1".to_string());
        }
        if self.invalid_wallet_refs > 0 {
            issues.push(format!(
                "{} journal entries address a wallet created after them",
                self.invalid_wallet_refs
            ));
        }
        issues
    }
}

/// Repository persisting the command journal that the in-memory ledger is replayed from.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Journal operations
    // ========================

    /// Append entries in a single database transaction.
    /// Fails without writing anything if any sequence number is already taken.
    pub async fn append_entries(&self, entries: &[JournalEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin journal transaction")?;

        for entry in entries {
            let command_json = serde_json::to_string(&entry.command)?;
            sqlx::query(
                r#"
                INSERT INTO journal (sequence, id, recorded_at, principal, command_type, wallet_id, command)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.sequence)
            .bind(entry.id.to_string())
            .bind(entry.recorded_at.to_rfc3339())
            .bind(entry.principal.as_str())
            .bind(entry.command.name())
            .bind(entry.command.wallet_id().map(|id| id as i64))
            .bind(&command_json)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to save journal entry {}", entry.sequence))?;
        }

        tx.commit()
            .await
            .context("Failed to commit journal entries")?;
        Ok(())
    }

    /// List all journal entries, ordered by sequence number.
    pub async fn list_entries(&self) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, recorded_at, principal, command
            FROM journal
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list journal entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// List journal entries that address one wallet.
    pub async fn list_entries_for_wallet(&self, wallet_id: usize) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, recorded_at, principal, command
            FROM journal
            WHERE wallet_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(wallet_id as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list journal entries for wallet")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    pub async fn count_entries(&self) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM journal")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count journal entries")?
            .get("count");
        Ok(count)
    }

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM journal
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let min_seq: Option<i64> = sequence_check.get("min_seq");
        let max_seq: Option<i64> = sequence_check.get("max_seq");
        let entry_count: i64 = sequence_check.get("count");

        // Sequences start at 1 and must be contiguous
        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => min != 1 || max != entry_count,
            _ => false,
        };

        // Wallet ids are assigned in creation order
        let invalid_wallet_refs: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM journal j
            WHERE j.wallet_id IS NOT NULL
              AND j.wallet_id >= (
                  SELECT COUNT(*) FROM journal c
                  WHERE c.command_type = 'create_wallet' AND c.sequence < j.sequence
              )
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            entry_count,
            has_sequence_gaps,
            invalid_wallet_refs,
        })
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<JournalEntry> {
        let id_str: String = row.get("id");
        let recorded_at_str: String = row.get("recorded_at");
        let principal: String = row.get("principal");
        let command_json: String = row.get("command");
        let command: LedgerCommand =
            serde_json::from_str(&command_json).context("Invalid journal command")?;

        Ok(JournalEntry {
            id: Uuid::parse_str(&id_str).context("Invalid journal entry ID")?,
            sequence: row.get("sequence"),
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .context("Invalid recorded_at timestamp")?
                .with_timezone(&Utc),
            principal: Principal::from(principal),
            command,
        })
    }
}
