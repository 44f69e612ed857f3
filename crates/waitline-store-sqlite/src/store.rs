//! [`SqliteStore`] — the SQLite implementation of
//! [`WaitlistStore`](waitline_core::store::WaitlistStore).

use std::path::Path;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use waitline_core::{
  attempt::{Attempt, NewAttempt},
  delivery::{DeliveryRecord, NewDeliveryRecord},
  identity::CanonicalEmail,
  store::WaitlistStore,
  submission::{
    DeliveryState, DeliveryUpdate, EnrollmentMeta, Submission, SubmissionPage,
    SubscriberStatus, WaitlistStats,
  },
  suppression::{BounceEvidence, SuppressionEntry, SuppressionReason},
};

use crate::{
  encode::{
    encode_delivery_record_status, encode_delivery_state, encode_dt,
    encode_subscriber_status, encode_suppression_reason, encode_uuid,
    RawSubmission, RawSuppression, SUBMISSION_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Waitline store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn find_raw(&self, normalized: String) -> Result<Option<RawSubmission>> {
    let select =
      format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE email_normalized = ?1");
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&select, rusqlite::params![normalized], RawSubmission::from_row)
            .optional()?,
        )
      })
      .await?;
    Ok(raw)
  }
}

// ─── WaitlistStore impl ──────────────────────────────────────────────────────

impl WaitlistStore for SqliteStore {
  type Error = Error;

  // ── Submissions ───────────────────────────────────────────────────────────

  async fn enroll(
    &self,
    identity: &CanonicalEmail,
    meta: EnrollmentMeta,
  ) -> Result<(Submission, bool)> {
    let now = Utc::now();
    let now_str = encode_dt(now);
    let candidate = RawSubmission {
      submission_id:      encode_uuid(Uuid::new_v4()),
      email:              identity.original.clone(),
      email_normalized:   identity.normalized.clone(),
      source:             meta.source,
      discovery_source:   meta.discovery_source,
      user_agent:         meta.user_agent,
      ip_address:         meta.ip_address,
      status:             encode_subscriber_status(SubscriberStatus::Active).to_owned(),
      confirmed_at:       Some(now_str.clone()),
      delivery_state:     encode_delivery_state(DeliveryState::None).to_owned(),
      delivery_provider:  None,
      first_message_id:   None,
      last_error_code:    None,
      last_error_message: None,
      last_delivery_at:   None,
      created_at:         now_str.clone(),
    };

    let select =
      format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE email_normalized = ?1");
    let insert = format!(
      "INSERT INTO submissions ({SUBMISSION_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
    );

    let (raw, is_new) = self
      .conn
      .call(move |conn| {
        // BEGIN IMMEDIATE serialises writers; combined with the UNIQUE
        // constraint this makes enroll an atomic get-or-create.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
          .query_row(
            &select,
            rusqlite::params![candidate.email_normalized],
            RawSubmission::from_row,
          )
          .optional()?;

        let result = match existing {
          Some(mut row) => {
            if row.confirmed_at.is_none() {
              tx.execute(
                "UPDATE submissions SET confirmed_at = ?1 WHERE submission_id = ?2",
                rusqlite::params![now_str, row.submission_id],
              )?;
              row.confirmed_at = Some(now_str.clone());
            }
            (row, false)
          }
          None => {
            let inserted = tx.execute(&insert, rusqlite::params![
              candidate.submission_id,
              candidate.email,
              candidate.email_normalized,
              candidate.source,
              candidate.discovery_source,
              candidate.user_agent,
              candidate.ip_address,
              candidate.status,
              candidate.confirmed_at,
              candidate.delivery_state,
              candidate.delivery_provider,
              candidate.first_message_id,
              candidate.last_error_code,
              candidate.last_error_message,
              candidate.last_delivery_at,
              candidate.created_at,
            ]);
            match inserted {
              Ok(_) => (candidate, true),
              Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
              {
                // Another writer (e.g. another process sharing the file)
                // committed the row first; fall back to its copy.
                let row = tx.query_row(
                  &select,
                  rusqlite::params![candidate.email_normalized],
                  RawSubmission::from_row,
                )?;
                (row, false)
              }
              Err(e) => return Err(e.into()),
            }
          }
        };

        tx.commit()?;
        Ok(result)
      })
      .await?;

    Ok((raw.into_submission()?, is_new))
  }

  async fn find_submission(&self, normalized: &str) -> Result<Option<Submission>> {
    let raw = self.find_raw(normalized.to_owned()).await?;
    raw.map(RawSubmission::into_submission).transpose()
  }

  async fn position(&self, submission_id: Uuid) -> Result<Option<u64>> {
    let id_str = encode_uuid(submission_id);

    let rank: Option<i64> = self
      .conn
      .call(move |conn| {
        let me: Option<(String, i64)> = conn
          .query_row(
            "SELECT created_at, rowid FROM submissions WHERE submission_id = ?1",
            rusqlite::params![id_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        let Some((created_at, rowid)) = me else {
          return Ok(None);
        };

        // Strict total order: creation time, ties broken by insertion
        // order (rowid).
        let count: i64 = conn.query_row(
          "SELECT COUNT(*) FROM submissions
           WHERE status = 'active'
             AND (created_at < ?1 OR (created_at = ?1 AND rowid <= ?2))",
          rusqlite::params![created_at, rowid],
          |row| row.get(0),
        )?;
        Ok(Some(count))
      })
      .await?;

    Ok(rank.map(|c| c as u64))
  }

  async fn total_active(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM submissions WHERE status = 'active'",
          [],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(count as u64)
  }

  async fn mark_delivery(&self, submission_id: Uuid, update: DeliveryUpdate) -> Result<()> {
    let id_str = encode_uuid(submission_id);
    let state = encode_delivery_state(update.state).to_owned();
    let at_str = encode_dt(Utc::now());
    let DeliveryUpdate { provider, message_id, error_code, error_message, .. } = update;

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE submissions SET
             delivery_state     = ?1,
             delivery_provider  = COALESCE(?2, delivery_provider),
             first_message_id   = COALESCE(first_message_id, ?3),
             last_error_code    = ?4,
             last_error_message = ?5,
             last_delivery_at   = ?6
           WHERE submission_id = ?7",
          rusqlite::params![
            state,
            provider,
            message_id,
            error_code,
            error_message,
            at_str,
            id_str,
          ],
        )?)
      })
      .await?;

    if affected == 0 {
      return Err(Error::SubmissionNotFound(submission_id));
    }
    Ok(())
  }

  async fn unsubscribe(&self, normalized: &str) -> Result<bool> {
    let normalized = normalized.to_owned();
    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE submissions SET status = 'unsubscribed' WHERE email_normalized = ?1",
          rusqlite::params![normalized],
        )?)
      })
      .await?;
    Ok(affected > 0)
  }

  // ── Attempt log ───────────────────────────────────────────────────────────

  async fn log_attempt(&self, attempt: NewAttempt) -> Result<Attempt> {
    let row = Attempt {
      attempt_id:   Uuid::new_v4(),
      ip_address:   attempt.ip_address,
      user_agent:   attempt.user_agent,
      email:        attempt.email,
      success:      attempt.success,
      reason:       attempt.reason,
      attempted_at: Utc::now(),
    };

    let id_str = encode_uuid(row.attempt_id);
    let at_str = encode_dt(row.attempted_at);
    let (ip, ua, email, success, reason) = (
      row.ip_address.clone(),
      row.user_agent.clone(),
      row.email.clone(),
      row.success,
      row.reason.clone(),
    );

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attempts (attempt_id, ip_address, user_agent, email, success, reason, attempted_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, ip, ua, email, success, reason, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(row)
  }

  async fn attempts_since(&self, ip: &str, since: DateTime<Utc>) -> Result<u64> {
    let ip = ip.to_owned();
    let since_str = encode_dt(since);
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM attempts WHERE ip_address = ?1 AND attempted_at >= ?2",
          rusqlite::params![ip, since_str],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(count as u64)
  }

  async fn prune_attempts(&self, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff_str = encode_dt(cutoff);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM attempts WHERE attempted_at < ?1",
          rusqlite::params![cutoff_str],
        )?)
      })
      .await?;
    Ok(deleted as u64)
  }

  // ── Suppression ledger ────────────────────────────────────────────────────

  async fn is_suppressed(&self, normalized: &str) -> Result<bool> {
    let normalized = normalized.to_owned();
    let hit: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM suppressions WHERE email_normalized = ?1",
              rusqlite::params![normalized],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(hit.is_some())
  }

  async fn record_bounce(
    &self,
    normalized: &str,
    provider: &str,
    evidence: BounceEvidence,
  ) -> Result<SuppressionEntry> {
    let normalized = normalized.to_owned();
    let provider = provider.to_owned();
    let evidence_json = serde_json::to_string(&evidence)?;
    let reason = encode_suppression_reason(SuppressionReason::HardBounce).to_owned();
    let now_str = encode_dt(Utc::now());

    let raw: RawSuppression = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO suppressions
             (email_normalized, reason, provider, evidence, created_at, last_seen_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)
           ON CONFLICT(email_normalized) DO UPDATE SET
             last_seen_at = excluded.last_seen_at,
             evidence     = excluded.evidence,
             provider     = excluded.provider",
          rusqlite::params![normalized, reason, provider, evidence_json, now_str],
        )?;
        Ok(conn.query_row(
          "SELECT email_normalized, reason, provider, evidence, created_at, last_seen_at
           FROM suppressions WHERE email_normalized = ?1",
          rusqlite::params![normalized],
          RawSuppression::from_row,
        )?)
      })
      .await?;

    raw.into_entry()
  }

  // ── Delivery audit ────────────────────────────────────────────────────────

  async fn record_delivery(&self, record: NewDeliveryRecord) -> Result<DeliveryRecord> {
    let row = DeliveryRecord {
      delivery_id:   Uuid::new_v4(),
      submission_id: record.submission_id,
      to_normalized: record.to_normalized,
      template_name: record.template_name,
      subject:       record.subject,
      provider:      record.provider,
      message_id:    record.message_id,
      status:        record.status,
      error_code:    record.error_code,
      error_message: record.error_message,
      sent_at:       record.sent_at,
      created_at:    Utc::now(),
    };

    let id_str = encode_uuid(row.delivery_id);
    let submission_id_str = row.submission_id.map(encode_uuid);
    let status_str = encode_delivery_record_status(row.status).to_owned();
    let sent_at_str = row.sent_at.map(encode_dt);
    let created_at_str = encode_dt(row.created_at);
    let (to, template, subject, provider, message_id, error_code, error_message) = (
      row.to_normalized.clone(),
      row.template_name.clone(),
      row.subject.clone(),
      row.provider.clone(),
      row.message_id.clone(),
      row.error_code.clone(),
      row.error_message.clone(),
    );

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO deliveries
             (delivery_id, submission_id, to_normalized, template_name, subject,
              provider, message_id, status, error_code, error_message, sent_at, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params![
            id_str,
            submission_id_str,
            to,
            template,
            subject,
            provider,
            message_id,
            status_str,
            error_code,
            error_message,
            sent_at_str,
            created_at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(row)
  }

  // ── Read views ────────────────────────────────────────────────────────────

  async fn list_submissions(&self, page: u64, page_size: u64) -> Result<SubmissionPage> {
    let page_size = page_size.max(1);
    let offset = page.saturating_sub(1).saturating_mul(page_size);
    let select = format!(
      "SELECT {SUBMISSION_COLUMNS} FROM submissions
       ORDER BY created_at DESC, rowid DESC
       LIMIT ?1 OFFSET ?2"
    );

    let (raws, total): (Vec<RawSubmission>, i64) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&select)?;
        let rows = stmt
          .query_map(
            rusqlite::params![page_size as i64, offset as i64],
            RawSubmission::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let total: i64 =
          conn.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
        Ok((rows, total))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawSubmission::into_submission)
      .collect::<Result<Vec<_>>>()?;
    let total = total as u64;

    Ok(SubmissionPage { items, total, page_count: total.div_ceil(page_size) })
  }

  async fn export_rows(&self) -> Result<Vec<Submission>> {
    let select = format!(
      "SELECT {SUBMISSION_COLUMNS} FROM submissions ORDER BY created_at DESC, rowid DESC"
    );

    let raws: Vec<RawSubmission> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&select)?;
        let rows = stmt
          .query_map([], RawSubmission::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubmission::into_submission).collect()
  }

  async fn stats(&self) -> Result<WaitlistStats> {
    let now = Utc::now();
    let today_str = encode_dt(now.date_naive().and_time(NaiveTime::MIN).and_utc());
    let week_str = encode_dt(now - Duration::days(7));

    let (total_active, today, this_week, attempts, successful): (i64, i64, i64, i64, i64) =
      self
        .conn
        .call(move |conn| {
          let total_active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE status = 'active'",
            [],
            |row| row.get(0),
          )?;
          let today: i64 = conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE status = 'active' AND created_at >= ?1",
            rusqlite::params![today_str],
            |row| row.get(0),
          )?;
          let this_week: i64 = conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE status = 'active' AND created_at >= ?1",
            rusqlite::params![week_str],
            |row| row.get(0),
          )?;
          let attempts: i64 =
            conn.query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))?;
          let successful: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE success = 1",
            [],
            |row| row.get(0),
          )?;
          Ok((total_active, today, this_week, attempts, successful))
        })
        .await?;

    Ok(WaitlistStats {
      total_active:        total_active as u64,
      today:               today as u64,
      this_week:           this_week as u64,
      attempts:            attempts as u64,
      successful_attempts: successful as u64,
      conversion_rate:     if attempts > 0 {
        successful as f64 / attempts as f64 * 100.0
      } else {
        0.0
      },
    })
  }
}
