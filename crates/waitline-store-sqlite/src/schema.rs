//! SQL schema for the Waitline SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS submissions (
    submission_id      TEXT PRIMARY KEY,
    email              TEXT NOT NULL,           -- as typed, trimmed
    email_normalized   TEXT NOT NULL UNIQUE,    -- canonical dedup key
    source             TEXT,
    discovery_source   TEXT,
    user_agent         TEXT,
    ip_address         TEXT,
    status             TEXT NOT NULL DEFAULT 'active',
    confirmed_at       TEXT,
    delivery_state     TEXT NOT NULL DEFAULT 'none',
    delivery_provider  TEXT,
    first_message_id   TEXT,
    last_error_code    TEXT,
    last_error_message TEXT,
    last_delivery_at   TEXT,
    created_at         TEXT NOT NULL            -- ISO 8601 UTC; server-assigned
);

-- One row per enrollment attempt. Never updated, never deduplicated;
-- exists for per-IP rate limiting and audit only.
CREATE TABLE IF NOT EXISTS attempts (
    attempt_id   TEXT PRIMARY KEY,
    ip_address   TEXT NOT NULL,
    user_agent   TEXT,
    email        TEXT,
    success      INTEGER NOT NULL,
    reason       TEXT,
    attempted_at TEXT NOT NULL
);

-- Permanent do-not-send ledger. Rows are upserted on repeat bounces and
-- never deleted by this store.
CREATE TABLE IF NOT EXISTS suppressions (
    email_normalized TEXT PRIMARY KEY,
    reason           TEXT NOT NULL,
    provider         TEXT,
    evidence         TEXT NOT NULL,    -- JSON diagnostic payload
    created_at       TEXT NOT NULL,
    last_seen_at     TEXT NOT NULL
);

-- Delivery audit trail, one row per send attempt. submission_id is NULL
-- for attempts short-circuited by the suppression ledger.
CREATE TABLE IF NOT EXISTS deliveries (
    delivery_id   TEXT PRIMARY KEY,
    submission_id TEXT REFERENCES submissions(submission_id),
    to_normalized TEXT NOT NULL,
    template_name TEXT NOT NULL,
    subject       TEXT NOT NULL,
    provider      TEXT NOT NULL,
    message_id    TEXT,
    status        TEXT NOT NULL,
    error_code    TEXT,
    error_message TEXT,
    sent_at       TEXT,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS submissions_created_idx   ON submissions(created_at);
CREATE INDEX IF NOT EXISTS attempts_ip_time_idx      ON attempts(ip_address, attempted_at);
CREATE INDEX IF NOT EXISTS deliveries_submission_idx ON deliveries(submission_id);

PRAGMA user_version = 1;
";
