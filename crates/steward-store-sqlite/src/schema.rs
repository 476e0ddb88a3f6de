//! SQL schema for the Steward SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.
//!
//! Timestamps are RFC 3339 UTC with fixed microsecond precision, so plain
//! string comparison orders them correctly.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per recommendation; the unique key is the upsert target.
CREATE TABLE IF NOT EXISTS actions (
    action_id         TEXT PRIMARY KEY,
    owner_user_id     TEXT NOT NULL,
    entity_type       TEXT NOT NULL,
    entity_id         TEXT NOT NULL,
    dedupe_key        TEXT NOT NULL,
    rule_key          TEXT NOT NULL,
    title             TEXT NOT NULL,
    reason            TEXT NOT NULL,
    score             INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
    priority          TEXT NOT NULL,   -- 'low' | 'medium' | 'high' | 'critical'
    status            TEXT NOT NULL,   -- 'queued' | 'done' | 'dismissed' | 'snoozed'
    outcome           TEXT,            -- 'success' | 'failure'
    snoozed_until     TEXT,
    fire_count        INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL,
    last_fired_at     TEXT NOT NULL,
    status_changed_at TEXT NOT NULL,
    UNIQUE (entity_type, entity_id, dedupe_key)
);

-- Append-only status transitions.
CREATE TABLE IF NOT EXISTS action_events (
    event_id    TEXT PRIMARY KEY,
    action_id   TEXT NOT NULL REFERENCES actions(action_id),
    status      TEXT NOT NULL,
    outcome     TEXT,
    recorded_at TEXT NOT NULL
);

-- Append-only: one row per created/refreshed recommendation per run.
CREATE TABLE IF NOT EXISTS rule_firings (
    firing_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_user_id TEXT NOT NULL,
    rule_key      TEXT NOT NULL,
    dedupe_key    TEXT NOT NULL,
    action_id     TEXT NOT NULL REFERENCES actions(action_id),
    fired_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learned_weights (
    owner_user_id TEXT NOT NULL,
    rule_key      TEXT NOT NULL,
    multiplier    REAL NOT NULL CHECK (multiplier > 0),
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (owner_user_id, rule_key)
);

-- '*' in entity_type/entity_id marks an owner-wide preference.
CREATE TABLE IF NOT EXISTS preferences (
    preference_id    TEXT PRIMARY KEY,
    owner_user_id    TEXT NOT NULL,
    entity_type      TEXT NOT NULL DEFAULT '*',
    entity_id        TEXT NOT NULL DEFAULT '*',
    target_kind      TEXT NOT NULL,   -- 'rule_key' | 'dedupe_key'
    target_key       TEXT NOT NULL,
    suppressed_until TEXT,
    status           TEXT NOT NULL,   -- 'active' | 'inactive'
    source           TEXT NOT NULL,   -- 'user' | 'policy'
    reason           TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE (owner_user_id, entity_type, entity_id, target_kind, target_key)
);

-- Snapshots are strictly append-only; seq gives insertion order per scope.
CREATE TABLE IF NOT EXISTS score_snapshots (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id  TEXT NOT NULL UNIQUE,
    entity_type  TEXT NOT NULL,
    entity_id    TEXT NOT NULL,
    score        INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
    band         TEXT NOT NULL,
    factors_json TEXT NOT NULL,
    reasons_json TEXT NOT NULL,
    computed_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS score_events (
    event_id         TEXT PRIMARY KEY,
    snapshot_id      TEXT NOT NULL REFERENCES score_snapshots(snapshot_id),
    prev_snapshot_id TEXT NOT NULL REFERENCES score_snapshots(snapshot_id),
    entity_type      TEXT NOT NULL,
    entity_id        TEXT NOT NULL,
    event_type       TEXT NOT NULL,
    from_score       INTEGER NOT NULL,
    to_score         INTEGER NOT NULL,
    from_band        TEXT NOT NULL,
    to_band          TEXT NOT NULL,
    delta            INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    UNIQUE (snapshot_id, event_type)
);

CREATE TABLE IF NOT EXISTS risk_flags (
    risk_flag_id      TEXT PRIMARY KEY,
    rule_key          TEXT NOT NULL,
    dedupe_key        TEXT NOT NULL UNIQUE,
    severity          TEXT NOT NULL,
    severity_rank     INTEGER NOT NULL,
    title             TEXT NOT NULL,
    description       TEXT NOT NULL,
    entity_type       TEXT,
    entity_id         TEXT,
    status            TEXT NOT NULL,   -- 'open' | 'snoozed' | 'dismissed' | 'resolved'
    snoozed_until     TEXT,
    first_seen_at     TEXT NOT NULL,
    last_seen_at      TEXT NOT NULL,
    status_changed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id TEXT PRIMARY KEY,
    dedupe_key      TEXT NOT NULL,
    source          TEXT NOT NULL,
    entity_type     TEXT NOT NULL,
    entity_id       TEXT NOT NULL,
    event_type      TEXT NOT NULL,
    title           TEXT NOT NULL,
    body            TEXT NOT NULL,
    status          TEXT NOT NULL,   -- 'pending' | 'sent' | 'failed' | 'suppressed'
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Audit only; never consulted for correctness.
CREATE TABLE IF NOT EXISTS run_ledger (
    run_key      TEXT PRIMARY KEY,
    triggered_by TEXT NOT NULL,
    counts_json  TEXT NOT NULL,
    run_count    INTEGER NOT NULL DEFAULT 1,
    first_run_at TEXT NOT NULL,
    last_run_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_entries (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS actions_owner_idx        ON actions(owner_user_id, rule_key);
CREATE INDEX IF NOT EXISTS action_events_action_idx ON action_events(action_id);
CREATE INDEX IF NOT EXISTS rule_firings_owner_idx   ON rule_firings(owner_user_id, fired_at);
CREATE INDEX IF NOT EXISTS score_snapshots_scope    ON score_snapshots(entity_type, entity_id, seq);
CREATE INDEX IF NOT EXISTS score_events_scope       ON score_events(entity_type, entity_id, created_at);
CREATE INDEX IF NOT EXISTS risk_flags_status_idx    ON risk_flags(status, severity_rank);
CREATE INDEX IF NOT EXISTS notifications_key_idx    ON notifications(dedupe_key, created_at);
CREATE INDEX IF NOT EXISTS notifications_status_idx ON notifications(status, created_at);

PRAGMA user_version = 1;
";
