//! SQL schema for the entitlement store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.
//!
//! Encodings: ids are hyphenated lowercase UUIDs, timestamps RFC 3339 UTC
//! with fixed microsecond precision (so text order is time order), dates
//! `YYYY-MM-DD`, money and hours decimal strings.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS support_types (
    support_type_id TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    description     TEXT,
    modality        TEXT NOT NULL,   -- 'monthly' | 'yearly' | 'by_ticket_count' | 'by_hour_count'
    tier            TEXT NOT NULL DEFAULT 'standard',
    price           TEXT NOT NULL,
    max_tickets     INTEGER,
    max_hours       INTEGER,
    active          INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plans (
    plan_id       TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    description   TEXT,
    monthly_price TEXT NOT NULL,
    yearly_price  TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plan_subscriptions (
    subscription_id  TEXT PRIMARY KEY,
    company_id       TEXT NOT NULL,
    plan_id          TEXT NOT NULL REFERENCES plans(plan_id),
    period           TEXT NOT NULL,   -- 'monthly' | 'yearly'
    price_paid       TEXT NOT NULL,
    discount_percent TEXT NOT NULL DEFAULT '0',
    status           TEXT NOT NULL,
    start_date       TEXT NOT NULL,
    end_date         TEXT,
    auto_renew       INTEGER NOT NULL DEFAULT 0,
    predecessor_id   TEXT REFERENCES plan_subscriptions(subscription_id),
    notes            TEXT,
    created_by       TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Deliberately no UNIQUE (company_id, status): historical expired and
-- canceled rows coexist. One active row per company is checked in code.
CREATE TABLE IF NOT EXISTS entitlements (
    entitlement_id   TEXT PRIMARY KEY,
    company_id       TEXT NOT NULL,
    subscription_id  TEXT NOT NULL REFERENCES plan_subscriptions(subscription_id),
    support_type_id  TEXT NOT NULL REFERENCES support_types(support_type_id),
    start_date       TEXT NOT NULL,
    end_date         TEXT,
    status           TEXT NOT NULL,
    current_price    TEXT NOT NULL,
    tickets_consumed INTEGER NOT NULL DEFAULT 0 CHECK (tickets_consumed >= 0),
    hours_consumed   TEXT NOT NULL DEFAULT '0',
    auto_renew       INTEGER NOT NULL DEFAULT 0,
    notes            TEXT,
    created_by       TEXT,
    predecessor_id   TEXT REFERENCES entitlements(entitlement_id),
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tickets (
    ticket_id      TEXT PRIMARY KEY,
    entitlement_id TEXT NOT NULL REFERENCES entitlements(entitlement_id),
    company_id     TEXT NOT NULL,
    created_by     TEXT,
    title          TEXT NOT NULL,
    description    TEXT,
    status         TEXT NOT NULL,
    priority       TEXT NOT NULL,
    assignee       TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    closed_at      TEXT,
    consumption_applied INTEGER NOT NULL DEFAULT 0,
    metadata       TEXT NOT NULL DEFAULT 'null'
);

CREATE TABLE IF NOT EXISTS ticket_comments (
    comment_id  TEXT PRIMARY KEY,
    ticket_id   TEXT NOT NULL REFERENCES tickets(ticket_id),
    author_kind TEXT NOT NULL,   -- 'staff' | 'tenant' | 'system'
    author_id   TEXT,
    body        TEXT NOT NULL,
    attachments TEXT NOT NULL DEFAULT '[]',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    payment_id     TEXT PRIMARY KEY,
    entitlement_id TEXT NOT NULL REFERENCES entitlements(entitlement_id),
    amount         TEXT NOT NULL,
    paid_at        TEXT NOT NULL,
    method         TEXT NOT NULL,
    reference      TEXT,
    status         TEXT NOT NULL,
    details        TEXT NOT NULL DEFAULT 'null',
    recorded_by    TEXT,
    created_at     TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS status_events (
    event_id     TEXT PRIMARY KEY,
    subject_kind TEXT NOT NULL,   -- 'entitlement' | 'ticket' | 'subscription'
    subject_id   TEXT NOT NULL,
    at           TEXT NOT NULL,
    actor        TEXT NOT NULL,   -- JSON-encoded Actor
    old_status   TEXT,
    new_status   TEXT NOT NULL,
    reason       TEXT
);

CREATE TABLE IF NOT EXISTS job_locks (
    name        TEXT PRIMARY KEY,
    holder      TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS entitlements_company_idx ON entitlements(company_id, status);
CREATE INDEX IF NOT EXISTS entitlements_end_idx     ON entitlements(status, end_date);
CREATE INDEX IF NOT EXISTS subscriptions_end_idx    ON plan_subscriptions(status, end_date);
CREATE INDEX IF NOT EXISTS tickets_entitlement_idx  ON tickets(entitlement_id);
CREATE INDEX IF NOT EXISTS tickets_company_idx      ON tickets(company_id);
CREATE INDEX IF NOT EXISTS comments_ticket_idx      ON ticket_comments(ticket_id);
CREATE INDEX IF NOT EXISTS payments_entitlement_idx ON payments(entitlement_id);
CREATE INDEX IF NOT EXISTS events_subject_idx       ON status_events(subject_kind, subject_id);

PRAGMA user_version = 1;
";
