//! SQL schema for the admission SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One application per user; the code is allocated per calendar year.
CREATE TABLE IF NOT EXISTS applications (
    application_id INTEGER PRIMARY KEY AUTOINCREMENT,
    code           TEXT    NOT NULL UNIQUE,  -- RIN-<year>-<seq>
    code_year      INTEGER NOT NULL,
    code_sequence  INTEGER NOT NULL,
    user_id        INTEGER NOT NULL UNIQUE,
    status         TEXT    NOT NULL DEFAULT 'draft'
                   CHECK (status IN ('draft', 'in_progress', 'submitted', 'approved', 'rejected')),
    progress       INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
    created_at     TEXT    NOT NULL,
    last_updated   TEXT    NOT NULL,
    submitted_at   TEXT,
    version        INTEGER NOT NULL DEFAULT 0,
    UNIQUE (code_year, code_sequence)
);

-- Exactly one row per catalog section, inserted with the application.
-- payload_json holds the last accepted answers (documents live in their own table).
CREATE TABLE IF NOT EXISTS application_sections (
    application_id INTEGER NOT NULL REFERENCES applications(application_id),
    section_id     INTEGER NOT NULL,
    section_name   TEXT    NOT NULL,
    is_completed   INTEGER NOT NULL DEFAULT 0,
    payload_kind   TEXT,
    payload_json   TEXT,
    updated_at     TEXT,
    PRIMARY KEY (application_id, section_id)
);

-- Filled by sections 1 and 4.
CREATE TABLE IF NOT EXISTS personal_details (
    application_id INTEGER PRIMARY KEY REFERENCES applications(application_id),
    full_name      TEXT,
    dob            TEXT,
    sex            TEXT,
    nationality    TEXT,
    religion       TEXT,
    caste          TEXT,
    marital_status TEXT,
    mother_tongue  TEXT,
    annual_income  REAL
);

CREATE TABLE IF NOT EXISTS guardians (
    application_id INTEGER NOT NULL REFERENCES applications(application_id),
    relationship   TEXT    NOT NULL,   -- 'father' | 'mother' | 'guardian'
    name           TEXT    NOT NULL,
    occupation     TEXT,
    mobile         TEXT,
    email          TEXT,
    PRIMARY KEY (application_id, relationship)
);

CREATE TABLE IF NOT EXISTS addresses (
    application_id INTEGER NOT NULL REFERENCES applications(application_id),
    address_type   TEXT    NOT NULL,   -- 'permanent' | 'present'
    address        TEXT    NOT NULL,
    PRIMARY KEY (application_id, address_type)
);

CREATE TABLE IF NOT EXISTS education (
    education_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id  INTEGER NOT NULL REFERENCES applications(application_id),
    level           TEXT    NOT NULL,  -- '10th' | '12th' | 'other'
    qualification   TEXT,
    school_name     TEXT    NOT NULL,
    board           TEXT    NOT NULL,
    total_marks     REAL,
    marks_obtained  REAL,
    percentage      REAL,
    year_of_passing INTEGER,
    mode            TEXT,
    remarks         TEXT,
    UNIQUE (application_id, level)
);

-- Keyed by the lower-cased subject name, never by position.
CREATE TABLE IF NOT EXISTS subject_marks (
    education_id   INTEGER NOT NULL REFERENCES education(education_id),
    subject_key    TEXT    NOT NULL,
    subject        TEXT    NOT NULL,
    total_marks    REAL    NOT NULL,
    marks_obtained REAL    NOT NULL,
    percentage     REAL,
    PRIMARY KEY (education_id, subject_key)
);

CREATE TABLE IF NOT EXISTS documents (
    application_id INTEGER NOT NULL REFERENCES applications(application_id),
    document_type  TEXT    NOT NULL,
    file_name      TEXT    NOT NULL,
    mime_type      TEXT    NOT NULL,
    file_size      INTEGER NOT NULL,
    uploaded_at    TEXT    NOT NULL,
    PRIMARY KEY (application_id, document_type)
);

CREATE TABLE IF NOT EXISTS declarations (
    application_id INTEGER PRIMARY KEY REFERENCES applications(application_id),
    agree_terms    TEXT    NOT NULL,
    place          TEXT,
    declared_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL,
    title           TEXT    NOT NULL,
    message         TEXT    NOT NULL,
    is_read         INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT    NOT NULL
);

-- Drained by an external mailer, which stamps sent_at.
CREATE TABLE IF NOT EXISTS email_outbox (
    email_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id          INTEGER NOT NULL,
    kind             TEXT    NOT NULL,  -- 'approval'
    application_code TEXT    NOT NULL,
    created_at       TEXT    NOT NULL,
    sent_at          TEXT
);

CREATE TABLE IF NOT EXISTS important_dates (
    date_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    title      TEXT NOT NULL,
    event_date TEXT NOT NULL,          -- YYYY-MM-DD
    UNIQUE (title, event_date)
);

CREATE INDEX IF NOT EXISTS applications_status_idx ON applications(status);
CREATE INDEX IF NOT EXISTS notifications_user_idx  ON notifications(user_id, created_at);
CREATE INDEX IF NOT EXISTS important_dates_idx     ON important_dates(event_date);

PRAGMA user_version = 1;
";
