/// SQL migration for the initial sync schema
///
/// Design principles:
/// - Columns for the dedup key and frequently displayed fields
/// - JSON blob for ADIF fields we do not model (extensions)
/// - snake_case naming (map to ADIF on import)
pub const MIGRATION_001: &str = r#"
-- =============================================================================
-- QSO Log
-- =============================================================================
CREATE TABLE IF NOT EXISTS qsos (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid            TEXT NOT NULL UNIQUE,

    -- DEDUP KEY
    call            TEXT NOT NULL,          -- as received
    call_key        TEXT NOT NULL,          -- UPPER(call)
    timestamp       TEXT NOT NULL,          -- YYYY-MM-DDTHH:MM:SSZ (UTC)
    band            TEXT NOT NULL,          -- lowercase, e.g. "20m"

    mode            TEXT NOT NULL,
    freq            REAL,                   -- MHz

    -- SIGNAL REPORTS
    rst_sent        TEXT,
    rst_rcvd        TEXT,

    -- MY STATION
    station_callsign TEXT,
    my_gridsquare   TEXT,
    tx_pwr          REAL,                   -- Watts

    -- CONTACT
    name            TEXT,
    email           TEXT,
    country         TEXT,
    gridsquare      TEXT,
    sota_ref        TEXT,
    pota_ref        TEXT,

    qrz_logid       TEXT,

    -- EXTENDED ADIF FIELDS (JSON object, carried verbatim)
    adif_fields     TEXT DEFAULT '{}',

    source          TEXT DEFAULT 'qrz',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,

    UNIQUE(call_key, timestamp, band)
);

CREATE INDEX IF NOT EXISTS idx_qsos_timestamp ON qsos(timestamp);

-- =============================================================================
-- Import ledger: one row per run
-- =============================================================================
CREATE TABLE IF NOT EXISTS import_runs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    account         TEXT NOT NULL,
    fetch_option    TEXT NOT NULL,
    dry_run         INTEGER NOT NULL DEFAULT 0,
    success         INTEGER NOT NULL DEFAULT 0,
    started_at      TEXT NOT NULL,
    completed_at    TEXT NOT NULL,
    fetched_count   INTEGER NOT NULL DEFAULT 0,
    inserted_count  INTEGER NOT NULL DEFAULT 0,
    duplicate_count INTEGER NOT NULL DEFAULT 0,
    error_count     INTEGER NOT NULL DEFAULT 0,
    error           TEXT
);

CREATE INDEX IF NOT EXISTS idx_import_runs_account ON import_runs(account, completed_at);

-- =============================================================================
-- Per-account import lease
-- =============================================================================
CREATE TABLE IF NOT EXISTS import_leases (
    account         TEXT PRIMARY KEY,
    holder          TEXT NOT NULL,
    acquired_at     TEXT NOT NULL,
    expires_at      TEXT NOT NULL
);

-- =============================================================================
-- Settings (credentials, logbook ids)
-- =============================================================================
CREATE TABLE IF NOT EXISTS settings (
    key             TEXT PRIMARY KEY,
    value           TEXT,
    updated_at      TEXT NOT NULL
);
"#;
