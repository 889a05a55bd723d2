/// SQL DDL for the rxgate database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS patient_inputs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symptoms TEXT NOT NULL,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    diagnosis TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_input_id INTEGER REFERENCES patient_inputs(id),
    medications TEXT NOT NULL,
    confidence REAL NOT NULL,
    model_version TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS doctor_feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prescription_id INTEGER NOT NULL REFERENCES prescriptions(id),
    original_prescription TEXT NOT NULL,
    modified_prescription TEXT NOT NULL,
    feedback_notes TEXT,
    doctor_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS model_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version TEXT NOT NULL,
    training_samples INTEGER NOT NULL DEFAULT 0,
    feedback_samples INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_input_id);
CREATE INDEX IF NOT EXISTS idx_feedback_prescription ON doctor_feedback(prescription_id);
CREATE INDEX IF NOT EXISTS idx_feedback_created ON doctor_feedback(created_at);
CREATE INDEX IF NOT EXISTS idx_versions_created ON model_versions(created_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
