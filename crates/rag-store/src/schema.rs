//! Database schema definitions.

/// Main schema SQL for initializing the database.
pub const SCHEMA: &str = r#"
-- Fragments table
CREATE TABLE IF NOT EXISTS fragments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER,
    content TEXT NOT NULL,
    embedding BLOB,
    summary_vector BLOB,
    metadata TEXT,
    doc_type TEXT,
    language TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fragments_document_id ON fragments(document_id);
CREATE INDEX IF NOT EXISTS idx_fragments_doc_type ON fragments(doc_type);
CREATE INDEX IF NOT EXISTS idx_fragments_language ON fragments(language);
"#;

/// Schema version for migrations, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;
