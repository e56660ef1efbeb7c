pub const SCHEMA: &str = r#"
-- records table
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id TEXT NOT NULL,
    market TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL UNIQUE,
    code TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    date INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_records_post_id ON records(post_id);
CREATE INDEX IF NOT EXISTS idx_records_date ON records(date);

-- chats table
CREATE TABLE IF NOT EXISTS chats (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    user_name TEXT,
    first_name TEXT,
    last_name TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- inbound message log
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER NOT NULL,
    id_chat INTEGER NOT NULL,
    message TEXT NOT NULL,
    received_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(id, id_chat)
);

-- per-chat read state
CREATE TABLE IF NOT EXISTS relation_chat_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    id_record INTEGER NOT NULL REFERENCES records(id),
    id_chat INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_rcr_record_chat ON relation_chat_records(id_record, id_chat);
"#;
