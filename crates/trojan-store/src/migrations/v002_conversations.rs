use rusqlite::Connection;

// Participants are stored sorted (low < high) so the unordered pair has one
// canonical form and the UNIQUE index enforces one thread per pair+listing.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    participant_low  TEXT NOT NULL,               -- FK -> users(id)
    participant_high TEXT NOT NULL,               -- FK -> users(id)
    listing_id       TEXT NOT NULL,               -- FK -> listings(id)
    created_at       TEXT NOT NULL,

    CHECK (participant_low < participant_high),
    FOREIGN KEY (participant_low) REFERENCES users(id),
    FOREIGN KEY (participant_high) REFERENCES users(id),
    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_thread
    ON conversations(participant_low, participant_high, listing_id);
CREATE INDEX IF NOT EXISTS idx_conversations_high ON conversations(participant_high);
CREATE INDEX IF NOT EXISTS idx_conversations_listing ON conversations(listing_id);

CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    conversation_id TEXT NOT NULL,                -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,                -- FK -> users(id)
    content         TEXT NOT NULL,
    timestamp       TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, timestamp ASC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
