use rusqlite::{params, Connection};
use trojan_shared::{ConversationId, MessageId, UserId};

use crate::database::{format_ts, ts_col, uuid_col};
use crate::error::Result;
use crate::models::Message;

pub(crate) fn insert_message(
    conn: &Connection,
    conversation_id: ConversationId,
    message: &Message,
) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, content, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.id.to_string(),
            conversation_id.to_string(),
            message.sender.to_string(),
            message.content,
            format_ts(&message.timestamp),
        ],
    )?;
    Ok(())
}

/// All messages of a conversation, oldest first.
pub(crate) fn messages_for_conversation(
    conn: &Connection,
    conversation_id: ConversationId,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, content, timestamp
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY timestamp ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(uuid_col(row, 0)?),
        sender: UserId(uuid_col(row, 1)?),
        content: row.get(2)?,
        timestamp: ts_col(row, 3)?,
    })
}
