use std::collections::{BTreeMap, HashMap};

use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use homestead_types::api::{LastMessagePreview, ParticipantSummary, ProductSummary};

use super::products::query_product;
use super::{json_list_col, now_ts, opt_uuid_col, ts_col, uuid_col};
use crate::models::{ConversationRow, ConversationView, MessageRow, NewMessage};
use crate::{Database, Result, StoreError};

const CONVERSATION_VIEW_SELECT: &str = "
    SELECT c.id, c.participant_one, c.participant_two, c.product_id, c.last_message_id,
           c.created_at, c.updated_at,
           u1.name, u1.profile_image, u2.name, u2.profile_image,
           p.title, p.slug, p.price, p.display_image,
           m.text, m.sender_id, m.created_at
    FROM conversations c
    JOIN users u1 ON u1.id = c.participant_one
    JOIN users u2 ON u2.id = c.participant_two
    LEFT JOIN products p ON p.id = c.product_id
    LEFT JOIN messages m ON m.id = c.last_message_id";

impl Database {
    // -- Conversations --

    /// Get or create the conversation between two users about an optional
    /// product. Returns the conversation and whether it was created.
    pub fn start_conversation(
        &self,
        user_id: Uuid,
        counterpart_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<(ConversationView, bool)> {
        if user_id == counterpart_id {
            return Err(StoreError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        self.with_conn(|conn| {
            if !user_exists(conn, counterpart_id)? {
                return Err(StoreError::NotFound("user"));
            }
            if let Some(pid) = product_id {
                query_product(conn, pid)?.ok_or(StoreError::NotFound("product"))?;
            }

            let (one, two) = if user_id < counterpart_id {
                (user_id, counterpart_id)
            } else {
                (counterpart_id, user_id)
            };
            let product = product_id.map(|p| p.to_string());

            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM conversations
                     WHERE participant_one = ?1 AND participant_two = ?2 AND product_id IS ?3",
                    rusqlite::params![one.to_string(), two.to_string(), product],
                    |row| row.get(0),
                )
                .optional()?;

            let (id, created) = match existing {
                Some(id) => (id, false),
                None => {
                    let id = Uuid::new_v4().to_string();
                    let (_, now) = now_ts();
                    conn.execute(
                        "INSERT INTO conversations (id, participant_one, participant_two, product_id, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        rusqlite::params![id, one.to_string(), two.to_string(), product, now],
                    )?;
                    (id, true)
                }
            };

            let view = query_conversation_view(conn, &id)?
                .ok_or(StoreError::NotFound("conversation"))?;
            Ok((view, created))
        })
    }

    pub fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, conversation_id))
    }

    /// A conversation as seen by one of its participants.
    pub fn conversation_for_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationView> {
        self.with_conn(|conn| {
            let view = query_conversation_view(conn, &conversation_id.to_string())?
                .ok_or(StoreError::NotFound("conversation"))?;
            if !view.conversation.has_participant(user_id) {
                return Err(StoreError::Forbidden);
            }
            Ok(view)
        })
    }

    /// The user's conversations, most recently updated first.
    pub fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationView>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE c.participant_one = ?1 OR c.participant_two = ?1
                 ORDER BY c.updated_at DESC, c.id",
                CONVERSATION_VIEW_SELECT
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], view_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// False for unknown conversations as well as non-participants.
    pub fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .get_conversation(conversation_id)?
            .is_some_and(|c| c.has_participant(user_id)))
    }

    // -- Messages --

    /// Messages in ascending (created_at, seq) order.
    pub fn get_messages(&self, conversation_id: Uuid, viewer: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let conversation = query_conversation(conn, conversation_id)?
                .ok_or(StoreError::NotFound("conversation"))?;
            if !conversation.has_participant(viewer) {
                return Err(StoreError::Forbidden);
            }
            query_messages(conn, conversation_id)
        })
    }

    /// Persist a message. The sender is recorded as its first reader and the
    /// conversation's last-message cache and `updated_at` move forward.
    pub fn create_message(&self, new: &NewMessage) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let conversation = query_conversation(&tx, new.conversation_id)?
                .ok_or(StoreError::NotFound("conversation"))?;
            if !conversation.has_participant(new.sender_id) {
                return Err(StoreError::Forbidden);
            }

            let id = Uuid::new_v4();
            let (created_at, now) = now_ts();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, text, attachments, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    new.conversation_id.to_string(),
                    new.sender_id.to_string(),
                    new.text,
                    serde_json::to_string(&new.attachments)?,
                    now,
                ],
            )?;
            let seq = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.to_string(), new.sender_id.to_string(), now],
            )?;

            tx.execute(
                "UPDATE conversations SET
                    last_message_id = CASE WHEN ?3 >= updated_at THEN ?2 ELSE last_message_id END,
                    updated_at = MAX(updated_at, ?3)
                 WHERE id = ?1",
                rusqlite::params![new.conversation_id.to_string(), id.to_string(), now],
            )?;

            let sender_name: String = tx.query_row(
                "SELECT name FROM users WHERE id = ?1",
                [new.sender_id.to_string()],
                |row| row.get(0),
            )?;

            tx.commit()?;

            Ok(MessageRow {
                seq,
                id,
                conversation_id: new.conversation_id,
                sender_id: new.sender_id,
                sender_name,
                text: new.text.clone(),
                attachments: new.attachments.clone(),
                created_at,
                read_by: vec![new.sender_id],
            })
        })
    }

    /// Add `user_id` to read-by of every message in the conversation.
    /// Idempotent; returns how many messages were newly marked.
    pub fn mark_read(&self, conversation_id: Uuid, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let conversation = query_conversation(conn, conversation_id)?
                .ok_or(StoreError::NotFound("conversation"))?;
            if !conversation.has_participant(user_id) {
                return Err(StoreError::Forbidden);
            }

            let (_, now) = now_ts();
            let marked = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 SELECT id, ?2, ?3 FROM messages WHERE conversation_id = ?1",
                rusqlite::params![conversation_id.to_string(), user_id.to_string(), now],
            )?;
            Ok(marked)
        })
    }

    /// Unread message counts per conversation: messages from the other
    /// participant the user has not read yet. Conversations with nothing
    /// unread are omitted.
    pub fn unread_counts(&self, user_id: Uuid) -> Result<BTreeMap<Uuid, u64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT m.conversation_id, COUNT(*)
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE (c.participant_one = ?1 OR c.participant_two = ?1)
                   AND m.sender_id != ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM message_reads r
                       WHERE r.message_id = m.id AND r.user_id = ?1
                   )
                 GROUP BY m.conversation_id",
            )?;
            let counts = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((uuid_col(row, 0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
            Ok(counts)
        })
    }
}

fn user_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1 AND active = 1",
            [id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<ConversationRow>> {
    let row = conn
        .prepare_cached(
            "SELECT id, participant_one, participant_two, product_id, last_message_id, created_at, updated_at
             FROM conversations WHERE id = ?1",
        )?
        .query_row([id.to_string()], conversation_from_row)
        .optional()?;
    Ok(row)
}

fn query_conversation_view(conn: &Connection, id: &str) -> Result<Option<ConversationView>> {
    let sql = format!("{} WHERE c.id = ?1", CONVERSATION_VIEW_SELECT);
    let row = conn
        .prepare_cached(&sql)?
        .query_row([id], view_from_row)
        .optional()?;
    Ok(row)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: uuid_col(row, 0)?,
        participants: [uuid_col(row, 1)?, uuid_col(row, 2)?],
        product_id: opt_uuid_col(row, 3)?,
        last_message_id: opt_uuid_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationView> {
    let conversation = conversation_from_row(row)?;

    let participants = vec![
        ParticipantSummary {
            id: conversation.participants[0],
            name: row.get(7)?,
            profile_image: row.get(8)?,
        },
        ParticipantSummary {
            id: conversation.participants[1],
            name: row.get(9)?,
            profile_image: row.get(10)?,
        },
    ];

    let product = match (conversation.product_id, row.get::<_, Option<String>>(11)?) {
        (Some(id), Some(title)) => Some(ProductSummary {
            id,
            title,
            slug: row.get(12)?,
            price: row.get(13)?,
            display_image: row.get(14)?,
        }),
        _ => None,
    };

    let last_message = match (conversation.last_message_id, row.get::<_, Option<String>>(15)?) {
        (Some(id), Some(text)) => Some(LastMessagePreview {
            id,
            text,
            sender_id: uuid_col(row, 16)?,
            created_at: ts_col(row, 17)?,
        }),
        _ => None,
    };

    Ok(ConversationView {
        conversation,
        participants,
        product,
        last_message,
    })
}

fn query_messages(conn: &Connection, conversation_id: Uuid) -> Result<Vec<MessageRow>> {
    let cid = conversation_id.to_string();

    let mut read_by: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    {
        let mut stmt = conn.prepare_cached(
            "SELECT r.message_id, r.user_id
             FROM message_reads r
             JOIN messages m ON m.id = r.message_id
             WHERE m.conversation_id = ?1
             ORDER BY r.read_at, r.user_id",
        )?;
        let pairs = stmt.query_map([&cid], |row| Ok((uuid_col(row, 0)?, uuid_col(row, 1)?)))?;
        for pair in pairs {
            let (message_id, user_id) = pair?;
            read_by.entry(message_id).or_default().push(user_id);
        }
    }

    // JOIN users to fetch the sender name in a single query
    let mut stmt = conn.prepare_cached(
        "SELECT m.seq, m.id, m.conversation_id, m.sender_id, COALESCE(u.name, ''), m.text, m.attachments, m.created_at
         FROM messages m
         LEFT JOIN users u ON u.id = m.sender_id
         WHERE m.conversation_id = ?1
         ORDER BY m.created_at ASC, m.seq ASC",
    )?;
    let rows = stmt
        .query_map([&cid], |row| {
            let id = uuid_col(row, 1)?;
            Ok(MessageRow {
                seq: row.get(0)?,
                id,
                conversation_id: uuid_col(row, 2)?,
                sender_id: uuid_col(row, 3)?,
                sender_name: row.get(4)?,
                text: row.get(5)?,
                attachments: json_list_col(row, 6)?,
                created_at: ts_col(row, 7)?,
                read_by: read_by.remove(&id).unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
