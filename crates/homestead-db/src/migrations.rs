use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password        TEXT NOT NULL,
            phone_number    TEXT,
            city            TEXT NOT NULL DEFAULT '',
            street          TEXT NOT NULL DEFAULT '',
            profile_image   TEXT,
            role            TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
            active          INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            slug            TEXT NOT NULL,
            description     TEXT NOT NULL,
            price           REAL NOT NULL CHECK (price >= 0),
            kind            TEXT NOT NULL,
            category        TEXT NOT NULL DEFAULT '[]',
            display_image   TEXT NOT NULL,
            images          TEXT NOT NULL DEFAULT '[]',
            status          TEXT NOT NULL,
            location        TEXT NOT NULL,
            beds            INTEGER,
            baths           INTEGER,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_slug
            ON products(slug);

        CREATE TABLE IF NOT EXISTS wishlist (
            user_id     TEXT NOT NULL REFERENCES users(id),
            product_id  TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, product_id)
        );

        -- participant_one < participant_two so a pair has one spelling
        CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            participant_one     TEXT NOT NULL REFERENCES users(id),
            participant_two     TEXT NOT NULL REFERENCES users(id),
            product_id          TEXT REFERENCES products(id) ON DELETE SET NULL,
            last_message_id     TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            CHECK (participant_one < participant_two)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_one
            ON conversations(participant_one, updated_at);
        CREATE INDEX IF NOT EXISTS idx_conversations_two
            ON conversations(participant_two, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            text            TEXT NOT NULL,
            attachments     TEXT NOT NULL DEFAULT '[]',
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at, seq);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            read_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
