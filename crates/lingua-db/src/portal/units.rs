use std::borrow::Cow;

use rusqlite::{Transaction, params};

use crate::migrate::{Procedure, RegisteredUnit};

const fn sql(text: &'static str) -> Procedure {
    Procedure::Sql(Cow::Borrowed(text))
}

pub static UNITS: &[RegisteredUnit] = &[
    ADD_USER_PREFERENCES_TABLE,
    CREATE_WORDS_TABLE,
    CREATE_GROUPS_TABLE,
    CREATE_WORD_GROUPS_TABLE,
    CREATE_STUDY_ACTIVITIES_TABLE,
    CREATE_STUDY_SESSIONS_TABLE,
    CREATE_WORD_REVIEW_ITEMS_TABLE,
    ADD_DESCRIPTION_TO_STUDY_ACTIVITIES,
    FIX_WORD_REVIEW_ITEMS,
];

const ADD_USER_PREFERENCES_TABLE: RegisteredUnit = RegisteredUnit {
    name: "20250301T045752_add_user_preferences_table",
    forward: Procedure::Native(create_user_preferences),
    backward: sql("DROP TABLE IF EXISTS user_preferences;"),
};

fn create_user_preferences(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_preferences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            theme TEXT DEFAULT 'light',
            notifications_enabled BOOLEAN DEFAULT 1,
            daily_goal INTEGER DEFAULT 10,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    let existing: i64 =
        tx.query_row("SELECT count(*) FROM user_preferences", [], |row| row.get(0))?;
    if existing == 0 {
        tx.execute(
            "INSERT INTO user_preferences (theme, notifications_enabled, daily_goal)
             VALUES (?1, ?2, ?3)",
            params!["light", true, 10],
        )?;
    }
    Ok(())
}

const CREATE_WORDS_TABLE: RegisteredUnit = RegisteredUnit {
    name: "20250301_create_words_table",
    forward: sql("CREATE TABLE IF NOT EXISTS words (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            italian TEXT NOT NULL,
            english TEXT NOT NULL,
            parts TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_words_italian ON words(italian);
        CREATE INDEX IF NOT EXISTS idx_words_english ON words(english);"),
    backward: sql("DROP TABLE IF EXISTS words;"),
};

const CREATE_GROUPS_TABLE: RegisteredUnit = RegisteredUnit {
    name: "20250302_create_groups_table",
    forward: sql("CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            words_count INTEGER DEFAULT 0
        );"),
    backward: sql("DROP TABLE IF EXISTS groups;"),
};

const CREATE_WORD_GROUPS_TABLE: RegisteredUnit = RegisteredUnit {
    name: "20250303_create_word_groups_table",
    forward: sql("CREATE TABLE IF NOT EXISTS word_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            word_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            FOREIGN KEY (word_id) REFERENCES words (id),
            FOREIGN KEY (group_id) REFERENCES groups (id)
        );"),
    backward: sql("DROP TABLE IF EXISTS word_groups;"),
};

const CREATE_STUDY_ACTIVITIES_TABLE: RegisteredUnit = RegisteredUnit {
    name: "20250304_create_study_activities_table",
    forward: sql("CREATE TABLE IF NOT EXISTS study_activities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            url TEXT NOT NULL
        );"),
    backward: sql("DROP TABLE IF EXISTS study_activities;"),
};

const CREATE_STUDY_SESSIONS_TABLE: RegisteredUnit = RegisteredUnit {
    name: "20250305_create_study_sessions_table",
    forward: sql("CREATE TABLE IF NOT EXISTS study_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL,
            study_activity_id INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (group_id) REFERENCES groups (id),
            FOREIGN KEY (study_activity_id) REFERENCES study_activities (id)
        );"),
    backward: sql("DROP TABLE IF EXISTS study_sessions;"),
};

const CREATE_WORD_REVIEW_ITEMS_TABLE: RegisteredUnit = RegisteredUnit {
    name: "20250306_create_word_review_items_table",
    forward: sql("CREATE TABLE IF NOT EXISTS word_review_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            word_id INTEGER NOT NULL,
            study_session_id INTEGER NOT NULL,
            correct BOOLEAN NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (word_id) REFERENCES words (id),
            FOREIGN KEY (study_session_id) REFERENCES study_sessions (id)
        );"),
    backward: sql("DROP TABLE IF EXISTS word_review_items;"),
};

const ADD_DESCRIPTION_TO_STUDY_ACTIVITIES: RegisteredUnit = RegisteredUnit {
    name: "20250307_add_description_to_study_activities",
    forward: sql("ALTER TABLE study_activities ADD COLUMN description TEXT;"),
    backward: Procedure::Native(drop_study_activity_description),
};

/// SQLite cannot drop the column in place, so rebuild the table.
fn drop_study_activity_description(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE temp_study_activities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            url TEXT NOT NULL
        );

        INSERT INTO temp_study_activities (id, name, url)
        SELECT id, name, url FROM study_activities;

        DROP TABLE study_activities;

        ALTER TABLE temp_study_activities RENAME TO study_activities;",
    )
}

const FIX_WORD_REVIEW_ITEMS: RegisteredUnit = RegisteredUnit {
    name: "20250307_fix_word_review_items",
    forward: sql("DROP TABLE IF EXISTS word_review_items;
        DROP INDEX IF EXISTS idx_word_review_items_word_id;
        DROP INDEX IF EXISTS idx_word_review_items_session_id;
        DROP INDEX IF EXISTS idx_word_review_items_created_at;

        -- study_session_id becomes optional
        CREATE TABLE word_review_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            word_id INTEGER NOT NULL,
            study_session_id INTEGER,
            correct BOOLEAN NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (word_id) REFERENCES words (id),
            FOREIGN KEY (study_session_id) REFERENCES study_sessions (id)
        );

        CREATE INDEX idx_word_review_items_word_id ON word_review_items(word_id);
        CREATE INDEX idx_word_review_items_session_id ON word_review_items(study_session_id);
        CREATE INDEX idx_word_review_items_created_at ON word_review_items(created_at);"),
    backward: sql("DROP INDEX IF EXISTS idx_word_review_items_word_id;
        DROP INDEX IF EXISTS idx_word_review_items_session_id;
        DROP INDEX IF EXISTS idx_word_review_items_created_at;
        DROP TABLE IF EXISTS word_review_items;"),
};
