use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "assessmate.sqlite3";

/// Timestamps written from Rust must use the same shape as the SQL defaults
/// (`strftime('%Y-%m-%dT%H:%M:%fZ','now')`) so they compare as strings.
pub fn timestamp(t: chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn open_db(data_dir: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    bootstrap(&conn)?;
    Ok(conn)
}

pub fn bootstrap(conn: &Connection) -> anyhow::Result<()> {
    // Cascades below only fire with this on, and it is per-connection.
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    register_functions(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            roll_no TEXT UNIQUE,
            year_of_study INTEGER,
            department TEXT,
            college_name TEXT,
            mobile_no TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            user_role INTEGER NOT NULL DEFAULT 1 CHECK(user_role IN (0, 1)),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role_created ON users(user_role, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            expires_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            category_id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            subject_id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_name TEXT NOT NULL,
            category_id INTEGER,
            FOREIGN KEY(category_id) REFERENCES categories(category_id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_category ON subjects(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            topic_id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic_name TEXT NOT NULL,
            subject_id INTEGER,
            FOREIGN KEY(subject_id) REFERENCES subjects(subject_id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topics_subject ON topics(subject_id)",
        [],
    )?;

    // correct_answer holds the MCQ letter or the flowchart answer text,
    // depending on question_type.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            question_id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic_id INTEGER,
            question_type TEXT NOT NULL CHECK(question_type IN ('MCQ', 'Programming', 'Flowchart')),
            question_text TEXT NOT NULL,
            option_A TEXT,
            option_B TEXT,
            option_C TEXT,
            option_D TEXT,
            correct_answer TEXT,
            flowchart_image TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            FOREIGN KEY(topic_id) REFERENCES topics(topic_id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_topic ON questions(topic_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS programming_questions(
            prog_id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER UNIQUE,
            language TEXT NOT NULL CHECK(language IN ('C', 'C++', 'Java', 'Python', 'Other')),
            starter_code TEXT,
            expected_output TEXT,
            FOREIGN KEY(question_id) REFERENCES questions(question_id) ON DELETE CASCADE
        )",
        [],
    )?;

    Ok(())
}

/// `fold_case(text)`: Unicode lower-casing for searches. SQLite's own
/// `LIKE` and `lower()` fold ASCII only.
fn register_functions(conn: &Connection) -> anyhow::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    bootstrap(&conn).expect("bootstrap schema");
    conn
}
