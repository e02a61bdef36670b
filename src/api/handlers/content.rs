use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::api::error::{created, ok, ApiError};
use crate::api::helpers::field_string;
use crate::api::session::{AdminUser, AuthUser};
use crate::api::types::{AppState, IdParam, JsonBody};

/// One level of the category → subject → topic tree. All three levels
/// share the same CRUD shape; only names and the parent edge differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Category,
    Subject,
    Topic,
}

impl Level {
    fn table(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Subject => "subjects",
            Self::Topic => "topics",
        }
    }

    fn id_col(self) -> &'static str {
        match self {
            Self::Category => "category_id",
            Self::Subject => "subject_id",
            Self::Topic => "topic_id",
        }
    }

    fn name_col(self) -> &'static str {
        match self {
            Self::Category => "category_name",
            Self::Subject => "subject_name",
            Self::Topic => "topic_name",
        }
    }

    fn parent(self) -> Option<Level> {
        match self {
            Self::Category => None,
            Self::Subject => Some(Self::Category),
            Self::Topic => Some(Self::Subject),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Category => "Category",
            Self::Subject => "Subject",
            Self::Topic => "Topic",
        }
    }

    fn list_key(self) -> &'static str {
        self.table()
    }

    fn columns(self) -> String {
        match self.parent() {
            Some(p) => format!("{}, {}, {}", self.id_col(), self.name_col(), p.id_col()),
            None => format!("{}, {}", self.id_col(), self.name_col()),
        }
    }

    fn row_json(self, row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
        let id: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        let mut out = json!({ self.id_col(): id, self.name_col(): name });
        if let Some(p) = self.parent() {
            let parent_id: Option<i64> = row.get(2)?;
            out[p.id_col()] = json!(parent_id);
        }
        Ok(out)
    }

    /// Questions living anywhere under one node of this level.
    fn subtree_questions_sql(self) -> &'static str {
        match self {
            Self::Category => {
                "SELECT COUNT(*)
                 FROM questions q
                 JOIN topics t ON t.topic_id = q.topic_id
                 JOIN subjects s ON s.subject_id = t.subject_id
                 WHERE s.category_id = ?"
            }
            Self::Subject => {
                "SELECT COUNT(*)
                 FROM questions q
                 JOIN topics t ON t.topic_id = q.topic_id
                 WHERE t.subject_id = ?"
            }
            Self::Topic => "SELECT COUNT(*) FROM questions WHERE topic_id = ?",
        }
    }
}

pub fn node_exists(conn: &Connection, level: Level, id: i64) -> Result<bool, ApiError> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ?",
        level.table(),
        level.id_col()
    );
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

/// Roots when `parent_id` is `None`, otherwise the children of that parent.
pub fn list_nodes(conn: &Connection, level: Level, parent_id: Option<i64>) -> Result<Vec<Value>, ApiError> {
    let mut sql = format!("SELECT {} FROM {}", level.columns(), level.table());
    let filter = level.parent().zip(parent_id);
    if let Some((p, _)) = filter {
        sql.push_str(&format!(" WHERE {} = ?1", p.id_col()));
    }
    sql.push_str(&format!(" ORDER BY {} COLLATE NOCASE, {}", level.name_col(), level.id_col()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = match filter {
        Some((_, pid)) => stmt
            .query_map([pid], |row| level.row_json(row))?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], |row| level.row_json(row))?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

pub fn insert_node(
    conn: &Connection,
    level: Level,
    name: &str,
    parent_id: Option<i64>,
) -> Result<i64, ApiError> {
    match (level.parent(), parent_id) {
        (Some(p), Some(pid)) => {
            if !node_exists(conn, p, pid)? {
                return Err(ApiError::not_found(format!("{} not found", p.label())));
            }
            let sql = format!(
                "INSERT INTO {}({}, {}) VALUES(?, ?)",
                level.table(),
                level.name_col(),
                p.id_col()
            );
            conn.execute(&sql, (name, pid))?;
        }
        (Some(p), None) => {
            return Err(ApiError::validation(format!("{} is required", p.id_col())));
        }
        (None, _) => {
            let sql = format!("INSERT INTO {}({}) VALUES(?)", level.table(), level.name_col());
            conn.execute(&sql, [name])?;
        }
    }
    Ok(conn.last_insert_rowid())
}

pub fn rename_node(conn: &Connection, level: Level, id: i64, name: &str) -> Result<(), ApiError> {
    let sql = format!(
        "UPDATE {} SET {} = ? WHERE {} = ?",
        level.table(),
        level.name_col(),
        level.id_col()
    );
    let changed = conn.execute(&sql, (name, id))?;
    if changed == 0 {
        return Err(ApiError::not_found(format!("{} not found", level.label())));
    }
    Ok(())
}

/// Deletes the node; foreign-key cascades take the whole subtree with it.
/// Returns how many questions went away.
pub fn delete_node(conn: &mut Connection, level: Level, id: i64) -> Result<i64, ApiError> {
    let tx = conn.transaction()?;
    let removed: i64 = tx.query_row(level.subtree_questions_sql(), [id], |r| r.get(0))?;
    let sql = format!("DELETE FROM {} WHERE {} = ?", level.table(), level.id_col());
    let changed = tx.execute(&sql, [id])?;
    if changed == 0 {
        return Err(ApiError::not_found(format!("{} not found", level.label())));
    }
    tx.commit()?;
    Ok(removed)
}

fn required_name(level: Level, body: &Value) -> Result<String, ApiError> {
    field_string(body, level.name_col())
        .ok_or_else(|| ApiError::validation(format!("{} name is required", level.label())))
}

async fn list(state: &AppState, level: Level, parent_id: Option<i64>) -> Result<Json<Value>, ApiError> {
    let rows = state
        .with_db(move |conn| list_nodes(conn, level, parent_id))
        .await?;
    Ok(ok(json!({ level.list_key(): rows })))
}

async fn create(state: &AppState, level: Level, body: Value) -> Result<(StatusCode, Json<Value>), ApiError> {
    let name = field_string(&body, level.name_col());
    let parent_raw = level.parent().map(|p| field_string(&body, p.id_col()));

    let (name, parent_id) = match (name, parent_raw) {
        (Some(name), None) => (name, None),
        (Some(name), Some(Some(raw))) => {
            let pid = raw
                .parse::<i64>()
                .map_err(|_| ApiError::validation(format!("invalid parent id: {raw}")))?;
            (name, Some(pid))
        }
        (_, Some(_)) => {
            let p = level.parent().map(Level::label).unwrap_or_default();
            return Err(ApiError::validation(format!(
                "{} name and {} ID are required",
                level.label(),
                p.to_ascii_lowercase()
            )));
        }
        (None, None) => return Err(ApiError::validation(format!("{} name is required", level.label()))),
    };

    let id = state
        .with_db(move |conn| insert_node(conn, level, &name, parent_id))
        .await?;
    tracing::info!(kind = level.label(), id, "content node created");
    Ok(created(json!({
        "message": format!("{} created successfully", level.label()),
        level.id_col(): id,
    })))
}

async fn rename(state: &AppState, level: Level, id: i64, body: Value) -> Result<Json<Value>, ApiError> {
    let name = required_name(level, &body)?;
    state
        .with_db(move |conn| rename_node(conn, level, id, &name))
        .await?;
    tracing::info!(kind = level.label(), id, "content node renamed");
    Ok(ok(json!({ "message": format!("{} updated successfully", level.label()) })))
}

async fn remove(state: &AppState, level: Level, id: i64) -> Result<Json<Value>, ApiError> {
    let removed = state
        .with_db(move |conn| delete_node(conn, level, id))
        .await?;
    tracing::info!(kind = level.label(), id, removed_questions = removed, "content node deleted");
    Ok(ok(json!({
        "message": format!("{} deleted successfully", level.label()),
        "removedQuestions": removed,
    })))
}

async fn categories_list(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Value>, ApiError> {
    list(&state, Level::Category, None).await
}

async fn categories_create(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(&state, Level::Category, body).await
}

async fn categories_update(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
    JsonBody(body): JsonBody,
) -> Result<Json<Value>, ApiError> {
    rename(&state, Level::Category, id, body).await
}

async fn categories_delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
) -> Result<Json<Value>, ApiError> {
    remove(&state, Level::Category, id).await
}

async fn subjects_list(
    State(state): State<AppState>,
    _user: AuthUser,
    IdParam(category_id): IdParam,
) -> Result<Json<Value>, ApiError> {
    list(&state, Level::Subject, Some(category_id)).await
}

async fn subjects_create(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(&state, Level::Subject, body).await
}

async fn subjects_update(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
    JsonBody(body): JsonBody,
) -> Result<Json<Value>, ApiError> {
    rename(&state, Level::Subject, id, body).await
}

async fn subjects_delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
) -> Result<Json<Value>, ApiError> {
    remove(&state, Level::Subject, id).await
}

async fn topics_list(
    State(state): State<AppState>,
    _user: AuthUser,
    IdParam(subject_id): IdParam,
) -> Result<Json<Value>, ApiError> {
    list(&state, Level::Topic, Some(subject_id)).await
}

async fn topics_create(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    create(&state, Level::Topic, body).await
}

async fn topics_update(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
    JsonBody(body): JsonBody,
) -> Result<Json<Value>, ApiError> {
    rename(&state, Level::Topic, id, body).await
}

async fn topics_delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
) -> Result<Json<Value>, ApiError> {
    remove(&state, Level::Topic, id).await
}

// GET on `/subjects/{id}` and `/topics/{id}` takes the *parent* id, while
// PUT and DELETE take the node's own id.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(categories_list).post(categories_create))
        .route("/categories/{id}", put(categories_update).delete(categories_delete))
        .route("/subjects", post(subjects_create))
        .route(
            "/subjects/{id}",
            get(subjects_list).put(subjects_update).delete(subjects_delete),
        )
        .route("/topics", post(topics_create))
        .route(
            "/topics/{id}",
            get(topics_list).put(topics_update).delete(topics_delete),
        )
}
