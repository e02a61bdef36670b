use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::api::error::{created, ok, ApiError};
use crate::api::handlers::content::{node_exists, Level};
use crate::api::session::AdminUser;
use crate::api::types::{AppState, IdParam, JsonBody};
use crate::model::{effective_answer, NewQuestion, QuestionBody};

const QUESTION_SELECT: &str = "SELECT
       q.question_id,
       q.topic_id,
       q.question_type,
       q.question_text,
       q.option_A,
       q.option_B,
       q.option_C,
       q.option_D,
       q.correct_answer,
       q.flowchart_image,
       q.created_at,
       pq.language,
       pq.starter_code,
       pq.expected_output
     FROM questions q
     LEFT JOIN programming_questions pq ON pq.question_id = q.question_id";

fn question_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let question_type: String = row.get(2)?;
    let correct_answer: Option<String> = row.get(8)?;
    let expected_output: Option<String> = row.get(13)?;
    let answer = effective_answer(&question_type, correct_answer.clone(), expected_output.clone());
    Ok(json!({
        "question_id": row.get::<_, i64>(0)?,
        "topic_id": row.get::<_, Option<i64>>(1)?,
        "question_type": question_type,
        "question_text": row.get::<_, String>(3)?,
        "option_A": row.get::<_, Option<String>>(4)?,
        "option_B": row.get::<_, Option<String>>(5)?,
        "option_C": row.get::<_, Option<String>>(6)?,
        "option_D": row.get::<_, Option<String>>(7)?,
        "correct_answer": correct_answer,
        "flowchart_image": row.get::<_, Option<String>>(9)?,
        "created_at": row.get::<_, String>(10)?,
        "language": row.get::<_, Option<String>>(11)?,
        "starter_code": row.get::<_, Option<String>>(12)?,
        "expected_output": expected_output,
        "answer": answer,
    }))
}

/// Writes the question row and, for programming questions, its satellite
/// row in one transaction.
pub fn insert_question(conn: &mut Connection, q: &NewQuestion) -> Result<i64, ApiError> {
    if !node_exists(conn, Level::Topic, q.topic_id)? {
        return Err(ApiError::not_found("Topic not found"));
    }

    let tx = conn.transaction()?;
    let cols = q.body.columns();
    tx.execute(
        "INSERT INTO questions(
           topic_id,
           question_type,
           question_text,
           option_A,
           option_B,
           option_C,
           option_D,
           correct_answer,
           flowchart_image,
           created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
        (
            q.topic_id,
            q.body.question_type().as_str(),
            &q.text,
            cols.options[0],
            cols.options[1],
            cols.options[2],
            cols.options[3],
            cols.correct_answer,
            cols.flowchart_image,
        ),
    )?;
    let question_id = tx.last_insert_rowid();

    if let QuestionBody::Programming {
        language,
        starter_code,
        expected_output,
    } = &q.body
    {
        tx.execute(
            "INSERT INTO programming_questions(question_id, language, starter_code, expected_output)
             VALUES(?, ?, ?, ?)",
            (
                question_id,
                language.as_str(),
                starter_code.as_deref(),
                expected_output.as_deref(),
            ),
        )?;
    }

    tx.commit()?;
    Ok(question_id)
}

pub fn questions_by_topic(conn: &Connection, topic_id: i64) -> Result<Vec<Value>, ApiError> {
    let sql = format!(
        "{QUESTION_SELECT} WHERE q.topic_id = ? ORDER BY q.created_at DESC, q.question_id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([topic_id], question_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn question_by_id(conn: &Connection, id: i64) -> Result<Value, ApiError> {
    let sql = format!("{QUESTION_SELECT} WHERE q.question_id = ?");
    conn.query_row(&sql, [id], question_json)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Question not found"))
}

pub fn delete_question(conn: &Connection, id: i64) -> Result<(), ApiError> {
    let changed = conn.execute("DELETE FROM questions WHERE question_id = ?", [id])?;
    if changed == 0 {
        return Err(ApiError::not_found("Question not found"));
    }
    Ok(())
}

async fn questions_create(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let question = NewQuestion::from_json(&body).map_err(ApiError::Validation)?;
    let question_type = question.body.question_type().as_str();
    let topic_id = question.topic_id;
    let question_id = state
        .with_db(move |conn| insert_question(conn, &question))
        .await?;
    tracing::info!(question_id, topic_id, question_type, "question created");
    Ok(created(json!({
        "message": "Question created successfully",
        "question_id": question_id,
    })))
}

async fn questions_by_topic_get(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(topic_id): IdParam,
) -> Result<Json<Value>, ApiError> {
    let questions = state
        .with_db(move |conn| questions_by_topic(conn, topic_id))
        .await?;
    Ok(ok(json!({ "questions": questions })))
}

async fn question_get(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
) -> Result<Json<Value>, ApiError> {
    let question = state.with_db(move |conn| question_by_id(conn, id)).await?;
    Ok(ok(json!({ "question": question })))
}

async fn question_delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
) -> Result<Json<Value>, ApiError> {
    state.with_db(move |conn| delete_question(conn, id)).await?;
    tracing::info!(question_id = id, "question deleted");
    Ok(ok(json!({ "message": "Question deleted successfully" })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/questions", post(questions_create))
        .route("/questions/topic/{id}", get(questions_by_topic_get))
        .route("/questions/{id}", get(question_get).delete(question_delete))
}
