use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::api::error::{created, ok, ApiError};
use crate::api::helpers::{like_contains, Page};
use crate::api::session::{AdminUser, ROLE_STUDENT};
use crate::api::types::{AppState, IdParam, JsonBody};
use crate::model::{FieldError, StudentFields};
use crate::password;

const STUDENT_COLUMNS: &str = "id, name, roll_no, year_of_study, department, college_name, mobile_no, email, created_at";

fn student_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, i64>(0)?,
        "name": row.get::<_, String>(1)?,
        "roll_no": row.get::<_, Option<String>>(2)?,
        "year_of_study": row.get::<_, Option<i64>>(3)?,
        "department": row.get::<_, Option<String>>(4)?,
        "college_name": row.get::<_, Option<String>>(5)?,
        "mobile_no": row.get::<_, String>(6)?,
        "email": row.get::<_, String>(7)?,
        "created_at": row.get::<_, String>(8)?,
    }))
}

/// Friendly duplicate check ahead of the write. The unique indexes remain
/// the authority; this only picks the message. Email wins when both match.
/// `email` carries `COLLATE NOCASE`, so both sides compare ignoring ASCII case.
fn find_duplicate(
    conn: &Connection,
    email: &str,
    roll_no: &str,
    exclude_id: Option<i64>,
) -> Result<Option<&'static str>, ApiError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT email FROM users
             WHERE (email = ?1 OR roll_no = ?2) AND id != ?3
             ORDER BY (email = ?1) DESC
             LIMIT 1",
            (email, roll_no, exclude_id.unwrap_or(-1)),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.map(|e| {
        if e.eq_ignore_ascii_case(email) {
            "Email already exists"
        } else {
            "Roll number already exists"
        }
    }))
}

pub const MAX_BULK_ROWS: usize = 500;

pub fn count_students(conn: &Connection) -> Result<i64, ApiError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE user_role = ?",
        [ROLE_STUDENT],
        |r| r.get(0),
    )?)
}

/// `password_hash` is computed by the caller, outside the database lock.
pub fn insert_student(conn: &Connection, s: &StudentFields, password_hash: &str) -> Result<i64, ApiError> {
    if let Some(msg) = find_duplicate(conn, &s.email, &s.roll_no, None)? {
        return Err(ApiError::conflict(msg));
    }
    insert_student_row(conn, s, password_hash)?;
    Ok(conn.last_insert_rowid())
}

fn insert_student_row(conn: &Connection, s: &StudentFields, password_hash: &str) -> Result<(), ApiError> {
    conn.execute(
        "INSERT INTO users(
           name,
           roll_no,
           year_of_study,
           department,
           college_name,
           mobile_no,
           email,
           password_hash,
           user_role,
           created_at,
           updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?,
                  strftime('%Y-%m-%dT%H:%M:%fZ','now'),
                  strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
        (
            &s.name,
            &s.roll_no,
            s.year_of_study,
            &s.department,
            &s.college_name,
            &s.mobile_no,
            &s.email,
            password_hash,
            ROLE_STUDENT,
        ),
    )?;
    Ok(())
}

/// Parses every row and rejects duplicates inside the batch. Touches no
/// storage.
pub fn parse_bulk(rows: &[Value]) -> Result<Vec<StudentFields>, ApiError> {
    if rows.len() > MAX_BULK_ROWS {
        return Err(ApiError::validation(format!(
            "Too many students in one request (max {MAX_BULK_ROWS})"
        )));
    }
    let mut parsed = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let s = StudentFields::from_json(row, true).map_err(|e| match e {
            FieldError::Missing(field) => {
                ApiError::validation(format!("Missing {field} for student at row {}", i + 1))
            }
            FieldError::Invalid(_, msg) => {
                ApiError::validation(format!("{msg} for student at row {}", i + 1))
            }
        })?;
        parsed.push(s);
    }

    let mut seen_emails: HashMap<String, usize> = HashMap::new();
    let mut seen_rolls: HashMap<&str, usize> = HashMap::new();
    for (i, s) in parsed.iter().enumerate() {
        if let Some(first) = seen_emails.insert(s.email.to_ascii_lowercase(), i) {
            return Err(ApiError::conflict(format!(
                "Duplicate email at rows {} and {}",
                first + 1,
                i + 1
            )));
        }
        if let Some(first) = seen_rolls.insert(s.roll_no.as_str(), i) {
            return Err(ApiError::conflict(format!(
                "Duplicate roll number at rows {} and {}",
                first + 1,
                i + 1
            )));
        }
    }
    Ok(parsed)
}

pub fn check_bulk_conflicts(conn: &Connection, students: &[StudentFields]) -> Result<(), ApiError> {
    for (i, s) in students.iter().enumerate() {
        if let Some(msg) = find_duplicate(conn, &s.email, &s.roll_no, None)? {
            return Err(ApiError::conflict(format!("{msg} (row {})", i + 1)));
        }
    }
    Ok(())
}

/// Inserts the whole batch in one transaction, re-checking stored rows
/// inside it. Any duplicate rejects the batch.
pub fn insert_students_bulk(
    conn: &mut Connection,
    students: &[StudentFields],
    hashes: &[String],
) -> Result<usize, ApiError> {
    let tx = conn.transaction()?;
    check_bulk_conflicts(&tx, students)?;
    for (s, hash) in students.iter().zip(hashes) {
        insert_student_row(&tx, s, hash)?;
    }
    tx.commit()?;
    Ok(students.len())
}

pub fn list_students(conn: &Connection, page: Page) -> Result<(Vec<Value>, i64), ApiError> {
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM users
         WHERE user_role = ?
         ORDER BY created_at DESC, id DESC
         LIMIT ? OFFSET ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((ROLE_STUDENT, page.limit, page.offset()), student_json)?
        .collect::<Result<Vec<_>, _>>()?;
    let total = count_students(conn)?;
    Ok((rows, total))
}

/// Case-insensitive substring match on `name`, Unicode-aware through the
/// `fold_case` function registered at bootstrap.
pub fn search_students(conn: &Connection, term: &str, page: Page) -> Result<(Vec<Value>, i64), ApiError> {
    let pattern = like_contains(&term.to_lowercase());
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM users
         WHERE user_role = ? AND fold_case(name) LIKE ? ESCAPE '\\'
         ORDER BY created_at DESC, id DESC
         LIMIT ? OFFSET ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((ROLE_STUDENT, &pattern, page.limit, page.offset()), student_json)?
        .collect::<Result<Vec<_>, _>>()?;
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE user_role = ? AND fold_case(name) LIKE ? ESCAPE '\\'",
        (ROLE_STUDENT, &pattern),
        |r| r.get(0),
    )?;
    Ok((rows, total))
}

/// With `password_hash = None` the stored hash is left untouched.
pub fn update_student(
    conn: &Connection,
    id: i64,
    s: &StudentFields,
    password_hash: Option<&str>,
) -> Result<(), ApiError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM users WHERE id = ? AND user_role = ?",
            (id, ROLE_STUDENT),
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(ApiError::not_found("Student not found"));
    }

    if let Some(msg) = find_duplicate(conn, &s.email, &s.roll_no, Some(id))? {
        return Err(ApiError::conflict(msg));
    }

    // Two statement shapes: without a new password the column must not
    // appear in the SET clause at all.
    let changed = match password_hash {
        Some(password_hash) => conn.execute(
            "UPDATE users
             SET name = ?,
                 roll_no = ?,
                 year_of_study = ?,
                 department = ?,
                 college_name = ?,
                 mobile_no = ?,
                 email = ?,
                 password_hash = ?,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE id = ? AND user_role = ?",
            (
                &s.name,
                &s.roll_no,
                s.year_of_study,
                &s.department,
                &s.college_name,
                &s.mobile_no,
                &s.email,
                password_hash,
                id,
                ROLE_STUDENT,
            ),
        )?,
        None => conn.execute(
            "UPDATE users
             SET name = ?,
                 roll_no = ?,
                 year_of_study = ?,
                 department = ?,
                 college_name = ?,
                 mobile_no = ?,
                 email = ?,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
             WHERE id = ? AND user_role = ?",
            (
                &s.name,
                &s.roll_no,
                s.year_of_study,
                &s.department,
                &s.college_name,
                &s.mobile_no,
                &s.email,
                id,
                ROLE_STUDENT,
            ),
        )?,
    };
    if changed == 0 {
        return Err(ApiError::not_found("Student not found or no changes made"));
    }
    Ok(())
}

pub fn delete_student(conn: &Connection, id: i64) -> Result<(), ApiError> {
    let changed = conn.execute(
        "DELETE FROM users WHERE id = ? AND user_role = ?",
        (id, ROLE_STUDENT),
    )?;
    if changed == 0 {
        return Err(ApiError::not_found("Student not found"));
    }
    Ok(())
}

async fn add_student(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let fields = StudentFields::from_json(&body, true).map_err(|e| match e {
        FieldError::Missing(_) => ApiError::validation("All fields are required"),
        FieldError::Invalid(_, msg) => ApiError::Validation(msg),
    })?;
    let Some(plain) = fields.password.clone() else {
        return Err(ApiError::validation("All fields are required"));
    };
    let password_hash = password::hash_off_thread(plain).await?;
    let student_id = state
        .with_db(move |conn| insert_student(conn, &fields, &password_hash))
        .await?;
    tracing::info!(student_id, "student added");
    Ok(created(json!({
        "message": "Student added successfully",
        "studentId": student_id,
    })))
}

async fn add_students_bulk(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let students = match body.get("students") {
        Some(Value::Array(rows)) if !rows.is_empty() => parse_bulk(rows)?,
        _ => return Err(ApiError::validation("Invalid students data")),
    };
    let students = state
        .with_db(move |conn| check_bulk_conflicts(conn, &students).map(|()| students))
        .await?;
    let passwords = students
        .iter()
        .map(|s| s.password.clone().unwrap_or_default())
        .collect();
    let hashes = password::hash_all(passwords).await?;
    let count = state
        .with_db(move |conn| insert_students_bulk(conn, &students, &hashes))
        .await?;
    tracing::info!(count, "students added in bulk");
    Ok(created(json!({
        "message": format!("Successfully added {count} students"),
        "count": count,
    })))
}

async fn students_count(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Value>, ApiError> {
    let count = state.with_db(|conn| count_students(conn)).await?;
    Ok(ok(json!({ "count": count })))
}

async fn students_list(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let page = Page::from_query(&query);
    let (students, total) = state
        .with_db(move |conn| list_students(conn, page))
        .await?;
    Ok(ok(json!({
        "students": students,
        "pagination": page.describe(total),
    })))
}

async fn students_search(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let term = query
        .get("term")
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    if term.is_empty() {
        return Err(ApiError::validation("Search term is required"));
    }
    let page = Page::from_query(&query);
    let (students, total) = state
        .with_db(move |conn| search_students(conn, &term, page))
        .await?;
    Ok(ok(json!({
        "students": students,
        "pagination": page.describe(total),
    })))
}

async fn student_update(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
    JsonBody(body): JsonBody,
) -> Result<Json<Value>, ApiError> {
    let fields = StudentFields::from_json(&body, false).map_err(|e| match e {
        FieldError::Missing(_) => ApiError::validation("All fields except password are required"),
        FieldError::Invalid(_, msg) => ApiError::Validation(msg),
    })?;
    let password_hash = match fields.password.clone() {
        Some(plain) => Some(password::hash_off_thread(plain).await?),
        None => None,
    };
    let password_changed = password_hash.is_some();
    state
        .with_db(move |conn| update_student(conn, id, &fields, password_hash.as_deref()))
        .await?;
    tracing::info!(student_id = id, password_changed, "student updated");
    Ok(ok(json!({ "message": "Student updated successfully" })))
}

async fn student_delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    IdParam(id): IdParam,
) -> Result<Json<Value>, ApiError> {
    state.with_db(move |conn| delete_student(conn, id)).await?;
    tracing::info!(student_id = id, "student deleted");
    Ok(ok(json!({ "message": "Student deleted successfully" })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/add-student", post(add_student))
        .route("/add-students-bulk", post(add_students_bulk))
        .route("/students-count", get(students_count))
        .route("/students", get(students_list))
        .route("/search-students", get(students_search))
        .route("/student/{id}", put(student_update).delete(student_delete))
}
