use std::collections::HashMap;

use serde_json::{json, Value};

/// Reads a body field as trimmed text. Numbers are accepted and stringified;
/// missing, null, non-scalar and blank values all read as `None`.
pub fn field_string(params: &Value, key: &str) -> Option<String> {
    let s = match params.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Integer prefix of `raw`, the way form inputs like "3" or "2nd" are meant.
pub fn leading_int(raw: &str) -> Option<i64> {
    let t = raw.trim();
    let (sign, digits) = match t.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, t.strip_prefix('+').unwrap_or(t)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// `%term%` for `LIKE ... ESCAPE '\'`, with the term's own wildcards escaped.
pub fn like_contains(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        Self {
            page: positive_or(query.get("page"), DEFAULT_PAGE),
            limit: positive_or(query.get("limit"), DEFAULT_LIMIT).min(MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            total / self.limit + i64::from(total % self.limit != 0)
        }
    }

    pub fn describe(&self, total: i64) -> Value {
        let total_pages = self.total_pages(total);
        json!({
            "currentPage": self.page,
            "totalPages": total_pages,
            "totalStudents": total,
            "limit": self.limit,
            "hasNext": self.page < total_pages,
            "hasPrev": self.page > 1,
        })
    }
}

fn positive_or(raw: Option<&String>, default: i64) -> i64 {
    raw.and_then(|s| leading_int(s))
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}
