use serde_json::{json, Value};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct Server {
    child: Child,
    _stdout: BufReader<ChildStdout>,
    base: String,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_server(data_dir: &Path) -> Server {
    let exe = env!("CARGO_BIN_EXE_assessmated");
    let mut child = Command::new(exe)
        .arg("--address")
        .arg("127.0.0.1:0")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--admin-email")
        .arg("admin@assessmate.com")
        .arg("--admin-password")
        .arg("admin123")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn assessmated");
    let stdout = child.stdout.take().expect("child stdout");
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    reader.read_line(&mut line).expect("read listening line");
    let base = line
        .trim()
        .strip_prefix("listening on ")
        .unwrap_or_else(|| panic!("unexpected first line: {line:?}"))
        .to_string();
    Server {
        child,
        _stdout: reader,
        base,
    }
}

fn send(req: ureq::Request, body: Option<Value>) -> (u16, Value) {
    let result = match body {
        Some(b) => req.send_json(b),
        None => req.call(),
    };
    match result {
        Ok(resp) => {
            let status = resp.status();
            (status, resp.into_json().expect("json body"))
        }
        Err(ureq::Error::Status(status, resp)) => (status, resp.into_json().expect("json error body")),
        Err(e) => panic!("transport error: {e}"),
    }
}

fn call(server: &Server, method: &str, path: &str, token: Option<&str>, body: Option<Value>) -> (u16, Value) {
    let mut req = ureq::request(method, &format!("{}/api{}", server.base, path));
    if let Some(t) = token {
        req = req.set("Authorization", &format!("Bearer {t}"));
    }
    send(req, body)
}

fn login(server: &Server, email: &str, password: &str) -> String {
    let (status, v) = call(
        server,
        "POST",
        "/login",
        None,
        Some(json!({ "email": email, "password": password })),
    );
    assert_eq!(status, 200, "{v}");
    v["token"].as_str().expect("token").to_string()
}

fn admin_token(server: &Server) -> String {
    login(server, "admin@assessmate.com", "admin123")
}

fn student(n: usize) -> Value {
    json!({
        "name": format!("Student {n}"),
        "roll_no": format!("R{n:03}"),
        "year_of_study": "3",
        "department": "CSE",
        "college_name": "GCT",
        "mobile_no": "9000000000",
        "email": format!("s{n}@example.com"),
        "password": "pw123"
    })
}

fn password_hash(data_dir: &Path, id: i64) -> String {
    let conn = rusqlite::Connection::open(data_dir.join("assessmate.sqlite3")).expect("open db");
    conn.query_row("SELECT password_hash FROM users WHERE id = ?", [id], |r| r.get(0))
        .expect("password hash")
}

#[test]
fn add_student_validates_and_reports_conflicts() {
    let dir = temp_dir("assessmate-roster-add");
    let server = spawn_server(&dir);
    let admin = admin_token(&server);

    let mut incomplete = student(1);
    incomplete.as_object_mut().expect("object").remove("department");
    let (status, v) = call(&server, "POST", "/add-student", Some(&admin), Some(incomplete));
    assert_eq!(status, 400);
    assert_eq!(v["message"], "All fields are required");

    let (status, v) = call(&server, "POST", "/add-student", Some(&admin), Some(student(1)));
    assert_eq!(status, 201);
    assert_eq!(v["message"], "Student added successfully");

    let (status, v) = call(&server, "POST", "/add-student", Some(&admin), Some(student(1)));
    assert_eq!(status, 400);
    assert_eq!(v["code"], "conflict");
    assert_eq!(v["message"], "Email already exists");

    let mut same_roll = student(2);
    same_roll["roll_no"] = json!("R001");
    let (status, v) = call(&server, "POST", "/add-student", Some(&admin), Some(same_roll));
    assert_eq!(status, 400);
    assert_eq!(v["message"], "Roll number already exists");

    let (_, v) = call(&server, "GET", "/students-count", Some(&admin), None);
    assert_eq!(v["count"], 1);
}

#[test]
fn listing_pages_newest_first_and_hides_admins() {
    let dir = temp_dir("assessmate-roster-pages");
    let server = spawn_server(&dir);
    let admin = admin_token(&server);

    let rows: Vec<Value> = (1..=12).map(student).collect();
    let (status, v) = call(
        &server,
        "POST",
        "/add-students-bulk",
        Some(&admin),
        Some(json!({ "students": rows })),
    );
    assert_eq!(status, 201, "{v}");
    assert_eq!(v["count"], 12);

    let (status, v) = call(&server, "GET", "/students?page=1&limit=10", Some(&admin), None);
    assert_eq!(status, 200);
    let students = v["students"].as_array().expect("students");
    assert_eq!(students.len(), 10);
    assert!(students.iter().all(|s| s["email"] != "admin@assessmate.com"));
    assert!(students.iter().all(|s| s.get("password_hash").is_none()));
    let p = &v["pagination"];
    assert_eq!(p["currentPage"], 1);
    assert_eq!(p["totalPages"], 2);
    assert_eq!(p["totalStudents"], 12);
    assert_eq!(p["hasNext"], true);
    assert_eq!(p["hasPrev"], false);

    let (_, v) = call(&server, "GET", "/students?page=2&limit=10", Some(&admin), None);
    assert_eq!(v["students"].as_array().expect("students").len(), 2);
    assert_eq!(v["pagination"]["hasNext"], false);
    assert_eq!(v["pagination"]["hasPrev"], true);

    let (_, v) = call(&server, "GET", "/students?page=abc&limit=0", Some(&admin), None);
    assert_eq!(v["pagination"]["currentPage"], 1);
    assert_eq!(v["pagination"]["limit"], 10);
}

#[test]
fn bulk_add_is_all_or_nothing() {
    let dir = temp_dir("assessmate-roster-bulk");
    let server = spawn_server(&dir);
    let admin = admin_token(&server);

    let (status, v) = call(&server, "POST", "/add-students-bulk", Some(&admin), Some(json!({ "students": [] })));
    assert_eq!(status, 400);
    assert_eq!(v["message"], "Invalid students data");

    let mut missing = student(2);
    missing.as_object_mut().expect("object").remove("mobile_no");
    let (status, v) = call(
        &server,
        "POST",
        "/add-students-bulk",
        Some(&admin),
        Some(json!({ "students": [student(1), missing] })),
    );
    assert_eq!(status, 400);
    assert_eq!(v["message"], "Missing mobile_no for student at row 2");

    let mut dup = student(2);
    dup["email"] = json!("s1@example.com");
    let (status, v) = call(
        &server,
        "POST",
        "/add-students-bulk",
        Some(&admin),
        Some(json!({ "students": [student(1), dup] })),
    );
    assert_eq!(status, 400);
    assert_eq!(v["code"], "conflict");

    let (_, v) = call(&server, "GET", "/students-count", Some(&admin), None);
    assert_eq!(v["count"], 0);
}

#[test]
fn search_matches_names_case_insensitively() {
    let dir = temp_dir("assessmate-roster-search");
    let server = spawn_server(&dir);
    let admin = admin_token(&server);

    let mut priya = student(1);
    priya["name"] = json!("Priya Raman");
    let mut arun = student(2);
    arun["name"] = json!("Arun Kumar");
    call(&server, "POST", "/add-student", Some(&admin), Some(priya));
    call(&server, "POST", "/add-student", Some(&admin), Some(arun));

    let (status, v) = call(&server, "GET", "/search-students?term=%20%20", Some(&admin), None);
    assert_eq!(status, 400);
    assert_eq!(v["message"], "Search term is required");

    let (status, v) = call(&server, "GET", "/search-students?term=pRiYa", Some(&admin), None);
    assert_eq!(status, 200);
    let names: Vec<&str> = v["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Priya Raman"]);
    assert_eq!(v["pagination"]["totalStudents"], 1);
}

#[test]
fn update_keeps_password_unless_given_and_delete_spares_admins() {
    let dir = temp_dir("assessmate-roster-update");
    let server = spawn_server(&dir);
    let admin = admin_token(&server);

    let (_, v) = call(&server, "POST", "/add-student", Some(&admin), Some(student(1)));
    let id = v["studentId"].as_i64().expect("studentId");
    let before = password_hash(&dir, id);

    let mut patch = student(1);
    patch.as_object_mut().expect("object").remove("password");
    patch["department"] = json!("ECE");
    let (status, v) = call(&server, "PUT", &format!("/student/{id}"), Some(&admin), Some(patch.clone()));
    assert_eq!(status, 200, "{v}");
    assert_eq!(password_hash(&dir, id), before);

    patch["password"] = json!("");
    let (status, _) = call(&server, "PUT", &format!("/student/{id}"), Some(&admin), Some(patch.clone()));
    assert_eq!(status, 200);
    assert_eq!(password_hash(&dir, id), before);

    patch["password"] = json!("fresh-pw");
    call(&server, "PUT", &format!("/student/{id}"), Some(&admin), Some(patch));
    assert_ne!(password_hash(&dir, id), before);
    login(&server, "s1@example.com", "fresh-pw");

    let (_, v) = call(&server, "GET", "/students", Some(&admin), None);
    assert_eq!(v["students"][0]["department"], "ECE");

    let (status, v) = call(&server, "PUT", "/student/9999", Some(&admin), Some(student(5)));
    assert_eq!(status, 404);
    assert_eq!(v["message"], "Student not found");

    let (status, _) = call(&server, "DELETE", "/student/1", Some(&admin), None);
    assert_eq!(status, 404);
    let (status, _) = call(&server, "GET", "/students-count", Some(&admin), None);
    assert_eq!(status, 200);

    let (status, v) = call(&server, "DELETE", &format!("/student/{id}"), Some(&admin), None);
    assert_eq!(status, 200);
    assert_eq!(v["message"], "Student deleted successfully");
    let (_, v) = call(&server, "GET", "/students-count", Some(&admin), None);
    assert_eq!(v["count"], 0);
}
