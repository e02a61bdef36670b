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
        "year_of_study": 2,
        "department": "CSE",
        "college_name": "GCT",
        "mobile_no": "9000000000",
        "email": format!("s{n}@example.com"),
        "password": "pw123"
    })
}

#[test]
fn health_is_public_and_everything_else_needs_a_session() {
    let dir = temp_dir("assessmate-auth-gate");
    let server = spawn_server(&dir);

    let (status, v) = call(&server, "GET", "/health", None, None);
    assert_eq!(status, 200);
    assert_eq!(v["success"], true);
    assert_eq!(v["status"], "OK");

    let (status, v) = call(&server, "GET", "/categories", None, None);
    assert_eq!(status, 401);
    assert_eq!(v["success"], false);
    assert_eq!(v["code"], "unauthorized");

    let (status, _) = call(&server, "GET", "/students", Some("not-a-real-token"), None);
    assert_eq!(status, 401);
}

#[test]
fn login_rejects_bad_credentials_alike() {
    let dir = temp_dir("assessmate-auth-login");
    let server = spawn_server(&dir);

    let (status, v) = call(&server, "POST", "/login", None, Some(json!({ "email": "admin@assessmate.com" })));
    assert_eq!(status, 400);
    assert_eq!(v["message"], "Email and password are required");

    let (s1, wrong) = call(
        &server,
        "POST",
        "/login",
        None,
        Some(json!({ "email": "admin@assessmate.com", "password": "nope" })),
    );
    let (s2, unknown) = call(
        &server,
        "POST",
        "/login",
        None,
        Some(json!({ "email": "ghost@example.com", "password": "admin123" })),
    );
    assert_eq!((s1, s2), (401, 401));
    assert_eq!(wrong["message"], unknown["message"]);
    assert_eq!(wrong["message"], "Invalid email or password");

    let (status, v) = call(
        &server,
        "POST",
        "/login",
        None,
        Some(json!({ "email": "admin@assessmate.com", "password": "admin123" })),
    );
    assert_eq!(status, 200);
    assert_eq!(v["user"]["user_role"], 0);
    assert!(v["expiresAt"].as_str().is_some());

    let token = login(&server, "Admin@AssessMate.COM", "admin123");
    let (status, _) = call(&server, "GET", "/students-count", Some(&token), None);
    assert_eq!(status, 200);
}

#[test]
fn student_emails_are_unique_ignoring_case() {
    let dir = temp_dir("assessmate-auth-email-case");
    let server = spawn_server(&dir);
    let token = admin_token(&server);

    let (status, _) = call(&server, "POST", "/add-student", Some(&token), Some(student(1)));
    assert_eq!(status, 201);
    let mut shouting = student(2);
    shouting["email"] = json!("S1@EXAMPLE.com");
    let (status, v) = call(&server, "POST", "/add-student", Some(&token), Some(shouting));
    assert_eq!(status, 400);
    assert_eq!(v["message"], "Email already exists");

    login(&server, "S1@Example.com", "pw123");
}

#[test]
fn student_sessions_are_limited_to_reads_and_own_profile() {
    let dir = temp_dir("assessmate-auth-roles");
    let server = spawn_server(&dir);
    let admin = admin_token(&server);

    let (status, v) = call(&server, "POST", "/add-student", Some(&admin), Some(student(1)));
    assert_eq!(status, 201, "{v}");
    let student_id = v["studentId"].as_i64().expect("studentId");
    call(&server, "POST", "/add-student", Some(&admin), Some(student(2)));

    let token = login(&server, "s1@example.com", "pw123");

    let (status, v) = call(&server, "GET", "/students", Some(&token), None);
    assert_eq!(status, 403);
    assert_eq!(v["code"], "forbidden");

    let (status, _) = call(
        &server,
        "POST",
        "/categories",
        Some(&token),
        Some(json!({ "category_name": "Sneaky" })),
    );
    assert_eq!(status, 403);

    let (status, v) = call(&server, "GET", "/categories", Some(&token), None);
    assert_eq!(status, 200);
    assert!(v["categories"].is_array());

    let (status, v) = call(&server, "GET", &format!("/profile/{student_id}"), Some(&token), None);
    assert_eq!(status, 200);
    assert_eq!(v["user"]["email"], "s1@example.com");
    assert!(v["user"].get("password_hash").is_none());

    let (status, _) = call(&server, "GET", &format!("/profile/{}", student_id + 1), Some(&token), None);
    assert_eq!(status, 403);

    let (status, v) = call(&server, "GET", &format!("/profile/{}", student_id + 1), Some(&admin), None);
    assert_eq!(status, 200);
    assert_eq!(v["user"]["email"], "s2@example.com");

    let (status, _) = call(&server, "GET", "/profile/9999", Some(&admin), None);
    assert_eq!(status, 404);
}

#[test]
fn logout_ends_the_session() {
    let dir = temp_dir("assessmate-auth-logout");
    let server = spawn_server(&dir);
    let admin = admin_token(&server);

    let (status, _) = call(&server, "GET", "/students-count", Some(&admin), None);
    assert_eq!(status, 200);
    let (status, _) = call(&server, "POST", "/logout", Some(&admin), None);
    assert_eq!(status, 200);
    let (status, _) = call(&server, "GET", "/students-count", Some(&admin), None);
    assert_eq!(status, 401);
}

#[test]
fn unknown_routes_use_the_error_envelope() {
    let dir = temp_dir("assessmate-auth-fallback");
    let server = spawn_server(&dir);

    let (status, v) = call(&server, "GET", "/no-such-route", None, None);
    assert_eq!(status, 404);
    assert_eq!(v["success"], false);
    assert_eq!(v["message"], "Route not found");
}
