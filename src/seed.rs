use rusqlite::{Connection, OptionalExtension};

use crate::password;

pub struct AdminAccount<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password: &'a str,
}

const ADMIN_MOBILE: &str = "9999999999";

/// Creates the admin account when the store has none. Returns whether one
/// was created.
pub fn ensure_admin(conn: &Connection, admin: &AdminAccount<'_>) -> anyhow::Result<bool> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM users WHERE user_role = 0 LIMIT 1", [], |r| r.get(0))
        .optional()?;
    if existing.is_some() {
        return Ok(false);
    }
    let password_hash = password::hash_password(admin.password)?;
    conn.execute(
        "INSERT INTO users(name, mobile_no, email, password_hash, user_role)
         VALUES(?, ?, ?, ?, 0)",
        (admin.name, ADMIN_MOBILE, admin.email, &password_hash),
    )?;
    tracing::warn!(
        email = admin.email,
        "created default admin account; change its password after first login"
    );
    Ok(true)
}

/// Inserts the default catalog when `categories` is empty. Returns the
/// number of topics written.
pub fn seed_catalog(conn: &mut Connection) -> anyhow::Result<usize> {
    let categories: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))?;
    if categories > 0 {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    let mut topics = 0;
    for (category, subjects) in DEFAULT_CATALOG {
        tx.execute("INSERT INTO categories(category_name) VALUES(?)", [category])?;
        let category_id = tx.last_insert_rowid();
        for (subject, subject_topics) in subjects.iter() {
            tx.execute(
                "INSERT INTO subjects(subject_name, category_id) VALUES(?, ?)",
                (subject, category_id),
            )?;
            let subject_id = tx.last_insert_rowid();
            for topic in subject_topics {
                tx.execute(
                    "INSERT INTO topics(topic_name, subject_id) VALUES(?, ?)",
                    (topic, subject_id),
                )?;
                topics += 1;
            }
        }
    }
    tx.commit()?;
    tracing::info!(topics, "seeded default catalog");
    Ok(topics)
}

type Catalog = &'static [(&'static str, &'static [(&'static str, [&'static str; 10])])];
const DEFAULT_CATALOG: Catalog = &[
    (
        "Software",
        &[
            (
                "C Programming",
                [
                    "Variables and Data Types",
                    "Control Structures",
                    "Loops",
                    "Functions",
                    "Arrays",
                    "Pointers",
                    "Structures",
                    "File Handling",
                    "String Handling",
                    "Memory Management",
                ],
            ),
            (
                "C++ Programming",
                [
                    "Classes and Objects",
                    "Inheritance",
                    "Polymorphism",
                    "Encapsulation",
                    "Templates",
                    "STL",
                    "Exception Handling",
                    "Operator Overloading",
                    "Virtual Functions",
                    "Constructors and Destructors",
                ],
            ),
            (
                "Java Programming",
                [
                    "OOP Concepts",
                    "Collections Framework",
                    "Exception Handling",
                    "Multithreading",
                    "File I/O",
                    "Interfaces",
                    "Abstract Classes",
                    "Packages",
                    "Generics",
                    "Lambda Expressions",
                ],
            ),
            (
                "Python Programming",
                [
                    "Basic Syntax",
                    "Data Structures",
                    "Functions and Modules",
                    "File Operations",
                    "Exception Handling",
                    "OOP in Python",
                    "Libraries and Frameworks",
                    "List Comprehensions",
                    "Decorators",
                    "Generators",
                ],
            ),
            (
                "JavaScript",
                [
                    "DOM Manipulation",
                    "Event Handling",
                    "Async Programming",
                    "Closures",
                    "Prototypes",
                    "ES6 Features",
                    "Promises",
                    "AJAX",
                    "Regular Expressions",
                    "Error Handling",
                ],
            ),
            (
                "Data Structures",
                [
                    "Arrays",
                    "Linked Lists",
                    "Stacks",
                    "Queues",
                    "Trees",
                    "Graphs",
                    "Hash Tables",
                    "Heaps",
                    "Binary Search Trees",
                    "AVL Trees",
                ],
            ),
            (
                "Algorithms",
                [
                    "Sorting Algorithms",
                    "Searching Algorithms",
                    "Graph Algorithms",
                    "Dynamic Programming",
                    "Greedy Algorithms",
                    "Divide and Conquer",
                    "Recursion",
                    "String Algorithms",
                    "Tree Algorithms",
                    "Complexity Analysis",
                ],
            ),
            (
                "Database Management",
                [
                    "SQL Basics",
                    "Joins",
                    "Normalization",
                    "Indexes",
                    "Transactions",
                    "Stored Procedures",
                    "Triggers",
                    "Views",
                    "Database Design",
                    "Query Optimization",
                ],
            ),
            (
                "Web Development",
                [
                    "HTML/CSS",
                    "Responsive Design",
                    "Frontend Frameworks",
                    "Backend Development",
                    "REST APIs",
                    "Authentication",
                    "Web Security",
                    "Performance Optimization",
                    "Testing",
                    "Deployment",
                ],
            ),
            (
                "Software Engineering",
                [
                    "SDLC",
                    "Agile Methodology",
                    "Version Control",
                    "Testing Strategies",
                    "Design Patterns",
                    "Code Review",
                    "Documentation",
                    "Project Management",
                    "Requirements Analysis",
                    "System Design",
                ],
            ),
        ],
    ),
    (
        "Hardware",
        &[
            (
                "Digital Electronics",
                [
                    "Logic Gates",
                    "Boolean Algebra",
                    "Combinational Circuits",
                    "Sequential Circuits",
                    "Flip Flops",
                    "Counters",
                    "Multiplexers",
                    "Decoders",
                    "Adders",
                    "Memory Circuits",
                ],
            ),
            (
                "Computer Architecture",
                [
                    "CPU Design",
                    "Instruction Set",
                    "Pipeline",
                    "Cache Memory",
                    "Memory Hierarchy",
                    "I/O Systems",
                    "Bus Architecture",
                    "Performance Metrics",
                    "Parallel Processing",
                    "RISC vs CISC",
                ],
            ),
            (
                "Microprocessors",
                [
                    "8085 Architecture",
                    "8086 Architecture",
                    "Assembly Language",
                    "Addressing Modes",
                    "Instruction Set",
                    "Interrupts",
                    "Memory Interface",
                    "I/O Interface",
                    "Timers",
                    "Programming",
                ],
            ),
            (
                "Network Hardware",
                [
                    "Network Topologies",
                    "Routers",
                    "Switches",
                    "Hubs",
                    "Network Cards",
                    "Cables and Connectors",
                    "Wireless Hardware",
                    "Network Security Devices",
                    "Load Balancers",
                    "Network Troubleshooting",
                ],
            ),
            (
                "Embedded Systems",
                [
                    "Microcontrollers",
                    "Sensors",
                    "Actuators",
                    "Real-time Systems",
                    "Embedded Programming",
                    "Communication Protocols",
                    "Power Management",
                    "Debugging",
                    "Hardware Design",
                    "IoT Applications",
                ],
            ),
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn admin_is_created_once() {
        let conn = db::open_in_memory();
        let admin = AdminAccount {
            email: "admin@assessmate.com",
            name: "Admin",
            password: "admin123",
        };
        assert!(ensure_admin(&conn, &admin).expect("first"));
        assert!(!ensure_admin(&conn, &admin).expect("second"));
        let hash: String = conn
            .query_row("SELECT password_hash FROM users WHERE user_role = 0", [], |r| r.get(0))
            .expect("hash");
        assert!(password::verify_password("admin123", &hash));
    }

    #[test]
    fn catalog_seeds_only_an_empty_store() {
        let mut conn = db::open_in_memory();
        assert_eq!(seed_catalog(&mut conn).expect("seed"), 150);
        assert_eq!(count(&conn, "categories"), 2);
        assert_eq!(count(&conn, "subjects"), 15);
        assert_eq!(count(&conn, "topics"), 150);
        assert_eq!(seed_catalog(&mut conn).expect("again"), 0);
        assert_eq!(count(&conn, "topics"), 150);
    }
}
