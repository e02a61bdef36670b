pub mod auth;
pub mod content;
pub mod core;
pub mod questions;
pub mod students;
pub mod uploads;
