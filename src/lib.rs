//! Habitual - a personal habit tracker
//!
//! Create habits, check them off once a day, and watch the streak grow.
//!
//! # Overview
//!
//! Each habit belongs to one user and carries a streak: the number of
//! consecutive days it was marked done. Checking a habit off when it was last
//! done today or yesterday extends the streak; after a longer gap the streak
//! starts over at 1. Unchecking steps it back, never below zero.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`calendar`] | Today / yesterday classification by calendar date |
//! | [`streak`] | Next streak state for a check / uncheck |
//! | [`db`] | SQLite storage for users, sessions, habits |
//! | [`api`] | Authenticated habit operations |
//! | [`serve`] | JSON-over-HTTP front door for [`api`] |
//!
//! # Quick Start
//!
//! ```no_run
//! use habitual::{CreateInput, Database, HabitApi, ToggleInput};
//!
//! let db = Database::open_at("habitual.db").unwrap();
//! let user = db.create_user("ada").unwrap();
//! let token = db.create_session(&user.id).unwrap();
//!
//! let api = HabitApi::new(db);
//! let session = api.authenticate(Some(&token)).unwrap();
//! let habit = api.create(&session, &CreateInput { name: "Read".into() }).unwrap();
//!
//! let habit = api.toggle(&session, &ToggleInput { id: habit.id, done: true }).unwrap();
//! println!("{}: streak {}", habit.name, habit.streak);
//! ```

pub mod api;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod init;
pub mod schema;
pub mod serve;
pub mod streak;

pub use api::{CreateInput, HabitApi, IdInput, Session, ToggleInput, UpdateInput};
pub use config::Config;
pub use db::{Database, Habit, User, CURRENT_SCHEMA};
pub use error::{Error, Result};
pub use streak::StreakState;

// Re-export TS trait for downstream use
#[cfg(feature = "ts-rs")]
pub use ts_rs::TS;
