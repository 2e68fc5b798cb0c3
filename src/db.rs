//! SQLite database with Diesel ORM
//!
//! Stores users, their session tokens and their habits.
//! Tables are created on open, so a fresh path is a usable database.

use crate::config::find_habitual_dir;
use crate::error::{Error, Result};
use crate::schema::*;
use crate::streak::StreakState;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::DatabaseErrorKind;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Env var that overrides where the database lives
pub const DB_PATH_ENV: &str = "HABITUAL_DB_PATH";

/// Use HABITUAL_DB_PATH if set, otherwise the nearest .habitual folder
/// (walking up like git finds .git), otherwise ./.habitual
fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        return PathBuf::from(path);
    }

    match find_habitual_dir() {
        Some(dir) => dir.join("habitual.db"),
        // `habitual init` will create it here
        None => PathBuf::from(".habitual/habitual.db"),
    }
}

/// Current schema version for habitual
pub const CURRENT_SCHEMA: HabitSchema = HabitSchema {
    major: 1,
    minor: 1,
    patch: 0,
    name: "habit-tracker",
    features: &["users", "sessions", "habits", "habit_goals"],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct HabitSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl HabitSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for HabitSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable schema version
#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
pub struct NewSchemaVersion<'a> {
    pub version: &'a str,
    pub name: &'a str,
    pub features: &'a str,
    pub introduced_at: &'a str,
}

/// Queryable schema version
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = schema_versions)]
pub struct StoredSchema {
    pub id: i32,
    pub version: String,
    pub name: String,
    pub features: String,
    pub introduced_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    id: &'a str,
    name: &'a str,
    created_at: &'a str,
}

/// A person who owns habits
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
struct NewSession<'a> {
    token: &'a str,
    user_id: &'a str,
    created_at: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = habits)]
struct NewHabit<'a> {
    id: &'a str,
    user_id: &'a str,
    name: &'a str,
    last_performed: &'a str,
    done: bool,
    streak: i32,
    goal: i32,
    created_at: &'a str,
}

/// Raw habits row; timestamps still text, counters still signed
#[derive(Queryable, Debug, Clone)]
struct HabitRow {
    #[allow(dead_code)]
    seq: i32,
    id: String,
    user_id: String,
    name: String,
    last_performed: String,
    done: bool,
    streak: i32,
    goal: i32,
    #[allow(dead_code)]
    created_at: String,
}

/// A named daily habit owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub last_performed: DateTime<Utc>,
    pub done: bool,
    pub streak: u32,
    pub goal: u32,
}

impl Habit {
    pub fn streak_state(&self) -> StreakState {
        StreakState {
            last_performed: self.last_performed,
            done: self.done,
            streak: self.streak,
            goal: self.goal,
        }
    }
}

impl TryFrom<HabitRow> for Habit {
    type Error = Error;

    fn try_from(row: HabitRow) -> Result<Self> {
        Ok(Habit {
            last_performed: parse_timestamp(&row.last_performed)?,
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            done: row.done,
            // Rows written before clamping may hold negative streaks
            streak: u32::try_from(row.streak).unwrap_or(0),
            goal: u32::try_from(row.goal).unwrap_or(0),
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| Error::Timestamp {
            value: value.to_string(),
            source,
        })
}

/// Counters are u32 in the domain and INTEGER (i32) in SQLite
fn to_column(field: &str, n: u32) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::Validation(format!("{} must be at most {}", field, i32::MAX)))
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// How long to wait for a pooled connection before giving up
const POOL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Database connection wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        get_db_path()
    }

    /// Open database at default path (respects HABITUAL_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        debug!(path = %path_str, "opening database");
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .connection_timeout(POOL_TIMEOUT)
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS habits (
                seq INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                last_performed TEXT NOT NULL,
                done BOOLEAN NOT NULL DEFAULT 0,
                streak INTEGER NOT NULL DEFAULT 0,
                goal INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_habits_user ON habits(user_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)").execute(&mut conn)?;

        self.register_schema(&CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(&self, schema: &HabitSchema) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        let features_json = serde_json::to_string(&schema.features)?;

        let new_schema = NewSchemaVersion {
            version: &schema.version_string(),
            name: schema.name,
            features: &features_json,
            introduced_at: &now,
        };

        diesel::insert_or_ignore_into(schema_versions::table)
            .values(&new_schema)
            .execute(&mut conn)?;

        Ok(())
    }

    /// Schema versions this database has been opened with, oldest first
    pub fn schema_versions(&self) -> Result<Vec<StoredSchema>> {
        let mut conn = self.get_conn()?;
        let versions = schema_versions::table
            .order(schema_versions::id.asc())
            .load::<StoredSchema>(&mut conn)?;
        Ok(versions)
    }

    // ========================================================================
    // Users & Sessions
    // ========================================================================

    /// Register a user. Names are unique.
    pub fn create_user(&self, name: &str) -> Result<User> {
        let mut conn = self.get_conn()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let new_user = NewUser {
            id: &id,
            name,
            created_at: &now,
        };

        match diesel::insert_into(users::table).values(&new_user).execute(&mut conn) {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                return Err(Error::Validation(format!("User '{}' already exists", name)));
            }
            Err(e) => return Err(e.into()),
        }

        debug!(user = %id, "created user");
        Ok(User {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    pub fn find_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let mut conn = self.get_conn()?;
        let user = users::table
            .filter(users::name.eq(name))
            .first::<User>(&mut conn)
            .optional()?;
        Ok(user)
    }

    pub fn get_all_users(&self) -> Result<Vec<User>> {
        let mut conn = self.get_conn()?;
        let all = users::table
            .order(users::created_at.asc())
            .load::<User>(&mut conn)?;
        Ok(all)
    }

    /// Issue a new opaque session token for a user
    pub fn create_session(&self, user_id: &str) -> Result<String> {
        let mut conn = self.get_conn()?;
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now().to_rfc3339();

        diesel::insert_into(sessions::table)
            .values(&NewSession {
                token: &token,
                user_id,
                created_at: &now,
            })
            .execute(&mut conn)?;

        Ok(token)
    }

    /// Owner id behind a session token, if the token is live
    pub fn resolve_session(&self, token: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn()?;
        let user_id = sessions::table
            .filter(sessions::token.eq(token))
            .select(sessions::user_id)
            .first::<String>(&mut conn)
            .optional()?;
        Ok(user_id)
    }

    /// Revoke a session token. Returns false if it wasn't live.
    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let removed = diesel::delete(sessions::table.filter(sessions::token.eq(token)))
            .execute(&mut conn)?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Habit Operations
    // ========================================================================

    /// All habits of one owner, in the order they were created
    pub fn list_habits(&self, owner: &str) -> Result<Vec<Habit>> {
        let mut conn = self.get_conn()?;
        let rows = habits::table
            .filter(habits::user_id.eq(owner))
            .order(habits::seq.asc())
            .load::<HabitRow>(&mut conn)?;
        debug!(owner, count = rows.len(), "listed habits");
        rows.into_iter().map(Habit::try_from).collect()
    }

    /// Create a habit with defaults: not done, no streak, no goal,
    /// last performed at `now`. The name is stored as given.
    pub fn create_habit(&self, owner: &str, name: &str, now: DateTime<Utc>) -> Result<Habit> {
        let mut conn = self.get_conn()?;
        let id = Uuid::new_v4().to_string();
        let created = now.to_rfc3339();

        let new_habit = NewHabit {
            id: &id,
            user_id: owner,
            name,
            last_performed: &created,
            done: false,
            streak: 0,
            goal: 0,
            created_at: &created,
        };

        diesel::insert_into(habits::table)
            .values(&new_habit)
            .execute(&mut conn)?;

        debug!(owner, habit = %id, "created habit");
        self.get_habit(owner, &id)
    }

    /// Fetch one habit, scoped to its owner
    pub fn get_habit(&self, owner: &str, id: &str) -> Result<Habit> {
        let mut conn = self.get_conn()?;
        let row = habits::table
            .filter(habits::id.eq(id))
            .filter(habits::user_id.eq(owner))
            .first::<HabitRow>(&mut conn)
            .optional()?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Habit::try_from(row)
    }

    /// Resolve a full id or a unique id prefix among the owner's habits
    pub fn find_habit(&self, owner: &str, id_or_prefix: &str) -> Result<Habit> {
        if id_or_prefix.is_empty() {
            return Err(Error::Validation("Habit id must not be empty".to_string()));
        }

        let mut matches: Vec<Habit> = self
            .list_habits(owner)?
            .into_iter()
            .filter(|h| h.id.starts_with(id_or_prefix))
            .collect();

        match matches.len() {
            0 => Err(Error::NotFound(id_or_prefix.to_string())),
            1 => Ok(matches.remove(0)),
            n => Err(Error::Validation(format!(
                "Id prefix '{}' matches {} habits; use more characters",
                id_or_prefix, n
            ))),
        }
    }

    /// Overwrite a habit's name and its whole streak state in one statement
    pub fn update_habit(&self, owner: &str, id: &str, name: &str, state: &StreakState) -> Result<Habit> {
        let streak = to_column("streak", state.streak)?;
        let goal = to_column("goal", state.goal)?;
        let mut conn = self.get_conn()?;
        let last_performed = state.last_performed.to_rfc3339();

        let updated = diesel::update(
            habits::table
                .filter(habits::id.eq(id))
                .filter(habits::user_id.eq(owner)),
        )
        .set((
            habits::name.eq(name),
            habits::last_performed.eq(&last_performed),
            habits::done.eq(state.done),
            habits::streak.eq(streak),
            habits::goal.eq(goal),
        ))
        .execute(&mut conn)?;

        if updated == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        debug!(owner, habit = id, streak = state.streak, done = state.done, "updated habit");
        self.get_habit(owner, id)
    }

    pub fn delete_habit(&self, owner: &str, id: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let removed = diesel::delete(
            habits::table
                .filter(habits::id.eq(id))
                .filter(habits::user_id.eq(owner)),
        )
        .execute(&mut conn)?;

        if removed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        debug!(owner, habit = id, "deleted habit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_schema_registered_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        Database::open_at(&path).unwrap();
        let db = Database::open_at(&path).unwrap();

        let versions = db.schema_versions().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, CURRENT_SCHEMA.version_string());
    }

    #[test]
    fn test_schema_display() {
        assert_eq!(CURRENT_SCHEMA.to_string(), "v1.1.0 (habit-tracker)");
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let (_dir, db) = test_db();
        db.create_user("ada").unwrap();
        let err = db.create_user("ada").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_session_lifecycle() {
        let (_dir, db) = test_db();
        let user = db.create_user("ada").unwrap();
        let token = db.create_session(&user.id).unwrap();

        assert_eq!(db.resolve_session(&token).unwrap(), Some(user.id.clone()));
        assert!(db.delete_session(&token).unwrap());
        assert_eq!(db.resolve_session(&token).unwrap(), None);
        assert!(!db.delete_session(&token).unwrap());
    }

    #[test]
    fn test_create_habit_defaults() {
        let (_dir, db) = test_db();
        let user = db.create_user("ada").unwrap();
        let habit = db.create_habit(&user.id, "Read", now()).unwrap();

        assert_eq!(habit.name, "Read");
        assert_eq!(habit.user_id, user.id);
        assert_eq!(habit.last_performed, now());
        assert!(!habit.done);
        assert_eq!(habit.streak, 0);
        assert_eq!(habit.goal, 0);
    }

    #[test]
    fn test_list_is_insertion_ordered_and_owner_scoped() {
        let (_dir, db) = test_db();
        let ada = db.create_user("ada").unwrap();
        let bob = db.create_user("bob").unwrap();

        db.create_habit(&ada.id, "Zebra", now()).unwrap();
        db.create_habit(&bob.id, "Bob's habit", now()).unwrap();
        db.create_habit(&ada.id, "Apple", now()).unwrap();

        let names: Vec<String> = db.list_habits(&ada.id).unwrap().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["Zebra", "Apple"]);
        assert_eq!(db.list_habits(&bob.id).unwrap().len(), 1);
    }

    #[test]
    fn test_update_writes_whole_state() {
        let (_dir, db) = test_db();
        let user = db.create_user("ada").unwrap();
        let habit = db.create_habit(&user.id, "Read", now()).unwrap();

        let state = StreakState {
            last_performed: now() + Duration::days(1),
            done: true,
            streak: 4,
            goal: 10,
        };
        let updated = db.update_habit(&user.id, &habit.id, "Read more", &state).unwrap();

        assert_eq!(updated.name, "Read more");
        assert_eq!(updated.streak_state(), state);
        assert_eq!(db.get_habit(&user.id, &habit.id).unwrap(), updated);
    }

    #[test]
    fn test_update_rejects_counters_that_overflow_the_column() {
        let (_dir, db) = test_db();
        let user = db.create_user("ada").unwrap();
        let habit = db.create_habit(&user.id, "Read", now()).unwrap();

        let mut state = habit.streak_state();
        state.streak = i32::MAX as u32 + 1;
        assert!(matches!(
            db.update_habit(&user.id, &habit.id, "Read", &state),
            Err(Error::Validation(_))
        ));

        state.streak = i32::MAX as u32;
        state.goal = u32::MAX;
        assert!(matches!(
            db.update_habit(&user.id, &habit.id, "Read", &state),
            Err(Error::Validation(_))
        ));
        assert_eq!(db.get_habit(&user.id, &habit.id).unwrap(), habit);
    }

    #[test]
    fn test_unopenable_path_is_pool_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("test.db");
        assert!(matches!(Database::open_at(path).err(), Some(Error::Pool(_))));
    }

    #[test]
    fn test_update_missing_or_foreign_is_not_found() {
        let (_dir, db) = test_db();
        let ada = db.create_user("ada").unwrap();
        let bob = db.create_user("bob").unwrap();
        let habit = db.create_habit(&ada.id, "Read", now()).unwrap();
        let state = habit.streak_state();

        assert!(matches!(
            db.update_habit(&ada.id, "nope", "x", &state),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.update_habit(&bob.id, &habit.id, "mine now", &state),
            Err(Error::NotFound(_))
        ));
        assert_eq!(db.get_habit(&ada.id, &habit.id).unwrap().name, "Read");
    }

    #[test]
    fn test_delete() {
        let (_dir, db) = test_db();
        let ada = db.create_user("ada").unwrap();
        let bob = db.create_user("bob").unwrap();
        let habit = db.create_habit(&ada.id, "Read", now()).unwrap();

        assert!(matches!(db.delete_habit(&bob.id, &habit.id), Err(Error::NotFound(_))));
        db.delete_habit(&ada.id, &habit.id).unwrap();
        assert!(db.list_habits(&ada.id).unwrap().is_empty());
        assert!(matches!(db.delete_habit(&ada.id, &habit.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_find_habit_by_prefix() {
        let (_dir, db) = test_db();
        let user = db.create_user("ada").unwrap();
        let habit = db.create_habit(&user.id, "Read", now()).unwrap();

        assert_eq!(db.find_habit(&user.id, &habit.id[..6]).unwrap().id, habit.id);
        assert_eq!(db.find_habit(&user.id, &habit.id).unwrap().id, habit.id);
        assert!(matches!(db.find_habit(&user.id, "zzzz"), Err(Error::NotFound(_))));
        assert!(matches!(db.find_habit(&user.id, ""), Err(Error::Validation(_))));
    }

    #[test]
    fn test_store_accepts_empty_name() {
        // Name validation belongs to callers
        let (_dir, db) = test_db();
        let user = db.create_user("ada").unwrap();
        assert_eq!(db.create_habit(&user.id, "", now()).unwrap().name, "");
    }

    #[test]
    fn test_negative_stored_streak_reads_as_zero() {
        let (_dir, db) = test_db();
        let user = db.create_user("ada").unwrap();
        let habit = db.create_habit(&user.id, "Read", now()).unwrap();

        let mut conn = db.get_conn().unwrap();
        diesel::update(habits::table.filter(habits::id.eq(&habit.id)))
            .set(habits::streak.eq(-3))
            .execute(&mut conn)
            .unwrap();

        assert_eq!(db.get_habit(&user.id, &habit.id).unwrap().streak, 0);
    }
}
