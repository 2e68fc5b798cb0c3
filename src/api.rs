//! Habit API
//!
//! The operations a client can call: list, create, update, delete, plus the
//! server-side toggle and streak reset. Every call takes an authenticated
//! [`Session`]; habits are always looked up by id *and* owner, so a caller
//! can't touch a habit they don't own.
//!
//! Inputs are validated here, before anything reaches the store. This is
//! also the only layer that reads the wall clock.

use crate::db::{Database, Habit};
use crate::error::{Error, Result};
use crate::streak::StreakState;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub struct CreateInput {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct UpdateInput {
    pub id: String,
    pub name: String,
    pub last_performed: DateTime<Utc>,
    pub done: bool,
    pub streak: u32,
    pub goal: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub struct ToggleInput {
    pub id: String,
    pub done: bool,
}

/// Body of delete and reset calls
#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub struct IdInput {
    pub id: String,
}

fn require_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Habit name must not be empty".to_string()));
    }
    Ok(name)
}

fn require_id(id: &str) -> Result<&str> {
    if id.trim().is_empty() {
        return Err(Error::Validation("Habit id must not be empty".to_string()));
    }
    Ok(id)
}

/// Counters are stored as SQLite INTEGER, so anything past i32::MAX is refused
fn require_counter(field: &str, n: u32) -> Result<u32> {
    if n > i32::MAX as u32 {
        return Err(Error::Validation(format!("{} must be at most {}", field, i32::MAX)));
    }
    Ok(n)
}

#[derive(Clone)]
pub struct HabitApi {
    db: Database,
}

impl HabitApi {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Turn a bearer token into a session; no token or an unknown one is Unauthorized
    pub fn authenticate(&self, token: Option<&str>) -> Result<Session> {
        let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(Error::Unauthorized)?;
        match self.db.resolve_session(token)? {
            Some(user_id) => Ok(Session { user_id }),
            None => Err(Error::Unauthorized),
        }
    }

    /// getUserHabits
    pub fn get_user_habits(&self, session: &Session) -> Result<Vec<Habit>> {
        self.db.list_habits(&session.user_id)
    }

    pub fn create(&self, session: &Session, input: &CreateInput) -> Result<Habit> {
        self.create_at(session, input, Utc::now())
    }

    pub fn create_at(&self, session: &Session, input: &CreateInput, now: DateTime<Utc>) -> Result<Habit> {
        let name = require_name(&input.name)?;
        let habit = self.db.create_habit(&session.user_id, name, now)?;
        info!(user = %session.user_id, habit = %habit.id, "habit created");
        Ok(habit)
    }

    /// Overwrite a habit with client-computed state
    pub fn update(&self, session: &Session, input: &UpdateInput) -> Result<Habit> {
        let id = require_id(&input.id)?;
        let name = require_name(&input.name)?;

        let state = StreakState {
            last_performed: input.last_performed,
            done: input.done,
            streak: require_counter("streak", input.streak)?,
            goal: require_counter("goal", input.goal)?,
        };

        let habit = self.db.update_habit(&session.user_id, id, name, &state)?;
        info!(user = %session.user_id, habit = %habit.id, "habit updated");
        Ok(habit)
    }

    pub fn delete(&self, session: &Session, input: &IdInput) -> Result<()> {
        let id = require_id(&input.id)?;
        self.db.delete_habit(&session.user_id, id)?;
        info!(user = %session.user_id, habit = %id, "habit deleted");
        Ok(())
    }

    /// Mark done / not done and reconcile the streak against local time
    pub fn toggle(&self, session: &Session, input: &ToggleInput) -> Result<Habit> {
        self.toggle_at(session, input, &Local::now())
    }

    pub fn toggle_at<Tz: TimeZone>(&self, session: &Session, input: &ToggleInput, now: &DateTime<Tz>) -> Result<Habit> {
        let id = require_id(&input.id)?;
        let habit = self.db.get_habit(&session.user_id, id)?;
        let next = habit.streak_state().reconcile(input.done, now);

        let habit = self.db.update_habit(&session.user_id, id, &habit.name, &next)?;
        info!(
            user = %session.user_id,
            habit = %habit.id,
            done = habit.done,
            streak = habit.streak,
            "habit toggled"
        );
        Ok(habit)
    }

    pub fn reset_streak(&self, session: &Session, input: &IdInput) -> Result<Habit> {
        let id = require_id(&input.id)?;
        let habit = self.db.get_habit(&session.user_id, id)?;
        let next = habit.streak_state().reset_streak();

        let habit = self.db.update_habit(&session.user_id, id, &habit.name, &next)?;
        info!(user = %session.user_id, habit = %habit.id, "streak reset");
        Ok(habit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        api: HabitApi,
        session: Session,
        token: String,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("test.db")).unwrap();
        let user = db.create_user("ada").unwrap();
        let token = db.create_session(&user.id).unwrap();
        Fixture {
            _dir: dir,
            api: HabitApi::new(db),
            session: Session { user_id: user.id },
            token,
        }
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap()
    }

    fn create(f: &Fixture, name: &str, now: DateTime<Utc>) -> Habit {
        f.api
            .create_at(&f.session, &CreateInput { name: name.to_string() }, now)
            .unwrap()
    }

    #[test]
    fn test_authenticate() {
        let f = fixture();
        assert_eq!(f.api.authenticate(Some(&f.token)).unwrap(), f.session);
        assert!(matches!(f.api.authenticate(None), Err(Error::Unauthorized)));
        assert!(matches!(f.api.authenticate(Some("  ")), Err(Error::Unauthorized)));
        assert!(matches!(f.api.authenticate(Some("forged")), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_empty_name_rejected_before_store() {
        let f = fixture();
        for name in ["", "   "] {
            let err = f
                .api
                .create(&f.session, &CreateInput { name: name.to_string() })
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert!(f.api.get_user_habits(&f.session).unwrap().is_empty());
    }

    #[test]
    fn test_create_trims_name() {
        let f = fixture();
        assert_eq!(create(&f, "  Stretch ", noon(1)).name, "Stretch");
    }

    #[test]
    fn test_streak_over_consecutive_days() {
        let f = fixture();
        let habit = create(&f, "Run", noon(1));
        let update = UpdateInput {
            id: habit.id.clone(),
            name: habit.name.clone(),
            last_performed: habit.last_performed,
            done: habit.done,
            streak: habit.streak,
            goal: 5,
        };
        f.api.update(&f.session, &update).unwrap();

        let toggle = ToggleInput { id: habit.id.clone(), done: true };
        let day_one = f.api.toggle_at(&f.session, &toggle, &noon(1)).unwrap();
        assert_eq!(day_one.streak, 1);
        assert!(day_one.done);
        assert_eq!(day_one.goal, 5);

        let day_two = f.api.toggle_at(&f.session, &toggle, &noon(2)).unwrap();
        assert_eq!(day_two.streak, 2);
    }

    #[test]
    fn test_lapsed_streak_restarts() {
        let f = fixture();
        let habit = create(&f, "Run", noon(1));
        f.api
            .update(
                &f.session,
                &UpdateInput {
                    id: habit.id.clone(),
                    name: habit.name.clone(),
                    last_performed: noon(20) - Duration::days(10),
                    done: true,
                    streak: 3,
                    goal: 0,
                },
            )
            .unwrap();

        let toggled = f
            .api
            .toggle_at(&f.session, &ToggleInput { id: habit.id, done: true }, &noon(20))
            .unwrap();
        assert_eq!(toggled.streak, 1);
    }

    #[test]
    fn test_repeated_undo_clamps_at_zero() {
        let f = fixture();
        let habit = create(&f, "Run", noon(3));
        let undo = ToggleInput { id: habit.id, done: false };
        for _ in 0..3 {
            let h = f.api.toggle_at(&f.session, &undo, &noon(3)).unwrap();
            assert_eq!(h.streak, 0);
            assert!(!h.done);
            assert_eq!(h.last_performed, noon(2));
        }
    }

    #[test]
    fn test_reset_streak() {
        let f = fixture();
        let habit = create(&f, "Run", noon(1));
        let toggle = ToggleInput { id: habit.id.clone(), done: true };
        f.api.toggle_at(&f.session, &toggle, &noon(1)).unwrap();
        f.api.toggle_at(&f.session, &toggle, &noon(2)).unwrap();

        let reset = f.api.reset_streak(&f.session, &IdInput { id: habit.id }).unwrap();
        assert_eq!(reset.streak, 0);
        assert!(reset.done);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let f = fixture();
        let err = f
            .api
            .delete(&f.session, &IdInput { id: "does-not-exist".to_string() })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_other_owner_cannot_touch_habit() {
        let f = fixture();
        let habit = create(&f, "Run", noon(1));
        let mallory = f.api.db().create_user("mallory").unwrap();
        let intruder = Session { user_id: mallory.id };

        assert!(f.api.get_user_habits(&intruder).unwrap().is_empty());
        let toggle = ToggleInput { id: habit.id.clone(), done: true };
        assert!(matches!(f.api.toggle_at(&intruder, &toggle, &noon(1)), Err(Error::NotFound(_))));
        assert!(matches!(
            f.api.delete(&intruder, &IdInput { id: habit.id.clone() }),
            Err(Error::NotFound(_))
        ));
        assert_eq!(f.api.get_user_habits(&f.session).unwrap().len(), 1);
    }

    #[test]
    fn test_update_rejects_out_of_range_counters() {
        let f = fixture();
        let habit = create(&f, "Run", noon(1));
        let input = UpdateInput {
            id: habit.id.clone(),
            name: habit.name.clone(),
            last_performed: habit.last_performed,
            done: true,
            streak: 4_000_000_000,
            goal: 3,
        };
        let err = f.api.update(&f.session, &input).unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg.starts_with("streak")));

        let input = UpdateInput { streak: 2, goal: 3_000_000_000, ..input };
        let err = f.api.update(&f.session, &input).unwrap_err();
        assert!(matches!(err, Error::Validation(ref msg) if msg.starts_with("goal")));

        assert_eq!(f.api.db().get_habit(&f.session.user_id, &habit.id).unwrap(), habit);
    }

    #[test]
    fn test_largest_storable_counter_round_trips() {
        let f = fixture();
        let habit = create(&f, "Run", noon(1));
        let max = i32::MAX as u32;
        let input = UpdateInput {
            id: habit.id.clone(),
            name: habit.name,
            last_performed: habit.last_performed,
            done: false,
            streak: max,
            goal: max,
        };
        let updated = f.api.update(&f.session, &input).unwrap();
        assert_eq!((updated.streak, updated.goal), (max, max));
    }

    #[test]
    fn test_update_input_uses_camel_case() {
        let json = r#"{"id":"h1","name":"Run","lastPerformed":"2024-07-01T12:00:00Z","done":true,"streak":2,"goal":5}"#;
        let input: UpdateInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.last_performed, noon(1));
        assert_eq!(input.goal, 5);
    }

    #[test]
    fn test_negative_streak_is_malformed() {
        let json = r#"{"id":"h1","name":"Run","lastPerformed":"2024-07-01T12:00:00Z","done":true,"streak":-1,"goal":0}"#;
        assert!(serde_json::from_str::<UpdateInput>(json).is_err());
    }
}
