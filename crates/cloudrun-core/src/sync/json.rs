//! Helpers linking entities, their JSON files and the local database.

use regex::Regex;

use crate::error::Result;
use crate::model::{Insertable, Jsonable};
use crate::storage::Database;
use crate::sync::types::JsonFile;

/// Map every entity to its `(file name, JSON object)` pair, preserving order.
///
/// # Errors
/// The first entity that fails to serialize aborts the whole batch.
pub fn build_json_files<E: Jsonable>(entities: &[E]) -> Result<Vec<JsonFile>> {
    entities
        .iter()
        .map(|entity| Ok(JsonFile::new(entity.file_name(), entity.to_json()?)))
        .collect()
}

/// Whether the file's name matches `regex`.
///
/// `regex` must be anchored (`^...$`) so that only whole names match, as
/// every [`Jsonable::file_name_regex`] is.
pub fn is_file_name_valid(file: &JsonFile, regex: &Regex) -> bool {
    regex.is_match(&file.name)
}

/// Whether an entity with the same derived file name is already stored.
///
/// Linear scan over every stored entity; an empty store never matches.
pub fn is_already_in_db<E>(db: &Database, file: &JsonFile) -> Result<bool>
where
    E: Jsonable + Insertable,
{
    let stored = E::load_all(db)?;
    if stored.is_empty() {
        return Ok(false);
    }
    Ok(stored.iter().any(|entity| entity.file_name() == file.name))
}

/// Derived file names of every stored entity.
pub fn json_file_names<E>(db: &Database) -> Result<Vec<String>>
where
    E: Jsonable + Insertable,
{
    Ok(E::load_all(db)?.iter().map(Jsonable::file_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn session_at(ms: i64) -> Session {
        Session::new(Utc.timestamp_millis_opt(ms).unwrap(), 1_000, 10.0)
    }

    #[test]
    fn build_preserves_order() {
        let files = build_json_files(&[session_at(3), session_at(1), session_at(2)]).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["session_3.json", "session_1.json", "session_2.json"]);
        assert_eq!(files[0].object["started_at"], 3);
    }

    #[test]
    fn build_empty_is_empty() {
        assert!(build_json_files::<Session>(&[]).unwrap().is_empty());
    }

    #[test]
    fn build_aborts_on_first_failure() {
        let mut bad = session_at(2);
        bad.distance_m = f64::INFINITY;
        assert!(build_json_files(&[session_at(1), bad, session_at(3)]).is_err());
    }

    #[test]
    fn validity_requires_full_match() {
        let regex = Session::file_name_regex();
        let file = |name: &str| JsonFile::new(name, serde_json::json!({}));
        assert!(is_file_name_valid(&file("session_1.json"), regex));
        assert!(!is_file_name_valid(&file("old_session_1.json"), regex));
        assert!(!is_file_name_valid(&file("session_1.json~"), regex));
        assert!(!is_file_name_valid(&file("session_-5.json"), regex));
        assert!(!is_file_name_valid(&file("garbage.txt"), regex));
    }

    #[test]
    fn empty_db_never_contains() {
        let db = Database::open_memory().unwrap();
        let probe = JsonFile::new("session_1.json", serde_json::json!({}));
        assert!(!is_already_in_db::<Session>(&db, &probe).unwrap());
    }

    #[test]
    fn already_in_db_is_exact_and_case_sensitive() {
        let db = Database::open_memory().unwrap();
        session_at(1).insert(&db).unwrap();
        let probe = |name: &str| JsonFile::new(name, serde_json::json!({}));

        assert!(is_already_in_db::<Session>(&db, &probe("session_1.json")).unwrap());
        assert!(!is_already_in_db::<Session>(&db, &probe("Session_1.json")).unwrap());
        assert!(!is_already_in_db::<Session>(&db, &probe("session_10.json")).unwrap());
    }

    #[test]
    fn file_names_list_every_stored_entity() {
        let db = Database::open_memory().unwrap();
        session_at(5).insert(&db).unwrap();
        session_at(7).insert(&db).unwrap();
        assert_eq!(
            json_file_names::<Session>(&db).unwrap(),
            vec!["session_5.json".to_string(), "session_7.json".to_string()]
        );
    }

    proptest! {
        #[test]
        fn build_yields_one_file_per_entity(starts in proptest::collection::vec(0i64..4_000_000_000_000, 0..20)) {
            let sessions: Vec<_> = starts.iter().map(|&ms| session_at(ms)).collect();
            let files = build_json_files(&sessions).unwrap();
            prop_assert_eq!(files.len(), sessions.len());
            for (file, session) in files.iter().zip(&sessions) {
                prop_assert_eq!(&file.name, &session.file_name());
            }
        }

        #[test]
        fn derived_names_are_valid(ms in 0i64..4_000_000_000_000) {
            let file = JsonFile::new(session_at(ms).file_name(), serde_json::json!({}));
            prop_assert!(is_file_name_valid(&file, Session::file_name_regex()));
        }

        #[test]
        fn names_with_suffix_are_invalid(ms in 0i64..1_000_000, suffix in "[a-z~.]{1,4}") {
            let file = JsonFile::new(format!("session_{ms}.json{suffix}"), serde_json::json!({}));
            prop_assert!(!is_file_name_valid(&file, Session::file_name_regex()));
        }
    }
}
