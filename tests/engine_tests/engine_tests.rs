//! Engine Tests
//!
//! Index lifecycle and command routing through the engine facade.

use std::time::Duration;

use pagekv::{
    BackendKind, Command, Config, Engine, IndexKind, Keys, LockSettings, PageKvError, QueryResult,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_fs_engine() -> (Engine, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .backend(BackendKind::Filesystem)
        .data_dir(dir.path())
        .auto_page_size(10)
        .filesystem_lock(LockSettings::new(Duration::from_millis(50)))
        .build();
    (Engine::open(config).unwrap(), dir)
}

fn create(kind: IndexKind, index: &str) -> Command {
    Command::Create {
        kind,
        index: index.to_string(),
    }
}

fn insert_auto(index: &str, value: &str) -> Command {
    Command::Insert {
        index: index.to_string(),
        keys: None,
        value: value.to_string(),
    }
}

fn count(index: &str) -> Command {
    Command::Count {
        index: index.to_string(),
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_create_and_open_indexes() {
    let engine = Engine::in_memory();
    engine.create_auto_index("events").unwrap();
    engine.create_map_index("users").unwrap();

    assert_eq!(engine.index_kind("events").unwrap(), IndexKind::Auto);
    assert_eq!(engine.index_kind("users").unwrap(), IndexKind::Map);
    assert!(engine.auto_index("events").is_ok());
    assert!(engine.map_index("users").is_ok());
}

#[test]
fn test_opening_with_wrong_kind_fails() {
    let engine = Engine::in_memory();
    engine.create_auto_index("events").unwrap();
    assert!(matches!(engine.map_index("events"), Err(PageKvError::NotExist(_))));
    assert!(matches!(engine.auto_index("missing"), Err(PageKvError::NotExist(_))));
}

#[test]
fn test_names_are_unique_across_kinds() {
    let engine = Engine::in_memory();
    engine.create_map_index("shared").unwrap();
    assert!(matches!(
        engine.create_auto_index("shared"),
        Err(PageKvError::KeyAlreadyExists(_))
    ));
}

#[test]
fn test_drop_removes_everything() {
    let (engine, dir) = setup_fs_engine();
    let events = engine.create_auto_index("events").unwrap();
    for i in 0..15 {
        events.insert(&format!("e{}", i)).unwrap();
    }
    engine.drop_auto_index("events").unwrap();

    assert!(!dir.path().join("events").exists());
    assert!(matches!(engine.index_kind("events"), Err(PageKvError::NotExist(_))));
    assert!(matches!(events.count(), Err(PageKvError::NotExist(_))));

    // The name is free again
    engine.create_map_index("events").unwrap();
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = Config::builder()
        .backend(BackendKind::Memory)
        .auto_page_size(0)
        .build();
    assert!(matches!(Engine::open(config), Err(PageKvError::Config(_))));
}

#[cfg(not(feature = "s3"))]
#[test]
fn test_object_store_needs_feature() {
    let config = Config::builder().backend(BackendKind::ObjectStore).build();
    assert!(matches!(Engine::open(config), Err(PageKvError::Config(_))));
}

// =============================================================================
// Command Routing
// =============================================================================

#[test]
fn test_commands_on_auto_index() {
    let (engine, _dir) = setup_fs_engine();
    engine.execute(create(IndexKind::Auto, "log")).unwrap();

    for i in 1..=3 {
        let id = engine.execute(insert_auto("log", &format!("entry {}", i))).unwrap();
        assert_eq!(id, QueryResult::single(i.to_string()));
    }

    let result = engine
        .execute(Command::Query {
            index: "log".to_string(),
            keys: Keys::Range { min: 1, max: 3 },
        })
        .unwrap();
    assert_eq!(result.values(), vec!["entry 1", "entry 2", "entry 3"]);

    engine
        .execute(Command::Delete {
            index: "log".to_string(),
            keys: Keys::single("2"),
        })
        .unwrap();
    assert_eq!(engine.execute(count("log")).unwrap(), QueryResult::single("2"));
}

#[test]
fn test_commands_on_map_index() {
    let engine = Engine::in_memory();
    engine.execute(create(IndexKind::Map, "users")).unwrap();

    engine
        .execute(Command::Insert {
            index: "users".to_string(),
            keys: Some(Keys::single("alice")),
            value: "a@example.com".to_string(),
        })
        .unwrap();
    engine
        .execute(Command::Upsert {
            index: "users".to_string(),
            keys: Keys::array(["alice", "bob"]),
            value: "shared@example.com".to_string(),
        })
        .unwrap();

    assert_eq!(
        engine.get("users", "bob").unwrap(),
        QueryResult::single("shared@example.com")
    );
    assert_eq!(engine.execute(count("users")).unwrap(), QueryResult::single("2"));

    let listed = engine
        .execute(Command::List {
            index: "users".to_string(),
            limit: 0,
            offset: 0,
            descending: false,
        })
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[test]
fn test_keys_must_fit_index_flavor() {
    let engine = Engine::in_memory();
    engine.create_auto_index("log").unwrap();
    engine.create_map_index("users").unwrap();

    // Auto ids are numeric and assigned by the index
    assert!(matches!(
        engine.execute(Command::Query {
            index: "log".to_string(),
            keys: Keys::single("abc"),
        }),
        Err(PageKvError::InvalidKey(_))
    ));
    assert!(matches!(
        engine.execute(Command::Insert {
            index: "log".to_string(),
            keys: Some(Keys::single("1")),
            value: "x".to_string(),
        }),
        Err(PageKvError::InvalidSelector(_))
    ));
    assert!(matches!(
        engine.execute(insert_auto("users", "x")),
        Err(PageKvError::InvalidSelector(_))
    ));
}

#[test]
fn test_command_on_missing_index() {
    let engine = Engine::in_memory();
    assert!(matches!(
        engine.execute(count("nowhere")),
        Err(PageKvError::NotExist(_))
    ));
}

#[test]
fn test_drop_command_checks_kind() {
    let engine = Engine::in_memory();
    engine.execute(create(IndexKind::Auto, "log")).unwrap();
    assert!(engine
        .execute(Command::Drop {
            kind: IndexKind::Map,
            index: "log".to_string(),
        })
        .is_err());
    assert_eq!(
        engine
            .execute(Command::Drop {
                kind: IndexKind::Auto,
                index: "log".to_string(),
            })
            .unwrap(),
        QueryResult::single("log")
    );
}
