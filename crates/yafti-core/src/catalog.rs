//! In-memory lookup over the configured actions.
//!
//! Entries are kept in catalog order (screen by screen, action by action).
//! Reads and writes go through one `RwLock`; every read hands out a cloned
//! [`Action`], so a reader sees either the record before an [`ActionCatalog::upsert`]
//! or the record after it, never a mixture.

use crate::config::{Action, Config};
use crate::error::{Result, YaftiError};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct ActionCatalog {
    entries: RwLock<Vec<Action>>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from every action in `config`. Duplicate IDs are
    /// upserted, so the last definition wins while keeping the first position.
    pub fn from_config(config: &Config) -> Self {
        let catalog = Self::new();
        for action in config.actions() {
            catalog.upsert(action.clone());
        }
        catalog
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Action>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Action>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, id: &str) -> Result<Action> {
        self.read()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| YaftiError::ActionNotFound(id.to_string()))
    }

    /// Collect the actions whose ID appears in `ids`.
    ///
    /// The catalog is scanned once, so matches come back in catalog order,
    /// not in the order of `ids`. The flag reports whether anything matched.
    pub fn lookup_many<S: AsRef<str>>(&self, ids: &[S]) -> (Vec<Action>, bool) {
        let wanted: HashSet<&str> = ids.iter().map(|s| s.as_ref()).collect();
        let matched: Vec<Action> = self
            .read()
            .iter()
            .filter(|a| wanted.contains(a.id.as_str()))
            .cloned()
            .collect();
        let found = !matched.is_empty();
        (matched, found)
    }

    /// Replace the entry sharing `action.id`, or append it.
    pub fn upsert(&self, action: Action) {
        let mut entries = self.write();
        match entries.iter_mut().find(|a| a.id == action.id) {
            Some(existing) => *existing = action,
            None => entries.push(action),
        }
    }

    /// Delete the entry with `id`. Returns whether one was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|a| a.id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Point-in-time copy of every entry, in catalog order.
    pub fn snapshot(&self) -> Vec<Action> {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Screen;
    use std::sync::Arc;

    fn action(id: &str, script: &str) -> Action {
        Action {
            id: id.into(),
            title: format!("Title {id}"),
            description: String::new(),
            default: false,
            script: script.into(),
        }
    }

    fn catalog() -> ActionCatalog {
        let cfg = Config {
            title: "t".into(),
            screens: vec![
                Screen {
                    title: "one".into(),
                    description: String::new(),
                    actions: vec![action("c", "echo c"), action("a", "echo a")],
                },
                Screen {
                    title: "two".into(),
                    description: String::new(),
                    actions: vec![action("b", "echo b")],
                },
            ],
        };
        ActionCatalog::from_config(&cfg)
    }

    #[test]
    fn lookup_finds_and_misses() {
        let cat = catalog();
        assert_eq!(cat.lookup("a").unwrap().script, "echo a");
        assert!(matches!(cat.lookup("zzz"), Err(YaftiError::ActionNotFound(id)) if id == "zzz"));
    }

    #[test]
    fn lookup_many_returns_catalog_order() {
        let cat = catalog();
        let (actions, found) = cat.lookup_many(&["b", "a", "c"]);
        assert!(found);
        let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn lookup_many_ignores_unknown_ids() {
        let cat = catalog();
        let (actions, found) = cat.lookup_many(&["nope", "b"]);
        assert!(found);
        assert_eq!(actions.len(), 1);

        let (actions, found) = cat.lookup_many(&["nope"]);
        assert!(!found);
        assert!(actions.is_empty());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let cat = catalog();
        cat.upsert(action("a", "echo replaced"));
        assert_eq!(cat.len(), 3);
        assert_eq!(cat.lookup("a").unwrap().script, "echo replaced");
        assert_eq!(cat.snapshot()[1].id, "a");
    }

    #[test]
    fn upsert_appends_new_id() {
        let cat = catalog();
        cat.upsert(action("d", "echo d"));
        assert_eq!(cat.snapshot().last().unwrap().id, "d");
    }

    #[test]
    fn duplicate_ids_in_config_last_wins() {
        let cfg = Config {
            title: "t".into(),
            screens: vec![Screen {
                title: "s".into(),
                description: String::new(),
                actions: vec![action("x", "first"), action("y", "y"), action("x", "second")],
            }],
        };
        let cat = ActionCatalog::from_config(&cfg);
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.lookup("x").unwrap().script, "second");
    }

    #[test]
    fn remove_deletes_if_present() {
        let cat = catalog();
        assert!(cat.remove("a"));
        assert!(!cat.remove("a"));
        assert_eq!(cat.len(), 2);
        assert!(cat.lookup("a").is_err());
    }

    #[test]
    fn concurrent_readers_never_see_half_written_entry() {
        let cat = Arc::new(ActionCatalog::new());
        cat.upsert(Action {
            id: "x".into(),
            title: "old".into(),
            description: "old".into(),
            default: false,
            script: "old".into(),
        });

        let writer = {
            let cat = Arc::clone(&cat);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let tag = if i % 2 == 0 { "new" } else { "old" };
                    cat.upsert(Action {
                        id: "x".into(),
                        title: tag.into(),
                        description: tag.into(),
                        default: false,
                        script: tag.into(),
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cat = Arc::clone(&cat);
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        let a = cat.lookup("x").unwrap();
                        assert_eq!(a.title, a.description);
                        assert_eq!(a.title, a.script);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
