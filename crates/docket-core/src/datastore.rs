use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::todo::{Todo, TodoPatch};

/// One applied store mutation, described for the persistence layer. The
/// full post-mutation snapshot always rides along so snapshot media can
/// ignore the specifics and rewrite the whole collection.
#[derive(Debug, Clone)]
pub enum Mutation {
    Create(Uuid),
    Update { id: Uuid, patch: TodoPatch },
    Delete(Uuid),
    Reorder,
    ClearCompleted,
}

/// The persistence contract: retrieve the ordered collection, and mirror
/// one mutation. A backend may hand back the record it durably stored
/// (the row-per-todo service does) so the caller can reconcile its cache;
/// snapshot media return `None`.
pub trait Persistence {
    fn load_all(&mut self) -> anyhow::Result<Vec<Todo>>;

    fn apply(&mut self, mutation: &Mutation, snapshot: &[Todo]) -> anyhow::Result<Option<Todo>>;
}

/// Snapshot persistence: the entire collection serialized as one JSON
/// document, rewritten on every mutation.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let path = data_dir.join("todos.json");
        if !path.exists() {
            fs::write(&path, "[]")?;
        }

        info!(file = %path.display(), "opened json snapshot store");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonStore {
    #[instrument(skip(self))]
    fn load_all(&mut self) -> anyhow::Result<Vec<Todo>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading {}", self.path.display()));
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<Todo>>(&raw) {
            Ok(todos) => {
                debug!(count = todos.len(), "loaded todo snapshot");
                Ok(todos)
            }
            Err(err) => {
                // Malformed data must never take the application down;
                // drop the record so the next save starts clean.
                warn!(file = %self.path.display(), error = %err, "discarding corrupt todo snapshot");
                if let Err(remove_err) = fs::remove_file(&self.path) {
                    warn!(error = %remove_err, "failed to remove corrupt snapshot");
                }
                Ok(Vec::new())
            }
        }
    }

    #[instrument(skip(self, _mutation, snapshot))]
    fn apply(&mut self, _mutation: &Mutation, snapshot: &[Todo]) -> anyhow::Result<Option<Todo>> {
        save_json_atomic(&self.path, snapshot)?;
        Ok(None)
    }
}

#[instrument(skip(path, todos))]
fn save_json_atomic(path: &Path, todos: &[Todo]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = todos.len(), "saving snapshot atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, todos)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::{JsonStore, Mutation, Persistence};
    use crate::todo::{Todo, TodoDraft};

    fn sample(text: &str) -> Todo {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        Todo::new(TodoDraft::new(text), now)
    }

    #[test]
    fn snapshot_roundtrips_field_for_field() {
        let temp = tempdir().expect("tempdir");
        let mut store = JsonStore::open(temp.path()).expect("open");

        let todos = vec![sample("one"), sample("two")];
        store
            .apply(&Mutation::Reorder, &todos)
            .expect("apply snapshot");

        let reloaded = store.load_all().expect("load");
        assert_eq!(reloaded, todos);
    }

    #[test]
    fn fresh_store_is_empty() {
        let temp = tempdir().expect("tempdir");
        let mut store = JsonStore::open(temp.path()).expect("open");
        assert!(store.load_all().expect("load").is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_discarded_and_removed() {
        let temp = tempdir().expect("tempdir");
        let mut store = JsonStore::open(temp.path()).expect("open");
        std::fs::write(store.path(), "{not json").expect("write garbage");

        let loaded = store.load_all().expect("load");
        assert!(loaded.is_empty());
        assert!(!store.path().exists());

        // The next mutation rewrites a clean snapshot.
        let todos = vec![sample("fresh start")];
        store.apply(&Mutation::Reorder, &todos).expect("apply");
        assert_eq!(store.load_all().expect("reload"), todos);
    }
}
