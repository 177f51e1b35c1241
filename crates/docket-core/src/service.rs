use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::datastore::{Mutation, Persistence};
use crate::todo::{Priority, Todo};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS todos (
    id         TEXT PRIMARY KEY,
    text       TEXT NOT NULL,
    completed  INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    due_date   TEXT,
    priority   TEXT NOT NULL DEFAULT 'none',
    categories TEXT NOT NULL DEFAULT '[]',
    position   INTEGER NOT NULL
)";

const SELECT_COLUMNS: &str = "id, text, completed, created_at, due_date, priority, categories";

/// Row-per-todo persistence over SQLite. Each store mutation is mirrored
/// as the matching CRUD statement; a `position` column carries the
/// authoritative list order. The reminder-dismissed flag is not part of
/// this contract and has no column.
pub struct SqliteService {
    conn: Connection,
    path: PathBuf,
}

impl SqliteService {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let path = data_dir.join("todos.db");
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        conn.execute(SCHEMA, [])
            .context("failed to create todos table")?;

        info!(file = %path.display(), "opened sqlite service store");
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fetch(&self, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM todos WHERE id = ?1");
        let raw = self
            .conn
            .query_row(&sql, params![id.to_string()], read_raw)
            .optional()
            .with_context(|| format!("failed to fetch todo {id}"))?;
        Ok(raw.and_then(decode_row))
    }
}

impl Persistence for SqliteService {
    #[instrument(skip(self))]
    fn load_all(&mut self) -> anyhow::Result<Vec<Todo>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM todos ORDER BY position, created_at");
        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map([], read_raw)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read todos table")?;

        let todos: Vec<Todo> = raws.into_iter().filter_map(decode_row).collect();
        debug!(count = todos.len(), "loaded todos from service");
        Ok(todos)
    }

    #[instrument(skip(self, mutation, snapshot))]
    fn apply(&mut self, mutation: &Mutation, snapshot: &[Todo]) -> anyhow::Result<Option<Todo>> {
        match mutation {
            Mutation::Create(id) => {
                let position = snapshot
                    .iter()
                    .position(|todo| todo.id == *id)
                    .ok_or_else(|| anyhow!("created todo {id} absent from snapshot"))?;
                let todo = &snapshot[position];

                self.conn.execute(
                    "INSERT INTO todos (id, text, completed, created_at, due_date, priority, categories, position)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        todo.id.to_string(),
                        todo.text,
                        todo.completed,
                        todo.created_at.to_rfc3339(),
                        todo.due_date.map(|date| date.to_string()),
                        todo.priority.as_str(),
                        serde_json::to_string(&todo.categories)?,
                        position as i64,
                    ],
                )?;
                self.fetch(*id)
            }

            Mutation::Update { id, patch } => {
                let mut sets: Vec<&str> = Vec::new();
                let mut values: Vec<Value> = Vec::new();

                if let Some(text) = &patch.text {
                    sets.push("text = ?");
                    values.push(Value::Text(text.clone()));
                }
                if let Some(completed) = patch.completed {
                    sets.push("completed = ?");
                    values.push(Value::Integer(i64::from(completed)));
                }
                if let Some(due_date) = &patch.due_date {
                    sets.push("due_date = ?");
                    values.push(match due_date {
                        Some(date) => Value::Text(date.to_string()),
                        None => Value::Null,
                    });
                }
                if let Some(priority) = patch.priority {
                    sets.push("priority = ?");
                    values.push(Value::Text(priority.as_str().to_string()));
                }
                if let Some(categories) = &patch.categories {
                    sets.push("categories = ?");
                    values.push(Value::Text(serde_json::to_string(categories)?));
                }
                // notification_sent has no column; a patch carrying only
                // that flag touches no row and reports no stored record.
                if sets.is_empty() {
                    return Ok(None);
                }

                let sql = format!("UPDATE todos SET {} WHERE id = ?", sets.join(", "));
                values.push(Value::Text(id.to_string()));
                let changed = self.conn.execute(&sql, params_from_iter(values))?;
                debug!(%id, changed, "applied partial update");
                self.fetch(*id)
            }

            Mutation::Delete(id) => {
                let removed = self
                    .conn
                    .execute("DELETE FROM todos WHERE id = ?1", params![id.to_string()])?;
                if removed == 0 {
                    // Deleting an absent row reports success.
                    debug!(%id, "delete matched no row");
                }
                Ok(None)
            }

            Mutation::Reorder => {
                let tx = self.conn.transaction()?;
                for (position, todo) in snapshot.iter().enumerate() {
                    tx.execute(
                        "UPDATE todos SET position = ?1 WHERE id = ?2",
                        params![position as i64, todo.id.to_string()],
                    )?;
                }
                tx.commit()?;
                Ok(None)
            }

            Mutation::ClearCompleted => {
                let removed = self
                    .conn
                    .execute("DELETE FROM todos WHERE completed = 1", [])?;
                debug!(removed, "cleared completed todos");
                Ok(None)
            }
        }
    }
}

struct RawRow {
    id: String,
    text: String,
    completed: bool,
    created_at: String,
    due_date: Option<String>,
    priority: String,
    categories: String,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        text: row.get(1)?,
        completed: row.get(2)?,
        created_at: row.get(3)?,
        due_date: row.get(4)?,
        priority: row.get(5)?,
        categories: row.get(6)?,
    })
}

/// Decode a raw row, degrading field-by-field: an unreadable cell is
/// logged and defaulted, and only an unusable identity drops the row.
fn decode_row(raw: RawRow) -> Option<Todo> {
    let id = match Uuid::parse_str(&raw.id) {
        Ok(id) => id,
        Err(err) => {
            warn!(id = %raw.id, error = %err, "skipping row with invalid id");
            return None;
        }
    };

    let created_at = match DateTime::parse_from_rfc3339(&raw.created_at) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(err) => {
            warn!(%id, error = %err, "skipping row with invalid creation timestamp");
            return None;
        }
    };

    let due_date = raw.due_date.and_then(|value| {
        match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(err) => {
                warn!(%id, value, error = %err, "ignoring unreadable due date");
                None
            }
        }
    });

    let priority = Priority::parse(&raw.priority).unwrap_or_else(|| {
        warn!(%id, value = %raw.priority, "ignoring unknown priority");
        Priority::None
    });

    let categories = serde_json::from_str(&raw.categories).unwrap_or_else(|err| {
        warn!(%id, error = %err, "ignoring unreadable categories");
        Vec::new()
    });

    Some(Todo {
        id,
        text: raw.text,
        completed: raw.completed,
        created_at,
        due_date,
        priority,
        categories,
        notification_sent: None,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;
    use uuid::Uuid;

    use super::SqliteService;
    use crate::datastore::{Mutation, Persistence};
    use crate::todo::{Priority, Todo, TodoDraft, TodoPatch};

    fn sample(text: &str) -> Todo {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        Todo::new(TodoDraft::new(text), now)
    }

    fn create_all(service: &mut SqliteService, snapshot: &[Todo]) {
        for todo in snapshot {
            service
                .apply(&Mutation::Create(todo.id), snapshot)
                .expect("create");
        }
    }

    #[test]
    fn rows_roundtrip_in_stored_order() {
        let temp = tempdir().expect("tempdir");
        let mut service = SqliteService::open(temp.path()).expect("open");

        let mut first = sample("first");
        first.due_date = NaiveDate::from_ymd_opt(2026, 3, 10);
        first.priority = Priority::High;
        first.categories = vec!["work".to_string(), "urgent".to_string()];
        let second = sample("second");
        let snapshot = vec![first.clone(), second.clone()];

        create_all(&mut service, &snapshot);
        let loaded = service.load_all().expect("load");
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn partial_updates_never_null_absent_fields() {
        let temp = tempdir().expect("tempdir");
        let mut service = SqliteService::open(temp.path()).expect("open");

        let mut todo = sample("keep my due date");
        todo.due_date = NaiveDate::from_ymd_opt(2026, 3, 10);
        let snapshot = vec![todo.clone()];
        create_all(&mut service, &snapshot);

        let updated = service
            .apply(
                &Mutation::Update {
                    id: todo.id,
                    patch: TodoPatch {
                        priority: Some(Priority::Medium),
                        ..TodoPatch::default()
                    },
                },
                &snapshot,
            )
            .expect("update")
            .expect("record");

        assert_eq!(updated.priority, Priority::Medium);
        assert_eq!(updated.due_date, todo.due_date);
        assert_eq!(updated.text, todo.text);
    }

    #[test]
    fn due_dates_can_be_cleared_explicitly() {
        let temp = tempdir().expect("tempdir");
        let mut service = SqliteService::open(temp.path()).expect("open");

        let mut todo = sample("clear me");
        todo.due_date = NaiveDate::from_ymd_opt(2026, 3, 10);
        let snapshot = vec![todo.clone()];
        create_all(&mut service, &snapshot);

        let updated = service
            .apply(
                &Mutation::Update {
                    id: todo.id,
                    patch: TodoPatch {
                        due_date: Some(None),
                        ..TodoPatch::default()
                    },
                },
                &snapshot,
            )
            .expect("update")
            .expect("record");
        assert!(updated.due_date.is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let mut service = SqliteService::open(temp.path()).expect("open");

        let todo = sample("short lived");
        let snapshot = vec![todo.clone()];
        create_all(&mut service, &snapshot);

        service
            .apply(&Mutation::Delete(todo.id), &[])
            .expect("first delete");
        service
            .apply(&Mutation::Delete(todo.id), &[])
            .expect("second delete succeeds too");
        service
            .apply(&Mutation::Delete(Uuid::new_v4()), &[])
            .expect("deleting an unknown id succeeds");

        assert!(service.load_all().expect("load").is_empty());
    }

    #[test]
    fn reorder_rewrites_positions() {
        let temp = tempdir().expect("tempdir");
        let mut service = SqliteService::open(temp.path()).expect("open");

        let a = sample("A");
        let b = sample("B");
        let c = sample("C");
        let snapshot = vec![a.clone(), b.clone(), c.clone()];
        create_all(&mut service, &snapshot);

        let moved = vec![c.clone(), a.clone(), b.clone()];
        service
            .apply(&Mutation::Reorder, &moved)
            .expect("reorder");

        let loaded = service.load_all().expect("load");
        let texts: Vec<&str> = loaded.iter().map(|todo| todo.text.as_str()).collect();
        assert_eq!(texts, vec!["C", "A", "B"]);
    }

    #[test]
    fn clear_completed_removes_only_completed_rows() {
        let temp = tempdir().expect("tempdir");
        let mut service = SqliteService::open(temp.path()).expect("open");

        let mut done = sample("done");
        done.completed = true;
        let open = sample("open");
        let snapshot = vec![done, open.clone()];
        create_all(&mut service, &snapshot);

        service
            .apply(&Mutation::ClearCompleted, &[open.clone()])
            .expect("clear");
        let loaded = service.load_all().expect("load");
        assert_eq!(loaded, vec![open]);
    }

    #[test]
    fn unreadable_cells_degrade_instead_of_failing_the_load() {
        let temp = tempdir().expect("tempdir");
        let mut service = SqliteService::open(temp.path()).expect("open");

        service
            .conn
            .execute(
                "INSERT INTO todos (id, text, completed, created_at, due_date, priority, categories, position)
                 VALUES (?1, 'salvageable', 0, '2026-03-09T12:00:00+00:00', 'not-a-date', 'whenever', 'oops', 0)",
                rusqlite::params![Uuid::new_v4().to_string()],
            )
            .expect("insert row with bad cells");
        service
            .conn
            .execute(
                "INSERT INTO todos (id, text, completed, created_at, due_date, priority, categories, position)
                 VALUES ('not-a-uuid', 'dropped', 0, '2026-03-09T12:00:00+00:00', NULL, 'none', '[]', 1)",
                [],
            )
            .expect("insert row with bad id");

        let loaded = service.load_all().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "salvageable");
        assert!(loaded[0].due_date.is_none());
        assert_eq!(loaded[0].priority, Priority::None);
        assert!(loaded[0].categories.is_empty());
    }
}
