use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::datastore::{Mutation, Persistence};
use crate::datetime;
use crate::filter::FilterConfig;
use crate::todo::{normalize_categories, Priority, Todo, TodoDraft, TodoPatch};

/// Emitted to subscribers after every applied mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Loaded { count: usize },
    Added(Uuid),
    Updated(Uuid),
    Deleted(Uuid),
    Reordered { active: Uuid, over: Uuid },
    ClearedCompleted { removed: usize },
}

pub type ListenerId = u64;

type Listener = Box<dyn FnMut(&StoreEvent, &[Todo])>;

/// The owning container for the todo collection. All mutations go through
/// its command methods: memory is updated first, one persistence call is
/// issued, then subscribers are notified. A failed persistence write is
/// logged and the in-memory state stands; the next successful write
/// carries full current state anyway.
pub struct TodoStore {
    todos: Vec<Todo>,
    backend: Box<dyn Persistence>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: ListenerId,
}

impl TodoStore {
    pub fn new(backend: Box<dyn Persistence>) -> Self {
        Self {
            todos: Vec::new(),
            backend,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Replace the in-memory collection with whatever the backend holds.
    /// Retrieval failures fall back to an empty collection rather than
    /// failing the application.
    #[instrument(skip(self))]
    pub fn load(&mut self) {
        self.todos = match self.backend.load_all() {
            Ok(todos) => todos,
            Err(err) => {
                warn!(error = %err, "failed to load persisted todos; starting empty");
                Vec::new()
            }
        };
        self.notify(&StoreEvent::Loaded {
            count: self.todos.len(),
        });
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn len(&self) -> usize {
        self.todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Todo> {
        self.todos.iter().find(|todo| todo.id == id)
    }

    /// Zero-based position in the stored order.
    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.todos.iter().position(|todo| todo.id == id)
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&StoreEvent, &[Todo]) + 'static,
    ) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Create a todo from bare text and an optional due date. Whitespace-
    /// only text is rejected without touching memory or storage.
    pub fn add(&mut self, text: &str, due_date: Option<NaiveDate>) -> Option<Uuid> {
        self.add_with(TodoDraft {
            text: text.to_string(),
            due_date,
            ..TodoDraft::default()
        })
    }

    /// Create a todo from a full draft. The store assigns the id and
    /// creation timestamp; the new entry goes to the back of the list.
    #[instrument(skip(self, draft))]
    pub fn add_with(&mut self, draft: TodoDraft) -> Option<Uuid> {
        if draft.text.trim().is_empty() {
            debug!("rejected add with empty text");
            return None;
        }

        let todo = Todo::new(draft, Utc::now());
        let id = todo.id;
        self.todos.push(todo);
        self.persist(Mutation::Create(id));
        self.notify(&StoreEvent::Added(id));
        Some(id)
    }

    #[instrument(skip(self))]
    pub fn toggle(&mut self, id: Uuid) -> bool {
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            debug!(%id, "toggle: no matching todo");
            return false;
        };
        todo.completed = !todo.completed;
        let completed = todo.completed;

        self.persist(Mutation::Update {
            id,
            patch: TodoPatch {
                completed: Some(completed),
                ..TodoPatch::default()
            },
        });
        self.notify(&StoreEvent::Updated(id));
        true
    }

    #[instrument(skip(self, new_text))]
    pub fn edit_text(&mut self, id: Uuid, new_text: &str) -> bool {
        let text = new_text.trim();
        if text.is_empty() {
            debug!(%id, "rejected edit with empty text");
            return false;
        }
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            debug!(%id, "edit_text: no matching todo");
            return false;
        };
        todo.text = text.to_string();

        self.persist(Mutation::Update {
            id,
            patch: TodoPatch {
                text: Some(text.to_string()),
                ..TodoPatch::default()
            },
        });
        self.notify(&StoreEvent::Updated(id));
        true
    }

    #[instrument(skip(self))]
    pub fn edit_due_date(&mut self, id: Uuid, due_date: Option<NaiveDate>) -> bool {
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            debug!(%id, "edit_due_date: no matching todo");
            return false;
        };
        todo.due_date = due_date;

        self.persist(Mutation::Update {
            id,
            patch: TodoPatch {
                due_date: Some(due_date),
                ..TodoPatch::default()
            },
        });
        self.notify(&StoreEvent::Updated(id));
        true
    }

    #[instrument(skip(self))]
    pub fn edit_priority(&mut self, id: Uuid, priority: Priority) -> bool {
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            debug!(%id, "edit_priority: no matching todo");
            return false;
        };
        todo.priority = priority;

        self.persist(Mutation::Update {
            id,
            patch: TodoPatch {
                priority: Some(priority),
                ..TodoPatch::default()
            },
        });
        self.notify(&StoreEvent::Updated(id));
        true
    }

    /// Replace the category list. Input labels are comma-split, trimmed,
    /// empty-filtered, and de-duplicated before storage.
    #[instrument(skip(self, categories))]
    pub fn edit_categories<I, S>(&mut self, id: Uuid, categories: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            debug!(%id, "edit_categories: no matching todo");
            return false;
        };
        let normalized = normalize_categories(categories);
        todo.categories = normalized.clone();

        self.persist(Mutation::Update {
            id,
            patch: TodoPatch {
                categories: Some(normalized),
                ..TodoPatch::default()
            },
        });
        self.notify(&StoreEvent::Updated(id));
        true
    }

    /// Record that a due-date reminder for this todo was dismissed.
    #[instrument(skip(self))]
    pub fn mark_notified(&mut self, id: Uuid) -> bool {
        let Some(todo) = self.todos.iter_mut().find(|todo| todo.id == id) else {
            debug!(%id, "mark_notified: no matching todo");
            return false;
        };
        todo.notification_sent = Some(true);

        self.persist(Mutation::Update {
            id,
            patch: TodoPatch {
                notification_sent: Some(true),
                ..TodoPatch::default()
            },
        });
        self.notify(&StoreEvent::Updated(id));
        true
    }

    #[instrument(skip(self))]
    pub fn delete(&mut self, id: Uuid) -> bool {
        let Some(idx) = self.position(id) else {
            debug!(%id, "delete: no matching todo");
            return false;
        };
        self.todos.remove(idx);
        self.persist(Mutation::Delete(id));
        self.notify(&StoreEvent::Deleted(id));
        true
    }

    /// Move the `active` entry to the position `over` currently occupies,
    /// shifting the entries in between. A move, not a swap.
    #[instrument(skip(self))]
    pub fn reorder(&mut self, active: Uuid, over: Uuid) -> bool {
        let (Some(from), Some(to)) = (self.position(active), self.position(over)) else {
            debug!(%active, %over, "reorder: id not present");
            return false;
        };
        if from == to {
            return false;
        }

        let moved = self.todos.remove(from);
        self.todos.insert(to, moved);
        self.persist(Mutation::Reorder);
        self.notify(&StoreEvent::Reordered { active, over });
        true
    }

    /// Remove every completed todo in one update. Returns how many were
    /// removed; zero removals issue no persistence write.
    #[instrument(skip(self))]
    pub fn clear_completed(&mut self) -> usize {
        let before = self.todos.len();
        self.todos.retain(|todo| !todo.completed);
        let removed = before - self.todos.len();
        if removed == 0 {
            return 0;
        }

        self.persist(Mutation::ClearCompleted);
        self.notify(&StoreEvent::ClearedCompleted { removed });
        removed
    }

    /// Pure derived read: the stored-order subset passing every active
    /// filter axis.
    pub fn filtered_view(&self, cfg: &FilterConfig, now: DateTime<Utc>) -> Vec<&Todo> {
        let today = datetime::today(now);
        self.todos
            .iter()
            .filter(|todo| cfg.matches(todo, today))
            .collect()
    }

    fn persist(&mut self, mutation: Mutation) {
        match self.backend.apply(&mutation, &self.todos) {
            Ok(Some(record)) => {
                // The backend is authoritative about what it stored;
                // absorb its copy of the record.
                if let Some(existing) = self.todos.iter_mut().find(|todo| todo.id == record.id) {
                    *existing = record;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "persistence write failed; keeping in-memory state");
            }
        }
    }

    fn notify(&mut self, event: &StoreEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event, &self.todos);
        }
    }
}
