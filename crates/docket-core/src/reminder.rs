use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::datetime;
use crate::todo::Todo;

/// A derived, ephemeral notice that a todo's due date is imminent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: String,
    pub todo_id: Uuid,
    pub message: String,
    pub generated_at: DateTime<Utc>,
}

/// Collects due-date reminders across scans. Reminders stay unread until
/// dismissed individually or cleared in bulk; a todo that already has an
/// unread reminder, or whose dismissal was recorded on the todo itself,
/// is not surfaced again.
#[derive(Debug)]
pub struct ReminderCenter {
    lookahead_hours: i64,
    unread: Vec<Reminder>,
}

impl ReminderCenter {
    pub fn new(lookahead_hours: i64) -> Self {
        Self {
            lookahead_hours,
            unread: Vec::new(),
        }
    }

    /// Scan the collection and surface a reminder for every incomplete
    /// todo due within the lookahead window. Returns the newly surfaced
    /// reminders; they are also prepended to the unread list.
    #[instrument(skip(self, todos, now))]
    pub fn check(&mut self, todos: &[Todo], now: DateTime<Utc>) -> Vec<Reminder> {
        let mut fresh = Vec::new();

        for todo in todos {
            if todo.completed || todo.notification_sent == Some(true) {
                continue;
            }
            let Some(due) = todo.due_date else {
                continue;
            };
            if self.unread.iter().any(|reminder| reminder.todo_id == todo.id) {
                continue;
            }

            let hours = datetime::hours_until_due(due, now);
            if hours <= 0 || hours > self.lookahead_hours {
                continue;
            }

            fresh.push(Reminder {
                id: format!("due-{}", todo.id),
                todo_id: todo.id,
                message: format!("\"{}\" is due in {} hours", todo.text, hours),
                generated_at: now,
            });
        }

        debug!(fresh = fresh.len(), unread = self.unread.len(), "due-date scan complete");
        self.unread.splice(0..0, fresh.iter().cloned());
        fresh
    }

    pub fn unread(&self) -> &[Reminder] {
        &self.unread
    }

    pub fn unread_count(&self) -> usize {
        self.unread.len()
    }

    /// Remove one reminder, returning the todo it referenced so the
    /// caller can record the dismissal on the store.
    pub fn dismiss(&mut self, reminder_id: &str) -> Option<Uuid> {
        let idx = self
            .unread
            .iter()
            .position(|reminder| reminder.id == reminder_id)?;
        Some(self.unread.remove(idx).todo_id)
    }

    /// Drop every unread reminder. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let cleared = self.unread.len();
        self.unread.clear();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Days, Utc};

    use super::ReminderCenter;
    use crate::datetime;
    use crate::todo::{Todo, TodoDraft};

    fn todo_due_today(text: &str) -> Todo {
        let now = Utc::now();
        let mut todo = Todo::new(TodoDraft::new(text), now);
        todo.due_date = Some(datetime::today(now));
        todo
    }

    #[test]
    fn due_today_surfaces_exactly_one_reminder() {
        let now = Utc::now();
        let todo = todo_due_today("Buy milk");
        let mut center = ReminderCenter::new(24);

        let fresh = center.check(&[todo.clone()], now);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].todo_id, todo.id);
        assert_eq!(fresh[0].id, format!("due-{}", todo.id));
        assert!(fresh[0].message.contains("Buy milk"));

        let hours = datetime::hours_until_due(datetime::today(now), now);
        assert!(hours <= 24);
        assert!(fresh[0].message.contains(&format!("in {hours} hours")));
    }

    #[test]
    fn repeated_scans_do_not_duplicate_unread_reminders() {
        let now = Utc::now();
        let todo = todo_due_today("once only");
        let mut center = ReminderCenter::new(24);

        assert_eq!(center.check(&[todo.clone()], now).len(), 1);
        assert_eq!(center.check(&[todo], now).len(), 0);
        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn completed_undated_and_elapsed_todos_are_skipped() {
        let now = Utc::now();
        let mut completed = todo_due_today("already done");
        completed.completed = true;

        let undated = Todo::new(TodoDraft::new("no date"), now);

        let mut elapsed = todo_due_today("long gone");
        elapsed.due_date = datetime::today(now).checked_sub_days(Days::new(2));

        let mut center = ReminderCenter::new(24);
        let fresh = center.check(&[completed, undated, elapsed], now);
        assert!(fresh.is_empty());
        assert_eq!(center.unread_count(), 0);
    }

    #[test]
    fn lookahead_bounds_the_window() {
        let now = Utc::now();
        let mut next_week = todo_due_today("far out");
        next_week.due_date = datetime::today(now).checked_add_days(Days::new(7));

        let mut narrow = ReminderCenter::new(24);
        assert!(narrow.check(&[next_week.clone()], now).is_empty());

        let mut wide = ReminderCenter::new(24 * 8);
        assert_eq!(wide.check(&[next_week], now).len(), 1);
    }

    #[test]
    fn dismiss_returns_the_underlying_todo() {
        let now = Utc::now();
        let todo = todo_due_today("dismiss me");
        let mut center = ReminderCenter::new(24);
        center.check(&[todo.clone()], now);

        let reminder_id = center.unread()[0].id.clone();
        assert_eq!(center.dismiss(&reminder_id), Some(todo.id));
        assert_eq!(center.unread_count(), 0);
        assert_eq!(center.dismiss(&reminder_id), None);
    }

    #[test]
    fn dismissal_recorded_on_the_todo_suppresses_resurfacing() {
        let now = Utc::now();
        let mut todo = todo_due_today("acknowledged");
        todo.notification_sent = Some(true);

        let mut center = ReminderCenter::new(24);
        assert!(center.check(&[todo], now).is_empty());
    }

    #[test]
    fn clear_drops_everything_at_once() {
        let now = Utc::now();
        let todos = vec![todo_due_today("one"), todo_due_today("two")];
        let mut center = ReminderCenter::new(24);
        center.check(&todos, now);

        assert_eq!(center.clear(), 2);
        assert_eq!(center.unread_count(), 0);
        assert_eq!(center.clear(), 0);
    }
}
