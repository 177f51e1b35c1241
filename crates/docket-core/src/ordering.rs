use crate::todo::Todo;

/// How a derived view is ordered for presentation. The stored order is
/// never touched; `reorder` operates on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPolicy {
    /// Stored order as-is.
    Stored,
    /// Active todos before completed ones, otherwise stored order.
    Status,
    /// Status partition, then priority rank within each half.
    #[default]
    StatusPriority,
}

impl SortPolicy {
    /// Parse the `display.sort` config value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "stored" => Some(Self::Stored),
            "status" => Some(Self::Status),
            "status,priority" => Some(Self::StatusPriority),
            _ => None,
        }
    }
}

/// Stable sort of a derived view. Ties keep their stored relative order.
#[must_use]
pub fn sort_for_display<'a>(mut rows: Vec<&'a Todo>, policy: SortPolicy) -> Vec<&'a Todo> {
    match policy {
        SortPolicy::Stored => {}
        SortPolicy::Status => rows.sort_by_key(|todo| todo.completed),
        SortPolicy::StatusPriority => rows.sort_by_key(|todo| (todo.completed, todo.priority)),
    }
    rows
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{sort_for_display, SortPolicy};
    use crate::todo::{Priority, Todo, TodoDraft};

    fn fixture() -> Vec<Todo> {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let mut todos: Vec<Todo> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|text| Todo::new(TodoDraft::new(text), now))
            .collect();
        todos[0].completed = true;
        todos[0].priority = Priority::High;
        todos[2].priority = Priority::High;
        todos[3].priority = Priority::Medium;
        todos
    }

    fn texts(rows: &[&Todo]) -> Vec<String> {
        rows.iter().map(|todo| todo.text.clone()).collect()
    }

    #[test]
    fn stored_policy_changes_nothing() {
        let todos = fixture();
        let rows = sort_for_display(todos.iter().collect(), SortPolicy::Stored);
        assert_eq!(texts(&rows), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn status_policy_is_a_stable_partition() {
        let todos = fixture();
        let rows = sort_for_display(todos.iter().collect(), SortPolicy::Status);
        assert_eq!(texts(&rows), vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn priority_breaks_ties_within_each_half() {
        let todos = fixture();
        let rows = sort_for_display(todos.iter().collect(), SortPolicy::StatusPriority);
        assert_eq!(texts(&rows), vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn policy_parses_config_values() {
        assert_eq!(SortPolicy::parse("none"), Some(SortPolicy::Stored));
        assert_eq!(SortPolicy::parse("status"), Some(SortPolicy::Status));
        assert_eq!(
            SortPolicy::parse("status,priority"),
            Some(SortPolicy::StatusPriority)
        );
        assert_eq!(SortPolicy::parse("alphabetical"), None);
    }
}
