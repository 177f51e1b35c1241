use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::trace;

use crate::todo::{Priority, Todo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityFilter {
    #[default]
    All,
    Exact(Priority),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DueFilter {
    #[default]
    All,
    Today,
    Upcoming,
    Overdue,
}

/// One slot per filter axis; inclusion is the conjunction of all four.
/// Each axis defaults to pass-everything.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub status: StatusFilter,
    pub priority: PriorityFilter,
    pub due: DueFilter,
    pub search: String,
}

impl FilterConfig {
    /// Build a config from raw invocation terms. `status:`, `priority:`
    /// and `due:` tokens select their axis; everything else is collected
    /// into the search text.
    #[tracing::instrument(skip(terms))]
    pub fn parse(terms: &[String]) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        let mut search_terms: Vec<&str> = Vec::new();

        for term in terms {
            if let Some(value) = term.strip_prefix("status:") {
                cfg.status = match value.to_ascii_lowercase().as_str() {
                    "all" => StatusFilter::All,
                    "active" | "open" => StatusFilter::Active,
                    "completed" | "done" => StatusFilter::Completed,
                    other => return Err(anyhow!("unknown status filter: {other}")),
                };
                continue;
            }

            if let Some(value) = term
                .strip_prefix("priority:")
                .or_else(|| term.strip_prefix("pri:"))
            {
                cfg.priority = if value.eq_ignore_ascii_case("all") {
                    PriorityFilter::All
                } else {
                    let priority = Priority::parse(value)
                        .ok_or_else(|| anyhow!("unknown priority filter: {value}"))?;
                    PriorityFilter::Exact(priority)
                };
                continue;
            }

            if let Some(value) = term.strip_prefix("due:") {
                cfg.due = match value.to_ascii_lowercase().as_str() {
                    "all" => DueFilter::All,
                    "today" => DueFilter::Today,
                    "upcoming" => DueFilter::Upcoming,
                    "overdue" => DueFilter::Overdue,
                    other => return Err(anyhow!("unknown due filter: {other}")),
                };
                continue;
            }

            search_terms.push(term.as_str());
        }

        cfg.search = search_terms.join(" ");
        Ok(cfg)
    }

    /// Evaluate the todo against every axis. `today` is the current
    /// calendar date in the project timezone.
    pub fn matches(&self, todo: &Todo, today: NaiveDate) -> bool {
        let ok = status_matches(self.status, todo)
            && priority_matches(self.priority, todo)
            && due_matches(self.due, todo, today)
            && search_matches(&self.search, todo);
        trace!(id = %todo.id, ok, "filter evaluation");
        ok
    }
}

fn status_matches(filter: StatusFilter, todo: &Todo) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Active => !todo.completed,
        StatusFilter::Completed => todo.completed,
    }
}

fn priority_matches(filter: PriorityFilter, todo: &Todo) -> bool {
    match filter {
        PriorityFilter::All => true,
        PriorityFilter::Exact(priority) => todo.priority == priority,
    }
}

fn due_matches(filter: DueFilter, todo: &Todo, today: NaiveDate) -> bool {
    // A todo without a due date passes every due filter.
    let Some(due) = todo.due_date else {
        return true;
    };

    match filter {
        DueFilter::All => true,
        DueFilter::Today => due == today,
        DueFilter::Upcoming => due > today,
        DueFilter::Overdue => due < today,
    }
}

fn search_matches(query: &str, todo: &Todo) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }

    let needle = query.to_lowercase();
    todo.text.to_lowercase().contains(&needle)
        || todo
            .categories
            .iter()
            .any(|category| category.to_lowercase().contains(&needle))
}
