use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Local, NaiveDate, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime;
use crate::reminder::Reminder;
use crate::todo::{Priority, Todo};

#[derive(Debug, Clone, Copy)]
enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// Print a derived view. Each row carries the todo's 1-based stored
    /// position, which is what selectors refer to regardless of how the
    /// view is sorted.
    #[tracing::instrument(skip(self, rows, now))]
    pub fn print_todo_table(
        &mut self,
        rows: &[(usize, &Todo)],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let today = datetime::today(now);

        let headers = ["#", "", "Pri", "Due", "Categories", "Text"];
        let aligns = [
            Align::Right,
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Left,
        ];

        let mut cells = Vec::with_capacity(rows.len());
        for (position, todo) in rows {
            let mark = if todo.completed { "x" } else { "" };
            let priority = self.paint_priority(todo.priority);
            let due = self.paint_due(todo.due_date, todo.completed, today);
            let categories = todo.categories.join(", ");
            let text = if todo.completed {
                self.paint(&todo.text, "9;2")
            } else {
                todo.text.clone()
            };

            cells.push(vec![
                position.to_string(),
                mark.to_string(),
                priority,
                due,
                categories,
                text,
            ]);
        }

        write_table(&mut out, &headers, &aligns, &cells)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, todo))]
    pub fn print_todo_info(&mut self, position: usize, todo: &Todo) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "position   {position}")?;
        writeln!(out, "id         {}", todo.id)?;
        writeln!(out, "text       {}", todo.text)?;
        writeln!(out, "completed  {}", todo.completed)?;
        writeln!(out, "priority   {}", todo.priority)?;
        writeln!(out, "categories {}", todo.categories.join(", "))?;
        writeln!(
            out,
            "created    {}",
            todo.created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
        )?;
        if let Some(due) = todo.due_date {
            writeln!(out, "due        {}", datetime::format_date(due))?;
        }
        if let Some(notified) = todo.notification_sent {
            writeln!(out, "notified   {notified}")?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, reminders))]
    pub fn print_reminders(&mut self, reminders: &[Reminder]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if reminders.is_empty() {
            writeln!(out, "No upcoming due dates.")?;
            return Ok(());
        }

        for reminder in reminders {
            let stamp = reminder
                .generated_at
                .with_timezone(&Local)
                .format("%b %-d, %-I:%M %p");
            writeln!(out, "{}  ({stamp})", reminder.message)?;
        }

        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        match priority {
            Priority::High => self.paint("high", "31"),
            Priority::Medium => self.paint("medium", "33"),
            Priority::Low => self.paint("low", "36"),
            Priority::None => String::new(),
        }
    }

    fn paint_due(&self, due: Option<NaiveDate>, completed: bool, today: NaiveDate) -> String {
        let Some(due) = due else {
            return String::new();
        };

        let formatted = datetime::format_date(due);
        if completed {
            formatted
        } else if due < today {
            self.paint(&formatted, "31")
        } else if due == today {
            self.paint(&formatted, "33")
        } else {
            formatted
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    aligns: &[Align],
    rows: &[Vec<String>],
) -> anyhow::Result<()> {
    let column_count = headers.len();

    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(visible_width(cell));
        }
    }

    for idx in 0..column_count {
        write_cell(&mut writer, headers[idx], widths[idx], aligns[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            write_cell(&mut writer, &row[idx], widths[idx], aligns[idx])?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn write_cell<W: Write>(
    writer: &mut W,
    cell: &str,
    width: usize,
    align: Align,
) -> anyhow::Result<()> {
    let padding = " ".repeat(width.saturating_sub(visible_width(cell)));
    match align {
        Align::Left => write!(writer, "{cell}{padding} ")?,
        Align::Right => write!(writer, "{padding}{cell} ")?,
    }
    Ok(())
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{strip_ansi, visible_width, write_table, Align};

    #[test]
    fn ansi_sequences_do_not_count_toward_width() {
        let painted = "\x1b[31moverdue\x1b[0m";
        assert_eq!(strip_ansi(painted), "overdue");
        assert_eq!(visible_width(painted), 7);
    }

    #[test]
    fn columns_line_up_under_their_headers() {
        let mut buffer = Vec::new();
        write_table(
            &mut buffer,
            &["#", "Text"],
            &[Align::Right, Align::Left],
            &[
                vec!["1".to_string(), "short".to_string()],
                vec!["10".to_string(), "a longer line".to_string()],
            ],
        )
        .expect("write");

        let rendered = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], " # Text          ");
        assert_eq!(lines[2], " 1 short         ");
        assert_eq!(lines[3], "10 a longer line ");
    }
}
