use std::time::Duration;

use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::parse_due_expr;
use crate::filter::FilterConfig;
use crate::ordering::{sort_for_display, SortPolicy};
use crate::reminder::ReminderCenter;
use crate::render::Renderer;
use crate::store::TodoStore;
use crate::todo::{normalize_categories, Priority, TodoDraft};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "info",
        "toggle",
        "edit",
        "due",
        "priority",
        "categories",
        "move",
        "delete",
        "clear-completed",
        "export",
        "remind",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut TodoStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    // Item-targeted commands accept their selectors on either side of the
    // command word: `docket 3 toggle` and `docket toggle 3` are the same.
    let targeted: Vec<String> = inv
        .filter_terms
        .iter()
        .chain(inv.command_args.iter())
        .cloned()
        .collect();

    match command {
        "add" => cmd_add(store, &inv.command_args, now),
        "list" => cmd_list(store, cfg, renderer, &inv.filter_terms, now),
        "info" => cmd_info(store, renderer, &targeted),
        "toggle" => cmd_toggle(store, &targeted),
        "edit" => cmd_edit(store, &targeted),
        "due" => cmd_due(store, &targeted, now),
        "priority" => cmd_priority(store, &targeted),
        "categories" => cmd_categories(store, &targeted),
        "move" => cmd_move(store, &targeted),
        "delete" => cmd_delete(store, &targeted),
        "clear-completed" => cmd_clear_completed(store),
        "export" => cmd_export(store),
        "remind" => cmd_remind(store, cfg, renderer, &inv.command_args),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Resolve a selector token to a stored todo: a 1-based position in the
/// stored order, a full UUID, or an unambiguous UUID prefix.
fn resolve_selector(store: &TodoStore, token: &str) -> Option<Uuid> {
    if let Ok(position) = token.parse::<usize>() {
        if position == 0 {
            return None;
        }
        return store.todos().get(position - 1).map(|todo| todo.id);
    }

    if let Ok(id) = Uuid::parse_str(token) {
        return store.get(id).map(|todo| todo.id);
    }

    let needle = token.to_ascii_lowercase();
    let mut matches = store
        .todos()
        .iter()
        .filter(|todo| todo.id.to_string().starts_with(&needle));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first.id)
    }
}

#[derive(Debug, Clone)]
enum DraftMod {
    Due(NaiveDate),
    Priority(Priority),
    Category(String),
}

fn parse_one_mod(tok: &str, now: chrono::DateTime<Utc>) -> anyhow::Result<Option<DraftMod>> {
    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "due" => Ok(Some(DraftMod::Due(parse_due_expr(value, now)?))),
        "pri" | "priority" => {
            let priority = Priority::parse(value)
                .ok_or_else(|| anyhow!("invalid priority: {value} (expected high, medium, low, or none)"))?;
            Ok(Some(DraftMod::Priority(priority)))
        }
        "cat" | "category" | "categories" => Ok(Some(DraftMod::Category(value.to_string()))),
        _ => Ok(None),
    }
}

fn parse_draft(args: &[String], now: chrono::DateTime<Utc>) -> anyhow::Result<TodoDraft> {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut draft = TodoDraft::default();
    let mut category_inputs: Vec<String> = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, now)? {
            match one_mod {
                DraftMod::Due(date) => draft.due_date = Some(date),
                DraftMod::Priority(priority) => draft.priority = priority,
                DraftMod::Category(raw) => category_inputs.push(raw),
            }
            continue;
        }

        text_parts.push(arg.as_str());
    }

    draft.text = text_parts.join(" ");
    draft.categories = normalize_categories(&category_inputs);
    Ok(draft)
}

#[instrument(skip(store, args, now))]
fn cmd_add(store: &mut TodoStore, args: &[String], now: chrono::DateTime<Utc>) -> anyhow::Result<()> {
    info!("command add");

    let draft = parse_draft(args, now)?;
    if draft.text.trim().is_empty() {
        return Err(anyhow!("add requires todo text"));
    }

    match store.add_with(draft) {
        Some(_) => {
            println!("Created todo {}.", store.len());
            Ok(())
        }
        None => Err(anyhow!("add requires todo text")),
    }
}

#[instrument(skip(store, cfg, renderer, filter_terms, now))]
fn cmd_list(
    store: &mut TodoStore,
    cfg: &Config,
    renderer: &mut Renderer,
    filter_terms: &[String],
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let filter = FilterConfig::parse(filter_terms)?;
    let view = store.filtered_view(&filter, now);

    let policy_raw = cfg
        .get("display.sort")
        .unwrap_or_else(|| "status,priority".to_string());
    let policy = SortPolicy::parse(&policy_raw).unwrap_or_else(|| {
        warn!(value = %policy_raw, "unknown display.sort value; using default");
        SortPolicy::default()
    });
    let rows = sort_for_display(view, policy);

    if rows.is_empty() {
        println!("No matching todos.");
        return Ok(());
    }

    let rows: Vec<(usize, &crate::todo::Todo)> = rows
        .into_iter()
        .filter_map(|todo| store.position(todo.id).map(|idx| (idx + 1, todo)))
        .collect();
    renderer.print_todo_table(&rows, now)?;
    Ok(())
}

#[instrument(skip(store, renderer, args))]
fn cmd_info(store: &mut TodoStore, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command info");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("info requires a todo selector"))?;
    let Some(id) = resolve_selector(store, token) else {
        println!("No matching todo.");
        return Ok(());
    };

    let position = store.position(id).map(|idx| idx + 1).unwrap_or_default();
    if let Some(todo) = store.get(id) {
        renderer.print_todo_info(position, todo)?;
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_toggle(store: &mut TodoStore, args: &[String]) -> anyhow::Result<()> {
    info!("command toggle");

    if args.is_empty() {
        return Err(anyhow!("toggle requires a todo selector"));
    }

    let mut changed = 0_u64;
    for token in args {
        if let Some(id) = resolve_selector(store, token)
            && store.toggle(id)
        {
            changed += 1;
        }
    }

    println!("Toggled {changed} todo(s).");
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_edit(store: &mut TodoStore, args: &[String]) -> anyhow::Result<()> {
    info!("command edit");

    let (token, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("edit requires a todo selector and new text"))?;
    if rest.is_empty() {
        return Err(anyhow!("edit requires new text"));
    }

    let Some(id) = resolve_selector(store, token) else {
        println!("No matching todo.");
        return Ok(());
    };

    if store.edit_text(id, &rest.join(" ")) {
        println!("Edited todo.");
    } else {
        println!("Nothing changed.");
    }
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_due(store: &mut TodoStore, args: &[String], now: chrono::DateTime<Utc>) -> anyhow::Result<()> {
    info!("command due");

    let (token, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("due requires a todo selector and a date expression"))?;
    let expr = rest.join(" ");
    if expr.is_empty() {
        return Err(anyhow!("due requires a date expression (or 'none' to clear)"));
    }

    let Some(id) = resolve_selector(store, token) else {
        println!("No matching todo.");
        return Ok(());
    };

    let due_date = if expr.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(parse_due_expr(&expr, now)?)
    };

    if store.edit_due_date(id, due_date) {
        match due_date {
            Some(date) => println!("Due {}.", crate::datetime::format_date(date)),
            None => println!("Cleared due date."),
        }
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_priority(store: &mut TodoStore, args: &[String]) -> anyhow::Result<()> {
    info!("command priority");

    let (token, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("priority requires a todo selector and a level"))?;
    let level = rest
        .first()
        .ok_or_else(|| anyhow!("priority requires a level (high, medium, low, or none)"))?;
    let priority = Priority::parse(level)
        .ok_or_else(|| anyhow!("invalid priority: {level} (expected high, medium, low, or none)"))?;

    let Some(id) = resolve_selector(store, token) else {
        println!("No matching todo.");
        return Ok(());
    };

    if store.edit_priority(id, priority) {
        println!("Priority set to {priority}.");
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_categories(store: &mut TodoStore, args: &[String]) -> anyhow::Result<()> {
    info!("command categories");

    let (token, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("categories requires a todo selector"))?;

    let Some(id) = resolve_selector(store, token) else {
        println!("No matching todo.");
        return Ok(());
    };

    let labels: Vec<String> = if rest.len() == 1 && rest[0].eq_ignore_ascii_case("none") {
        Vec::new()
    } else {
        rest.to_vec()
    };

    if store.edit_categories(id, &labels) {
        let stored = store
            .get(id)
            .map(|todo| todo.categories.join(", "))
            .unwrap_or_default();
        if stored.is_empty() {
            println!("Cleared categories.");
        } else {
            println!("Categories: {stored}.");
        }
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_move(store: &mut TodoStore, args: &[String]) -> anyhow::Result<()> {
    info!("command move");

    if args.len() != 2 {
        return Err(anyhow!("move requires two selectors: the todo to move and its destination"));
    }

    let Some(active) = resolve_selector(store, &args[0]) else {
        println!("No matching todo.");
        return Ok(());
    };
    let Some(over) = resolve_selector(store, &args[1]) else {
        println!("No matching todo.");
        return Ok(());
    };

    if store.reorder(active, over) {
        println!("Moved todo.");
    } else {
        println!("Nothing moved.");
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_delete(store: &mut TodoStore, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");

    if args.is_empty() {
        return Err(anyhow!("delete requires a todo selector"));
    }

    // Resolve everything first so positional selectors do not shift as
    // entries disappear.
    let ids: Vec<Option<Uuid>> = args
        .iter()
        .map(|token| resolve_selector(store, token))
        .collect();

    let mut removed = 0_u64;
    for id in ids.into_iter().flatten() {
        if store.delete(id) {
            removed += 1;
        }
    }

    println!("Deleted {removed} todo(s).");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_clear_completed(store: &mut TodoStore) -> anyhow::Result<()> {
    info!("command clear-completed");

    let removed = store.clear_completed();
    println!("Cleared {removed} completed todo(s).");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_export(store: &mut TodoStore) -> anyhow::Result<()> {
    info!("command export");

    let payload = serde_json::to_string_pretty(store.todos())?;
    println!("{payload}");
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_remind(
    store: &mut TodoStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command remind");

    let lookahead = cfg.get_i64("reminder.lookahead.hours").unwrap_or(24).max(1);
    let mut center = ReminderCenter::new(lookahead);

    match args.first().map(String::as_str) {
        None => {
            center.check(store.todos(), Utc::now());
            renderer.print_reminders(center.unread())?;
            Ok(())
        }

        Some("watch") => {
            let interval = cfg
                .get_i64("reminder.interval.seconds")
                .unwrap_or(60)
                .max(1);
            info!(interval, lookahead, "watching for due todos");

            loop {
                // Pick up edits made by other invocations before scanning.
                store.load();
                let fresh = center.check(store.todos(), Utc::now());
                for reminder in &fresh {
                    println!("{}", reminder.message);
                }
                std::thread::sleep(Duration::from_secs(interval as u64));
            }
        }

        Some("ack") => {
            let token = args
                .get(1)
                .ok_or_else(|| anyhow!("remind ack requires a todo selector"))?;
            let Some(id) = resolve_selector(store, token) else {
                println!("No matching todo.");
                return Ok(());
            };

            if store.mark_notified(id) {
                println!("Acknowledged reminder.");
            }
            Ok(())
        }

        Some(other) => Err(anyhow!("unknown remind subcommand: {other} (expected watch or ack)")),
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: docket [filter terms] <command> [args]");
    println!();
    println!("commands:");
    println!("  add <text> [due:<date>] [pri:<level>] [cat:<labels>]");
    println!("  list                     show todos matching the filter terms");
    println!("  info <sel>               show one todo in full");
    println!("  toggle <sel>...          flip completion");
    println!("  edit <sel> <text>        replace the text");
    println!("  due <sel> <date|none>    set or clear the due date");
    println!("  priority <sel> <level>   set the priority");
    println!("  categories <sel> <labels|none>");
    println!("  move <sel> <sel>         move the first todo to the second's position");
    println!("  delete <sel>...          remove todos");
    println!("  clear-completed          remove every completed todo");
    println!("  export                   print the collection as JSON");
    println!("  remind [watch|ack <sel>] show, watch, or acknowledge due-date reminders");
    println!();
    println!("filter terms: status:<all|active|completed> priority:<level|all>");
    println!("              due:<today|upcoming|overdue|all> plus free text to search");
    Ok(())
}
