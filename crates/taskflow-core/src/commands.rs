use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::backup::ExportDocument;
use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::KeyValueStore;
use crate::datetime::{parse_due_date, to_project_date};
use crate::filter::TaskFilter;
use crate::prompt::Confirm;
use crate::render::{Renderer, short_id};
use crate::store::TaskStore;
use crate::task::{CategoryDraft, DEFAULT_CATEGORY_COLOR, TaskDraft, TaskPatch};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "modify",
        "edit",
        "delete",
        "toggle",
        "info",
        "list",
        "recent",
        "dashboard",
        "categories",
        "category",
        "export",
        "import",
        "clear",
        "show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Everything a command needs: the store, settings, output and the
/// confirmation channel.
pub struct Session<'a, S: KeyValueStore, W: Write> {
    pub store: &'a mut TaskStore<S>,
    pub cfg: &'a Config,
    pub renderer: &'a mut Renderer<W>,
    pub confirm: &'a mut dyn Confirm,
    pub now: DateTime<Utc>,
}

impl<S: KeyValueStore, W: Write> Session<'_, S, W> {
    fn today(&self) -> NaiveDate {
        to_project_date(self.now)
    }
}

#[instrument(skip(session, inv), fields(command = %inv.command))]
pub fn dispatch<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    inv: Invocation,
) -> anyhow::Result<()> {
    debug!(args = ?inv.args, "dispatching command");
    let args = inv.args.as_slice();

    match inv.command.as_str() {
        "add" => cmd_add(session, args),
        "modify" | "edit" => cmd_modify(session, args),
        "delete" => cmd_delete(session, args),
        "toggle" => cmd_toggle(session, args),
        "info" => cmd_info(session, args),
        "list" => cmd_list(session, args),
        "recent" => cmd_recent(session, args),
        "dashboard" => cmd_dashboard(session),
        "categories" => cmd_categories(session),
        "category" => cmd_category(session, args),
        "export" => cmd_export(session, args),
        "import" => cmd_import(session, args),
        "clear" => cmd_clear(session),
        "show" => session.renderer.settings(session.cfg),
        "help" => cmd_help(session),
        "version" => session.renderer.line(env!("CARGO_PKG_VERSION")),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip_all)]
fn cmd_add<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command add");

    let patch = parse_task_args(session.store, args, session.today())?;
    let draft = TaskDraft {
        title: patch.title.ok_or_else(|| anyhow!("add: a title is required"))?,
        description: patch.description.unwrap_or_default(),
        due_date: patch.due_date.flatten(),
        priority: match patch.priority {
            Some(priority) => priority,
            None => session.cfg.default_priority()?,
        },
        status: match patch.status {
            Some(status) => status,
            None => session.cfg.default_status()?,
        },
        category: patch.category.flatten(),
    };

    let task = session.store.add_task(draft, session.now)?;
    session
        .renderer
        .line(&format!("Created task {} \"{}\".", short_id(&task.id), task.title))
}

#[instrument(skip_all)]
fn cmd_modify<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command modify");

    let (token, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("modify: a task id is required"))?;
    let id = session.store.resolve_task_id(token)?;
    let patch = parse_task_args(session.store, rest, session.today())?;
    if patch.is_empty() {
        return Err(anyhow!("modify: nothing to change"));
    }

    match session.store.update_task(&id, patch, session.now)? {
        Some(task) => session
            .renderer
            .line(&format!("Modified task {} \"{}\".", short_id(&task.id), task.title)),
        None => session.renderer.line(&format!("No task with id {id}.")),
    }
}

#[instrument(skip_all)]
fn cmd_delete<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command delete");

    let id = single_task_arg(session, args, "delete")?;
    let title = session
        .store
        .task(&id)
        .map(|task| task.title.clone())
        .unwrap_or_default();

    if !session
        .confirm
        .confirm(&format!("Are you sure you want to delete \"{title}\"?"))?
    {
        return session.renderer.line("Nothing deleted.");
    }

    if session.store.delete_task(&id)? {
        session.renderer.line(&format!("Deleted task \"{title}\"."))
    } else {
        session.renderer.line(&format!("No task with id {id}."))
    }
}

#[instrument(skip_all)]
fn cmd_toggle<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command toggle");

    let id = single_task_arg(session, args, "toggle")?;
    match session.store.toggle_status(&id, session.now)? {
        Some(status) => session
            .renderer
            .line(&format!("Task status changed to {}.", status.label())),
        None => session.renderer.line(&format!("No task with id {id}.")),
    }
}

#[instrument(skip_all)]
fn cmd_info<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    let id = single_task_arg(session, args, "info")?;
    let today = session.today();
    let task = session
        .store
        .task(&id)
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    let category = session.store.task_category(task);
    session.renderer.task_info(task, category, today)
}

#[instrument(skip_all)]
fn cmd_list<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command list");

    let store = &*session.store;
    let filter = TaskFilter::from_terms(args, |token| {
        store.resolve_category(token).map(|category| category.id.clone())
    })?;
    let rows = store.query(&filter);
    debug!(matched = rows.len(), total = store.tasks().len(), "filtered tasks");

    session
        .renderer
        .task_table(&rows, store.categories(), to_project_date(session.now))
}

#[instrument(skip_all)]
fn cmd_recent<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    let limit = match args {
        [] => session.cfg.recent_limit()?,
        [n] => n
            .parse()
            .with_context(|| format!("recent: expected a count, got {n}"))?,
        _ => return Err(anyhow!("recent: expected at most one argument")),
    };

    let store = &*session.store;
    let rows = store.recent_tasks(limit);
    session
        .renderer
        .task_table(&rows, store.categories(), to_project_date(session.now))
}

#[instrument(skip_all)]
fn cmd_dashboard<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
) -> anyhow::Result<()> {
    let today = session.today();
    let limit = session.cfg.recent_limit()?;
    let store = &*session.store;
    let stats = store.dashboard_stats(today);
    let recent = store.recent_tasks(limit);
    session
        .renderer
        .dashboard(&stats, &recent, store.categories(), today)
}

#[instrument(skip_all)]
fn cmd_categories<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
) -> anyhow::Result<()> {
    let summaries = session.store.category_summaries();
    session.renderer.category_table(&summaries)
}

#[instrument(skip_all)]
fn cmd_category<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    let Some((action, rest)) = args.split_first() else {
        return cmd_categories(session);
    };

    match expand_command_abbrev(action, &["add", "delete"]) {
        Some("add") => cmd_category_add(session, rest),
        Some("delete") => cmd_category_delete(session, rest),
        _ => Err(anyhow!("category: expected `add` or `delete`, got {action}")),
    }
}

fn cmd_category_add<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command category add");

    let mut color = DEFAULT_CATEGORY_COLOR.to_string();
    let mut words = Vec::new();
    for arg in args {
        match arg.split_once(':') {
            Some((key, value)) if key.eq_ignore_ascii_case("color") => {
                color = value.to_string();
            }
            _ => words.push(arg.as_str()),
        }
    }

    let category = session
        .store
        .add_category(CategoryDraft::new(words.join(" "), color), session.now)?;
    session.renderer.line(&format!(
        "Created category {} \"{}\".",
        short_id(&category.id),
        category.name
    ))
}

fn cmd_category_delete<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command category delete");

    if args.is_empty() {
        return Err(anyhow!("category delete: a category id or name is required"));
    }
    let category = session.store.resolve_category(&args.join(" "))?;
    let (id, name) = (category.id.clone(), category.name.clone());

    if !session.confirm.confirm(&format!(
        "Are you sure you want to delete the category \"{name}\"? \
         Tasks in this category will not be deleted."
    ))? {
        return session.renderer.line("Nothing deleted.");
    }

    match session.store.delete_category(&id)? {
        Some(detached) => session.renderer.line(&format!(
            "Deleted category \"{name}\"; {detached} task(s) now have no category."
        )),
        None => session.renderer.line(&format!("No category with id {id}.")),
    }
}

#[instrument(skip_all)]
fn cmd_export<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command export");

    let document = session.store.export(session.now);
    match args {
        [] => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            let path = document.write_into(&cwd)?;
            session
                .renderer
                .line(&format!("Exported data to {}.", path.display()))
        }
        [dash] if dash == "-" => session.renderer.line(&document.to_json_pretty()?),
        [path] => {
            let path = Path::new(path);
            let path = if path.is_dir() {
                document.write_into(path)?
            } else {
                document.write_to(path)?;
                path.to_path_buf()
            };
            session
                .renderer
                .line(&format!("Exported data to {}.", path.display()))
        }
        _ => Err(anyhow!("export: expected at most one path")),
    }
}

#[instrument(skip_all)]
fn cmd_import<S: KeyValueStore, W: Write>(
    session: &mut Session<'_, S, W>,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command import");

    let document = match args {
        [dash] if dash == "-" => {
            if session.confirm.reads_stdin() {
                return Err(anyhow!(
                    "import -: stdin carries the backup, so it cannot answer the \
                     confirmation; pass --yes or import from a file"
                ));
            }
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("failed reading stdin")?;
            ExportDocument::from_json(&raw)?
        }
        [path] => ExportDocument::read_from(Path::new(path))?,
        _ => return Err(anyhow!("import: expected one backup path (or - for stdin)")),
    };

    let (tasks, categories) = (document.tasks.len(), document.categories.len());
    if !session.confirm.confirm(&format!(
        "Replace all current data with {tasks} task(s) and {categories} category(ies) \
         from the backup?"
    ))? {
        return session.renderer.line("Nothing imported.");
    }

    session.store.restore(document, session.now)?;
    session.renderer.line(&format!(
        "Imported {} task(s) and {} category(ies).",
        session.store.tasks().len(),
        session.store.categories().len()
    ))
}

#[instrument(skip_all)]
fn cmd_clear<S: KeyValueStore, W: Write>(session: &mut Session<'_, S, W>) -> anyhow::Result<()> {
    info!("command clear");

    let confirmed = session
        .confirm
        .confirm("Are you sure you want to clear all data? This action cannot be undone.")?
        && session
            .confirm
            .confirm("This will delete all tasks and categories. Are you absolutely sure?")?;
    if !confirmed {
        return session.renderer.line("Nothing cleared.");
    }

    session.store.clear_all(session.now)?;
    session.renderer.line("All data cleared.")
}

fn cmd_help<S: KeyValueStore, W: Write>(session: &mut Session<'_, S, W>) -> anyhow::Result<()> {
    const HELP: &str = "\
usage: taskflow [-v|-q] [-y] [--rc key=value] [--data DIR] <command> [args]

  add <title> [mods]            create a task
  modify <id> [title] [mods]    change a task (alias: edit)
  toggle <id>                   todo -> in progress -> completed -> todo
  delete <id>                   delete a task
  info <id>                     show one task
  list [words] [filters]        list tasks; filters: status: priority: category:
  recent [n]                    the n most recently created tasks
  dashboard                     counters, progress and recent tasks
  categories                    list categories with task counts
  category add <name> [color:#hex]
  category delete <id|name>     delete a category; its tasks are kept
  export [path|-]               write a JSON backup
  import <path|->               replace all data with a JSON backup
  clear                         delete everything and restore default categories
  show                          print effective settings

mods: title: desc: due: priority: status: category:  (`--` ends mods)";
    session.renderer.line(HELP)
}

fn single_task_arg<S: KeyValueStore, W: Write>(
    session: &Session<'_, S, W>,
    args: &[String],
    command: &str,
) -> anyhow::Result<String> {
    match args {
        [token] => session.store.resolve_task_id(token),
        [] => Err(anyhow!("{command}: a task id is required")),
        _ => Err(anyhow!("{command}: expected exactly one task id")),
    }
}

/// Splits task arguments into title words and `key:value` modifiers.
/// Words after `--` are always title text.
#[instrument(skip(store, today))]
fn parse_task_args<S: KeyValueStore>(
    store: &TaskStore<S>,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<TaskPatch> {
    let mut patch = TaskPatch::default();
    let mut words = Vec::new();
    let mut literal = false;

    for arg in args {
        if !literal && arg == "--" {
            literal = true;
            continue;
        }
        if literal || !apply_modifier(store, &mut patch, arg, today)? {
            words.push(arg.as_str());
        }
    }

    if !words.is_empty() {
        if patch.title.is_some() {
            return Err(anyhow!(
                "give the title either as words or with title:, not both"
            ));
        }
        patch.title = Some(words.join(" "));
    }

    Ok(patch)
}

/// Returns `false` when `token` is not a recognised modifier.
fn apply_modifier<S: KeyValueStore>(
    store: &TaskStore<S>,
    patch: &mut TaskPatch,
    token: &str,
    today: NaiveDate,
) -> anyhow::Result<bool> {
    let Some((key, value)) = token.split_once(':') else {
        return Ok(false);
    };

    match key.to_ascii_lowercase().as_str() {
        "title" => patch.title = Some(value.to_string()),
        "desc" | "description" => patch.description = Some(value.to_string()),
        "due" => patch.due_date = Some(parse_due_date(value, today)?),
        "pri" | "priority" => patch.priority = Some(value.parse()?),
        "status" => patch.status = Some(value.parse()?),
        "cat" | "category" => {
            patch.category = Some(match value.trim() {
                "" | "none" => None,
                token => Some(store.resolve_category(token)?.id.clone()),
            });
        }
        other => {
            warn!(key = other, "unknown modifier; treating as title text");
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("dash", &known), Some("dashboard"));
        assert_eq!(expand_command_abbrev("category", &known), Some("category"));
        assert_eq!(expand_command_abbrev("cat", &known), None);
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }
}
