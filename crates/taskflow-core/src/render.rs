use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_project_timestamp;
use crate::store::{CategorySummary, DashboardStats};
use crate::task::{Category, Priority, Status, Task};

const PROGRESS_BAR_WIDTH: usize = 30;

/// Writes tables and messages; colors only when enabled and attached to a
/// terminal.
#[derive(Debug)]
pub struct Renderer<W: Write> {
    out: W,
    color: bool,
}

impl Renderer<io::Stdout> {
    pub fn stdout(cfg: &Config) -> anyhow::Result<Self> {
        let color = color_setting(cfg)? && io::stdout().is_terminal();
        Ok(Self::new(io::stdout(), color))
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn line(&mut self, text: &str) -> anyhow::Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(rows = tasks.len()))]
    pub fn task_table(
        &mut self,
        tasks: &[&Task],
        categories: &[Category],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            return self.line("No tasks found.");
        }

        let headers = ["ID", "Status", "Pri", "Due", "Category", "Title"];
        let rows: Vec<Vec<String>> = tasks
            .iter()
            .map(|task| {
                let category = lookup_category(task, categories);
                vec![
                    self.paint(short_id(&task.id), "33"),
                    self.status_cell(task.status),
                    self.priority_cell(task.priority),
                    self.due_cell(task, today),
                    self.category_cell(category),
                    task.title.clone(),
                ]
            })
            .collect();

        write_table(&mut self.out, &headers, rows)
    }

    #[tracing::instrument(skip_all, fields(id = %task.id))]
    pub fn task_info(
        &mut self,
        task: &Task,
        category: Option<&Category>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let due = self.due_cell(task, today);
        let category = self.category_cell(category);
        let status = self.status_cell(task.status);
        let priority = self.priority_cell(task.priority);

        writeln!(self.out, "id           {}", task.id)?;
        writeln!(self.out, "title        {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(self.out, "description  {}", task.description)?;
        }
        writeln!(self.out, "status       {status}")?;
        writeln!(self.out, "priority     {priority}")?;
        writeln!(self.out, "category     {category}")?;
        if task.due_date.is_some() {
            writeln!(self.out, "due          {due}")?;
        }
        writeln!(self.out, "created      {}", format_project_timestamp(task.created_at))?;
        writeln!(self.out, "updated      {}", format_project_timestamp(task.updated_at))?;
        Ok(())
    }

    pub fn category_table(&mut self, summaries: &[CategorySummary<'_>]) -> anyhow::Result<()> {
        if summaries.is_empty() {
            return self.line("No categories yet.");
        }

        let headers = ["ID", "Name", "Color", "Tasks"];
        let rows = summaries
            .iter()
            .map(|summary| {
                let count = summary.task_count;
                vec![
                    self.paint(short_id(&summary.category.id), "33"),
                    self.category_cell(Some(summary.category)),
                    summary.category.color.clone(),
                    format!("{count} task{}", if count == 1 { "" } else { "s" }),
                ]
            })
            .collect();

        write_table(&mut self.out, &headers, rows)
    }

    pub fn dashboard(
        &mut self,
        stats: &DashboardStats,
        recent: &[&Task],
        categories: &[Category],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(self.out, "Total tasks   {}", stats.total)?;
        writeln!(self.out, "Completed     {}", stats.completed)?;
        writeln!(self.out, "In progress   {}", stats.in_progress)?;
        writeln!(self.out, "To do         {}", stats.todo)?;
        if stats.overdue > 0 {
            let overdue = self.paint(&stats.overdue.to_string(), "31");
            writeln!(self.out, "Overdue       {overdue}")?;
        }

        let filled = PROGRESS_BAR_WIDTH * usize::from(stats.progress_percent) / 100;
        let bar = format!(
            "{}{}",
            self.paint(&"█".repeat(filled), "32"),
            "░".repeat(PROGRESS_BAR_WIDTH - filled)
        );
        writeln!(self.out, "Progress      {bar} {}%", stats.progress_percent)?;
        writeln!(self.out)?;

        writeln!(self.out, "Recent tasks")?;
        if recent.is_empty() {
            return self.line("No tasks yet. Create your first task!");
        }
        self.task_table(recent, categories, today)
    }

    pub fn settings(&mut self, cfg: &Config) -> anyhow::Result<()> {
        let mut entries: Vec<(&String, &String)> = cfg.iter().collect();
        entries.sort();
        let rows = entries
            .into_iter()
            .map(|(key, value)| vec![key.clone(), value.clone()])
            .collect();
        write_table(&mut self.out, &["Setting", "Value"], rows)
    }

    fn status_cell(&self, status: Status) -> String {
        let code = match status {
            Status::Todo => "0",
            Status::InProgress => "34",
            Status::Completed => "32",
        };
        self.paint(status.label(), code)
    }

    fn priority_cell(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::Low => "32",
            Priority::Medium => "33",
            Priority::High => "31",
        };
        self.paint(priority.as_str(), code)
    }

    fn due_cell(&self, task: &Task, today: NaiveDate) -> String {
        let Some(due) = task.due_date else {
            return String::new();
        };
        let text = due.format("%Y-%m-%d").to_string();
        if task.is_overdue(today) {
            self.paint(&format!("{text} (overdue)"), "31")
        } else {
            text
        }
    }

    fn category_cell(&self, category: Option<&Category>) -> String {
        match category {
            Some(category) => match hex_to_rgb(&category.color) {
                Some((r, g, b)) => self.paint(&category.name, &format!("38;2;{r};{g};{b}")),
                None => category.name.clone(),
            },
            None => "-".to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Eight characters are enough to tell generated UUIDs apart; shorter
/// legacy ids are shown whole.
pub fn short_id(id: &str) -> &str {
    if id.len() == 36 && id.is_char_boundary(8) {
        &id[..8]
    } else {
        id
    }
}

fn color_setting(cfg: &Config) -> anyhow::Result<bool> {
    Ok(cfg.get_bool("color")?.unwrap_or(true))
}

fn lookup_category<'a>(task: &Task, categories: &'a [Category]) -> Option<&'a Category> {
    let id = task.category.as_deref()?;
    categories.iter().find(|category| category.id == id)
}

fn hex_to_rgb(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut it = hex.chars().map(|c| channel(&format!("{c}{c}")));
            Some((it.next()??, it.next()??, it.next()??))
        }
        6 => Some((
            channel(hex.get(0..2)?)?,
            channel(hex.get(2..4)?)?,
            channel(hex.get(4..6)?)?,
        )),
        _ => None,
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| UnicodeWidthStr::width(*h)).collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let last = column_count.saturating_sub(1);
    for (idx, header) in headers.iter().enumerate() {
        if idx == last {
            writeln!(writer, "{header}")?;
        } else {
            write!(writer, "{:width$} ", header, width = widths[idx])?;
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(writer, "{}", rule.join(" "))?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            if idx == last {
                write!(writer, "{cell}")?;
                continue;
            }
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
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
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::task::TaskDraft;

    fn rendered(f: impl FnOnce(&mut Renderer<Vec<u8>>) -> anyhow::Result<()>) -> String {
        let mut renderer = Renderer::new(Vec::new(), false);
        f(&mut renderer).expect("render");
        String::from_utf8(renderer.into_inner()).expect("utf8")
    }

    #[test]
    fn tables_align_wide_characters() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            &["A", "B"],
            vec![
                vec!["日本".to_string(), "x".to_string()],
                vec!["\x1b[31mab\x1b[0m".to_string(), "y".to_string()],
            ],
        )
        .expect("write table");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A    B");
        assert_eq!(lines[1], "---- -");
        assert_eq!(lines[2], "日本 x");
        assert_eq!(lines[3], "\x1b[31mab\x1b[0m   y");
    }

    #[test]
    fn dangling_category_renders_as_dash() {
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 9, 0, 0).single().expect("valid");
        let today = NaiveDate::from_ymd_opt(2026, 5, 2).expect("valid date");
        let task = Task::from_draft(
            "abc".to_string(),
            TaskDraft {
                title: "Orphan".to_string(),
                category: Some("gone".to_string()),
                due_date: NaiveDate::from_ymd_opt(2026, 5, 1),
                ..TaskDraft::default()
            },
            now,
        );

        let text = rendered(|r| r.task_table(&[&task], &Category::defaults(now), today));
        let row = text.lines().nth(2).expect("data row");
        assert!(row.contains(" - "));
        assert!(row.contains("2026-05-01 (overdue)"));
        assert!(row.ends_with("Orphan"));
    }

    #[test]
    fn empty_lists_show_the_empty_state() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 2).expect("valid date");
        assert_eq!(rendered(|r| r.task_table(&[], &[], today)), "No tasks found.\n");
    }

    #[test]
    fn dashboard_draws_a_progress_bar() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 2).expect("valid date");
        let stats = DashboardStats {
            total: 2,
            completed: 1,
            todo: 1,
            progress_percent: 50,
            ..DashboardStats::default()
        };
        let text = rendered(|r| r.dashboard(&stats, &[], &[], today));
        let expected = format!("Progress      {}{} 50%", "█".repeat(15), "░".repeat(15));
        assert!(text.contains(&expected));
        assert!(text.ends_with("No tasks yet. Create your first task!\n"));
    }

    #[test]
    fn short_ids_only_trim_uuids() {
        assert_eq!(short_id("0b6f0c5e-6a55-4c52-9d1e-3a2f9b7c1d20"), "0b6f0c5e");
        assert_eq!(short_id("1700000000000"), "1700000000000");
        assert_eq!(hex_to_rgb("#0f8"), Some((0, 255, 136)));
    }
}
