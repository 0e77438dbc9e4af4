//! The task store: both collections, every mutation, and the derived views.
//!
//! Each mutation persists the collections it touched before returning. A
//! failed write is returned to the caller but does not roll back the
//! in-memory change. Operations addressed at an id that does not exist are
//! no-ops and say so through their return value.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backup::ExportDocument;
use crate::datastore::{CATEGORIES_KEY, KeyValueStore, TASKS_KEY, load_collection, save_collection};
use crate::datetime::truncate_to_millis;
use crate::error::TaskflowError;
use crate::filter::TaskFilter;
use crate::task::{
    Category, CategoryDraft, Status, Task, TaskDraft, TaskPatch, normalize_color, validate_title,
};

pub const DEFAULT_RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub overdue: usize,
    /// `round(100 * completed / total)`, 0 for an empty store.
    pub progress_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary<'a> {
    pub category: &'a Category,
    pub task_count: usize,
}

#[derive(Debug)]
pub struct TaskStore<S: KeyValueStore> {
    storage: S,
    tasks: Vec<Task>,
    categories: Vec<Category>,
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Loads both collections and seeds the default categories when none
    /// exist.
    #[tracing::instrument(skip(storage, now))]
    pub fn open(storage: S, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let tasks = load_collection(&storage, TASKS_KEY);
        let categories = load_collection(&storage, CATEGORIES_KEY);
        let mut store = Self {
            storage,
            tasks,
            categories,
        };
        store.seed_default_categories(now)?;

        info!(
            tasks = store.tasks.len(),
            categories = store.categories.len(),
            "opened task store"
        );
        Ok(store)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    /// The category a task points at, or `None` when the reference is empty
    /// or dangling.
    pub fn task_category(&self, task: &Task) -> Option<&Category> {
        task.category.as_deref().and_then(|id| self.category(id))
    }

    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub fn add_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task> {
        validate_title(&draft.title)?;

        let now = truncate_to_millis(now);
        let id = self.fresh_task_id();
        let task = Task::from_draft(id, draft, now);
        if let Some(category) = task.category.as_deref()
            && self.category(category).is_none()
        {
            warn!(category, "new task references an unknown category");
        }

        self.tasks.push(task.clone());
        self.save_tasks()?;

        info!(id = %task.id, count = self.tasks.len(), "task added");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch, now))]
    pub fn update_task(
        &mut self,
        id: &str,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        if let Some(title) = patch.title.as_deref() {
            validate_title(title)?;
        }

        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!("update ignored; no such task");
            return Ok(None);
        };
        task.apply(patch, truncate_to_millis(now));
        let updated = task.clone();

        self.save_tasks()?;
        info!(id, "task updated");
        Ok(Some(updated))
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: &str) -> anyhow::Result<bool> {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        if self.tasks.len() == before {
            debug!("delete ignored; no such task");
            return Ok(false);
        }

        self.save_tasks()?;
        info!(id, remaining = self.tasks.len(), "task deleted");
        Ok(true)
    }

    /// Advances `todo -> in-progress -> completed -> todo` and returns the new
    /// status.
    #[tracing::instrument(skip(self, now))]
    pub fn toggle_status(&mut self, id: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Status>> {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!("toggle ignored; no such task");
            return Ok(None);
        };
        let from = task.status;
        task.status = from.next();
        task.touch(truncate_to_millis(now));
        let to = task.status;

        self.save_tasks()?;
        info!(id, %from, %to, "task status toggled");
        Ok(Some(to))
    }

    #[tracing::instrument(skip(self, draft, now), fields(name = %draft.name))]
    pub fn add_category(
        &mut self,
        draft: CategoryDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Category> {
        if draft.name.trim().is_empty() {
            return Err(TaskflowError::EmptyCategoryName.into());
        }
        let draft = CategoryDraft {
            color: normalize_color(&draft.color)?,
            ..draft
        };

        let id = self.fresh_category_id();
        let category = Category::from_draft(id, draft, truncate_to_millis(now));
        self.categories.push(category.clone());
        self.save_categories()?;

        info!(id = %category.id, "category added");
        Ok(category)
    }

    /// Removes a category and clears the reference on every task that
    /// pointed at it. Returns how many tasks were detached, or `None` if the
    /// category did not exist.
    #[tracing::instrument(skip(self))]
    pub fn delete_category(&mut self, id: &str) -> anyhow::Result<Option<usize>> {
        let before = self.categories.len();
        self.categories.retain(|category| category.id != id);
        if self.categories.len() == before {
            debug!("category delete ignored; no such category");
            return Ok(None);
        }

        let mut detached = 0_usize;
        for task in &mut self.tasks {
            if task.category.as_deref() == Some(id) {
                task.category = None;
                detached += 1;
            }
        }

        self.save_categories()?;
        self.save_tasks()?;
        info!(id, detached, "category deleted");
        Ok(Some(detached))
    }

    pub fn query(&self, filter: &TaskFilter) -> Vec<&Task> {
        if filter.is_wildcard() {
            return self.tasks.iter().collect();
        }
        self.tasks
            .iter()
            .filter(|task| filter.matches(task, &self.categories))
            .collect()
    }

    /// The `limit` most recently created tasks, newest first. Tasks created
    /// at the same instant keep their insertion order.
    pub fn recent_tasks(&self, limit: usize) -> Vec<&Task> {
        let mut rows: Vec<&Task> = self.tasks.iter().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        rows
    }

    pub fn dashboard_stats(&self, today: NaiveDate) -> DashboardStats {
        let mut stats = DashboardStats {
            total: self.tasks.len(),
            ..DashboardStats::default()
        };
        for task in &self.tasks {
            match task.status {
                Status::Todo => stats.todo += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::Completed => stats.completed += 1,
            }
            if task.is_overdue(today) {
                stats.overdue += 1;
            }
        }
        stats.progress_percent = progress_percent(stats.completed, stats.total);
        stats
    }

    pub fn category_summaries(&self) -> Vec<CategorySummary<'_>> {
        self.categories
            .iter()
            .map(|category| CategorySummary {
                category,
                task_count: self
                    .tasks
                    .iter()
                    .filter(|task| task.category.as_deref() == Some(category.id.as_str()))
                    .count(),
            })
            .collect()
    }

    /// Resolves a user-typed token to a task id: exact id first, then a
    /// unique id prefix.
    pub fn resolve_task_id(&self, token: &str) -> anyhow::Result<String> {
        let token = token.trim();
        if let Some(task) = self.task(token) {
            return Ok(task.id.clone());
        }
        unique_prefix_match(self.tasks.iter().map(|task| task.id.as_str()), token)?
            .map(str::to_string)
            .ok_or_else(|| TaskflowError::UnknownTask(token.to_string()).into())
    }

    /// Resolves a category by exact id, case-insensitive name, or unique id
    /// prefix, in that order.
    pub fn resolve_category(&self, token: &str) -> anyhow::Result<&Category> {
        let token = token.trim();
        if let Some(category) = self.category(token) {
            return Ok(category);
        }

        let by_name: Vec<&Category> = self
            .categories
            .iter()
            .filter(|category| category.name.to_lowercase() == token.to_lowercase())
            .collect();
        match by_name.as_slice() {
            [one] => return Ok(*one),
            [] => {}
            many => {
                return Err(TaskflowError::AmbiguousId {
                    token: token.to_string(),
                    count: many.len(),
                }
                .into());
            }
        }

        let id = unique_prefix_match(self.categories.iter().map(|c| c.id.as_str()), token)?
            .ok_or_else(|| TaskflowError::UnknownCategory(token.to_string()))?;
        self.category(id)
            .ok_or_else(|| TaskflowError::UnknownCategory(token.to_string()).into())
    }

    pub fn export(&self, now: DateTime<Utc>) -> ExportDocument {
        ExportDocument {
            tasks: self.tasks.clone(),
            categories: self.categories.clone(),
            exported_at: truncate_to_millis(now),
        }
    }

    /// Replaces both collections with the contents of a backup. Records
    /// with an id already seen earlier in the document are dropped.
    #[tracing::instrument(skip(self, document, now))]
    pub fn restore(&mut self, document: ExportDocument, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        let tasks: Vec<Task> = document
            .tasks
            .into_iter()
            .filter(|task| seen.insert(task.id.clone()))
            .collect();
        let mut seen = HashSet::new();
        let categories: Vec<Category> = document
            .categories
            .into_iter()
            .filter(|category| seen.insert(category.id.clone()))
            .collect();

        self.tasks = tasks;
        self.categories = categories;
        self.save_tasks()?;
        self.save_categories()?;
        self.seed_default_categories(now)?;

        info!(
            tasks = self.tasks.len(),
            categories = self.categories.len(),
            "restored from backup"
        );
        Ok(())
    }

    /// Erases both persisted collections and starts over with the default
    /// categories.
    #[tracing::instrument(skip(self, now))]
    pub fn clear_all(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.storage.remove(TASKS_KEY)?;
        self.storage.remove(CATEGORIES_KEY)?;
        self.tasks.clear();
        self.categories.clear();
        self.seed_default_categories(now)?;

        info!("cleared all data");
        Ok(())
    }

    fn seed_default_categories(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        if !self.categories.is_empty() {
            return Ok(());
        }
        self.categories = Category::defaults(truncate_to_millis(now));
        self.save_categories()?;
        info!(count = self.categories.len(), "seeded default categories");
        Ok(())
    }

    fn fresh_task_id(&self) -> String {
        fresh_id(|candidate| self.task(candidate).is_some())
    }

    fn fresh_category_id(&self) -> String {
        fresh_id(|candidate| self.category(candidate).is_some())
    }

    fn save_tasks(&mut self) -> anyhow::Result<()> {
        save_collection(&mut self.storage, TASKS_KEY, &self.tasks)
    }

    fn save_categories(&mut self) -> anyhow::Result<()> {
        save_collection(&mut self.storage, CATEGORIES_KEY, &self.categories)
    }
}

/// Random UUIDv4, redrawn on a clash with an existing id.
fn fresh_id(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = Uuid::new_v4().to_string();
        if !taken(&candidate) {
            return candidate;
        }
    }
}

fn unique_prefix_match<'a>(
    ids: impl Iterator<Item = &'a str>,
    prefix: &str,
) -> anyhow::Result<Option<&'a str>> {
    if prefix.is_empty() {
        return Ok(None);
    }
    let matches: Vec<&str> = ids.filter(|id| id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        many => Err(TaskflowError::AmbiguousId {
            token: prefix.to_string(),
            count: many.len(),
        }
        .into()),
    }
}

fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    // Integer form of round-half-up on 100 * completed / total.
    let rounded = (200 * completed + total) / (2 * total);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}
