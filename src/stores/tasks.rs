use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Priority, Task, TaskFilter};
use crate::storage::{LocalStore, TASKS_KEY};

/// Task collection. New tasks go to the front; every mutation persists
/// the whole collection before returning.
pub struct TaskStore {
    tasks: Vec<Task>,
    store: LocalStore,
}

impl TaskStore {
    pub fn load(store: LocalStore) -> Self {
        let tasks = store.load(TASKS_KEY).unwrap_or_default();
        Self { tasks, store }
    }

    /// Adds a task. Empty text is rejected before any mutation.
    pub fn add(&mut self, text: &str, priority: Priority) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("task text is empty".to_string()));
        }
        let task = Task::new(text.to_string(), priority);
        self.tasks.insert(0, task.clone());
        self.persist()?;
        Ok(task)
    }

    pub fn toggle(&mut self, id: Uuid) -> Result<Task> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::UnknownId(id.to_string()))?;
        task.completed = !task.completed;
        let task = task.clone();
        self.persist()?;
        Ok(task)
    }

    /// Replaces a task's text. An empty replacement is rejected and the
    /// task keeps its old text.
    pub fn edit(&mut self, id: Uuid, text: &str) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("task text is empty".to_string()));
        }
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::UnknownId(id.to_string()))?;
        task.text = text.to_string();
        let task = task.clone();
        self.persist()?;
        Ok(task)
    }

    pub fn delete(&mut self, id: Uuid) -> Result<()> {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            return Err(AppError::UnknownId(id.to_string()));
        }
        self.persist()
    }

    /// Filtered view: incomplete tasks before completed ones, insertion
    /// order preserved within each group.
    pub fn list(&self, filter: TaskFilter) -> Vec<Task> {
        let mut listed: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        listed.sort_by_key(|t| t.completed);
        listed
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn persist(&self) -> Result<()> {
        self.store.save(TASKS_KEY, &self.tasks)
    }
}
