use crate::error::AppError;
use crate::model::{Filter, Priority, Task, format_due_date, now_millis};
use crate::storage::{KeyValueStore, Persistence};
use time::Date;

/// Snapshot handed to renderers after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    pub filter: Filter,
    pub tasks: Vec<Task>,
    pub remaining: usize,
    pub show_empty_state: bool,
}

impl RenderedView {
    pub fn remaining_label(&self) -> String {
        remaining_label(self.remaining)
    }
}

pub fn remaining_label(remaining: usize) -> String {
    let suffix = if remaining == 1 { "" } else { "s" };
    format!("{remaining} task{suffix} remaining")
}

pub trait Renderer {
    fn render(&mut self, view: &RenderedView);
}

impl<F> Renderer for F
where
    F: FnMut(&RenderedView),
{
    fn render(&mut self, view: &RenderedView) {
        self(view)
    }
}

/// Result of a mutation that touched a task. `saved` is false when the store
/// rejected the write; the in-memory change stands either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub task: Task,
    pub saved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
}

/// Owns the task collection and the active filter for one session.
pub struct TaskList<S> {
    persistence: Persistence<S>,
    tasks: Vec<Task>,
    filter: Filter,
    renderers: Vec<Box<dyn Renderer>>,
}

impl<S: KeyValueStore> TaskList<S> {
    pub fn load(persistence: Persistence<S>) -> Self {
        let tasks = persistence.load();
        Self {
            persistence,
            tasks,
            filter: Filter::default(),
            renderers: Vec::new(),
        }
    }

    /// Registers a renderer and immediately renders the current view to it.
    pub fn subscribe(&mut self, mut renderer: Box<dyn Renderer>) {
        renderer.render(&self.rendered_view());
        self.renderers.push(renderer);
    }

    pub fn add(&mut self, text: &str, priority: Option<Priority>) -> Option<Change> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            tracing::debug!("ignoring task with blank text");
            return None;
        }

        let task = Task::new(
            self.next_id(),
            trimmed.to_string(),
            priority.unwrap_or_default(),
            now_millis(),
        );
        Some(self.insert(task))
    }

    pub fn add_with_due(
        &mut self,
        text: &str,
        priority: Option<Priority>,
        due_date: Date,
    ) -> Result<Option<Change>, AppError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            tracing::debug!("ignoring task with blank text");
            return Ok(None);
        }

        let mut task = Task::new(
            self.next_id(),
            trimmed.to_string(),
            priority.unwrap_or_default(),
            now_millis(),
        );
        task.due_date = Some(format_due_date(due_date)?);
        Ok(Some(self.insert(task)))
    }

    fn insert(&mut self, task: Task) -> Change {
        tracing::debug!(id = %task.id, priority = %task.priority, "adding task");
        self.tasks.push(task.clone());
        let saved = self.persist();
        self.notify();
        Change { task, saved }
    }

    pub fn toggle(&mut self, id: &str) -> Option<Change> {
        let trimmed_id = id.trim();
        let now = now_millis();
        let task = self.tasks.iter_mut().find(|task| task.id == trimmed_id)?;
        task.toggle(now);
        let task = task.clone();

        tracing::debug!(id = %task.id, completed = task.completed, "toggled task");
        let saved = self.persist();
        self.notify();
        Some(Change { task, saved })
    }

    pub fn delete(&mut self, id: &str) -> Option<Change> {
        let trimmed_id = id.trim();
        let index = self.tasks.iter().position(|task| task.id == trimmed_id)?;
        let task = self.tasks.remove(index);

        tracing::debug!(id = %task.id, "deleted task");
        let saved = self.persist();
        self.notify();
        Some(Change { task, saved })
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
        self.notify();
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        let trimmed_id = id.trim();
        self.tasks.iter().find(|task| task.id == trimmed_id)
    }

    pub fn derived_view(&self) -> Vec<Task> {
        self.view_for(self.filter)
    }

    /// Tasks matching `filter`, high priority first. The sort is stable so
    /// equal priorities keep collection order.
    pub fn view_for(&self, filter: Filter) -> Vec<Task> {
        let mut view: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        view.sort_by_key(|task| task.priority.rank());
        view
    }

    pub fn remaining_count(&self) -> usize {
        self.tasks.iter().filter(|task| !task.completed).count()
    }

    pub fn summary(&self) -> Summary {
        let remaining = self.remaining_count();
        Summary {
            total: self.tasks.len(),
            completed: self.tasks.len() - remaining,
            remaining,
        }
    }

    pub fn rendered_view(&self) -> RenderedView {
        RenderedView {
            filter: self.filter,
            tasks: self.derived_view(),
            remaining: self.remaining_count(),
            show_empty_state: self.tasks.is_empty(),
        }
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn persistence_mut(&mut self) -> &mut Persistence<S> {
        &mut self.persistence
    }

    fn next_id(&self) -> String {
        let mut candidate = now_millis();
        loop {
            let id = candidate.to_string();
            if !self.tasks.iter().any(|task| task.id == id) {
                return id;
            }
            candidate += 1;
        }
    }

    fn persist(&mut self) -> bool {
        let saved = self.persistence.save(&self.tasks);
        if !saved {
            tracing::warn!("keeping unsaved changes in memory");
        }
        saved
    }

    fn notify(&mut self) {
        if self.renderers.is_empty() {
            return;
        }

        let view = self.rendered_view();
        for renderer in &mut self.renderers {
            renderer.render(&view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RenderedView, TaskList, remaining_label};
    use crate::model::{Filter, Priority, parse_due_date};
    use crate::storage::{KeyValueStore, MemoryStore, Persistence, STORAGE_KEY};
    use crate::sync::NoopSyncer;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn empty_list() -> TaskList<MemoryStore> {
        TaskList::load(Persistence::new(MemoryStore::new(), Box::new(NoopSyncer)))
    }

    fn id_of(list: &TaskList<MemoryStore>, text: &str) -> String {
        list.tasks()
            .iter()
            .find(|task| task.text == text)
            .map(|task| task.id.clone())
            .unwrap()
    }

    fn texts(tasks: &[crate::model::Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.text.as_str()).collect()
    }

    #[test]
    fn add_rejects_blank_text() {
        let mut list = empty_list();

        assert!(list.add("", None).is_none());
        assert!(list.add("   ", Some(Priority::High)).is_none());
        assert!(list.tasks().is_empty());
        assert_eq!(list.persistence().store().get(STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn add_trims_text_and_defaults_priority() {
        let mut list = empty_list();
        let change = list.add("  Water plants ", None).unwrap();

        assert!(change.saved);
        assert_eq!(change.task.text, "Water plants");
        assert_eq!(change.task.priority, Priority::Medium);
        assert!(!change.task.completed);
        assert_eq!(change.task.completed_at, None);
    }

    #[test]
    fn add_assigns_unique_ids() {
        let mut list = empty_list();
        for index in 0..20 {
            list.add(&format!("task {index}"), None);
        }

        let mut ids: Vec<&str> = list.tasks().iter().map(|task| task.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn add_with_due_records_date() {
        let mut list = empty_list();
        let due = parse_due_date("2026-11-01").unwrap();
        let change = list
            .add_with_due("Renew passport", Some(Priority::Low), due)
            .unwrap()
            .unwrap();

        assert_eq!(change.task.due_date.as_deref(), Some("2026-11-01"));
        assert!(list.add_with_due(" ", None, due).unwrap().is_none());
    }

    #[test]
    fn scenario_add_toggle_delete() {
        let mut list = empty_list();
        list.add("Buy milk", Some(Priority::High));
        list.add("Call mom", Some(Priority::Low));

        assert_eq!(texts(&list.view_for(Filter::All)), vec!["Buy milk", "Call mom"]);
        assert_eq!(list.remaining_count(), 2);

        let milk = id_of(&list, "Buy milk");
        let change = list.toggle(&milk).unwrap();
        assert!(change.task.completed_at.is_some());
        assert_eq!(list.remaining_count(), 1);
        assert_eq!(texts(&list.view_for(Filter::Completed)), vec!["Buy milk"]);

        let mom = id_of(&list, "Call mom");
        list.delete(&mom).unwrap();
        assert_eq!(list.tasks().len(), 1);
        assert!(list.view_for(Filter::Pending).is_empty());
    }

    #[test]
    fn toggle_twice_restores_task() {
        let mut list = empty_list();
        let original = list.add("Stretch", None).unwrap().task;

        list.toggle(&original.id).unwrap();
        assert!(list.get(&original.id).unwrap().completed);
        let restored = list.toggle(&original.id).unwrap().task;

        assert_eq!(restored, original);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut list = empty_list();
        list.add("Keep me", None);

        assert!(list.toggle("missing").is_none());
        assert!(list.delete("missing").is_none());
        assert_eq!(list.tasks().len(), 1);
        assert_eq!(list.remaining_count(), 1);
    }

    #[test]
    fn derived_view_sorts_stably_by_priority() {
        let mut list = empty_list();
        list.add("low one", Some(Priority::Low));
        list.add("medium one", None);
        list.add("high one", Some(Priority::High));
        list.add("low two", Some(Priority::Low));
        list.add("high two", Some(Priority::High));

        assert_eq!(
            texts(&list.derived_view()),
            vec!["high one", "high two", "medium one", "low one", "low two"]
        );
    }

    #[test]
    fn filters_partition_collection() {
        let mut list = empty_list();
        list.add("a", Some(Priority::Low));
        list.add("b", Some(Priority::High));
        list.add("c", None);
        let b = id_of(&list, "b");
        list.toggle(&b);

        let pending = list.view_for(Filter::Pending);
        let completed = list.view_for(Filter::Completed);
        assert!(pending.iter().all(|task| !task.completed));
        assert!(completed.iter().all(|task| task.completed));
        assert_eq!(pending.len() + completed.len(), list.tasks().len());
        assert_eq!(texts(&pending), vec!["c", "a"]);
    }

    #[test]
    fn remaining_count_ignores_active_filter() {
        let mut list = empty_list();
        list.add("a", None);
        list.add("b", None);
        let a = id_of(&list, "a");
        list.toggle(&a);

        for filter in [Filter::All, Filter::Pending, Filter::Completed] {
            list.set_filter(filter);
            assert_eq!(list.remaining_count(), 1);
        }

        let summary = list.summary();
        assert_eq!((summary.total, summary.completed, summary.remaining), (2, 1, 1));
    }

    #[test]
    fn set_filter_does_not_touch_tasks() {
        let mut list = empty_list();
        list.add("a", None);
        let before = list.tasks().to_vec();

        list.set_filter(Filter::Completed);

        assert_eq!(list.filter(), Filter::Completed);
        assert_eq!(list.tasks(), before.as_slice());
        assert!(list.derived_view().is_empty());
    }

    #[test]
    fn mutations_persist_full_collection() {
        let mut list = empty_list();
        list.add("a", Some(Priority::High));
        list.add("b", None);
        let a = id_of(&list, "a");
        list.toggle(&a);

        let reloaded = list.persistence().load();
        assert_eq!(reloaded, list.tasks());
    }

    #[test]
    fn save_failure_keeps_memory_state() {
        let mut list = TaskList::load(Persistence::new(
            MemoryStore::with_quota(16),
            Box::new(NoopSyncer),
        ));

        let change = list.add("a task long enough to overflow", None).unwrap();

        assert!(!change.saved);
        assert_eq!(list.tasks().len(), 1);
        assert!(list.persistence().load().is_empty());
    }

    #[test]
    fn load_restores_previous_session() {
        let store = MemoryStore::new().with_entry(
            STORAGE_KEY,
            r#"[{"id": "1", "text": "legacy", "completed": true}]"#,
        );
        let list = TaskList::load(Persistence::new(store, Box::new(NoopSyncer)));

        let task = &list.tasks()[0];
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.completed_at.is_some());
        assert_eq!(list.remaining_count(), 0);
    }

    #[test]
    fn renderers_receive_view_on_every_change() {
        let views: Rc<RefCell<Vec<RenderedView>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = views.clone();
        let mut list = empty_list();
        list.subscribe(Box::new(move |view: &RenderedView| {
            sink.borrow_mut().push(view.clone())
        }));

        list.add("a", None);
        let a = id_of(&list, "a");
        list.toggle(&a);
        list.set_filter(Filter::Pending);
        list.add("", None);
        list.delete(&a);

        let views = views.borrow();
        assert_eq!(views.len(), 5);
        assert!(views[0].show_empty_state);
        assert_eq!(views[1].remaining, 1);
        assert_eq!(views[2].remaining, 0);
        assert_eq!(views[3].filter, Filter::Pending);
        assert!(views[3].tasks.is_empty());
        assert!(views[4].show_empty_state);
    }

    #[test]
    fn remaining_label_pluralizes() {
        assert_eq!(remaining_label(0), "0 tasks remaining");
        assert_eq!(remaining_label(1), "1 task remaining");
        assert_eq!(remaining_label(3), "3 tasks remaining");
    }
}
