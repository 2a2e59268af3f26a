use crate::error::AppError;
use crate::model::{Priority, Task, now_millis};
use crate::storage::kv_store::KeyValueStore;
use crate::sync::Syncer;
use serde::{Deserialize, Deserializer};

pub const STORAGE_KEY: &str = "antigravity_tasks";

/// Ids were written as strings by later versions and as bare numbers by
/// some earlier ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredId {
    Text(String),
    Number(i64),
}

/// Persisted record as found in the store. Every field added after the
/// first version is optional here and backfilled in `into_task`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    id: StoredId,
    text: String,
    #[serde(default)]
    completed: bool,
    #[serde(default, deserialize_with = "lenient_priority")]
    priority: Option<Priority>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    completed_at: Option<i64>,
    #[serde(default)]
    due_date: Option<String>,
}

/// Unrecognized priorities read as absent and get the default on backfill.
fn lenient_priority<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Priority>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|name| name.parse().ok()))
}

impl StoredTask {
    fn into_task(self, now: i64) -> (Task, bool) {
        let mut backfilled = self.priority.is_none() || self.created_at.is_none();
        let completed_at = match (self.completed, self.completed_at) {
            (true, Some(at)) => Some(at),
            (true, None) => {
                backfilled = true;
                Some(now)
            }
            (false, Some(_)) => {
                backfilled = true;
                None
            }
            (false, None) => None,
        };

        let id = match self.id {
            StoredId::Text(id) => id,
            StoredId::Number(id) => id.to_string(),
        };

        let task = Task {
            id,
            text: self.text,
            completed: self.completed,
            priority: self.priority.unwrap_or_default(),
            created_at: self.created_at.unwrap_or(now),
            completed_at,
            due_date: self.due_date,
        };
        (task, backfilled)
    }
}

/// Load/save facade over a key-value store. Never fails outward: reads
/// degrade to an empty collection, writes report a boolean.
pub struct Persistence<S> {
    store: S,
    key: String,
    syncer: Box<dyn Syncer>,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(store: S, syncer: Box<dyn Syncer>) -> Self {
        Self {
            store,
            key: STORAGE_KEY.to_string(),
            syncer,
        }
    }

    pub fn with_key<K: Into<String>>(mut self, key: K) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn load(&self) -> Vec<Task> {
        tracing::debug!(key = %self.key, "loading tasks");
        match self.try_load() {
            Ok(tasks) => {
                tracing::debug!(count = tasks.len(), "loaded tasks");
                tasks
            }
            Err(err) => {
                tracing::error!(key = %self.key, error = %err, "failed to load tasks");
                Vec::new()
            }
        }
    }

    pub fn try_load(&self) -> Result<Vec<Task>, AppError> {
        let content = match self.store.get(&self.key)? {
            Some(content) => content,
            None => return Ok(Vec::new()),
        };

        decode_tasks(&content, now_millis())
    }

    pub fn save(&mut self, tasks: &[Task]) -> bool {
        tracing::debug!(key = %self.key, count = tasks.len(), "saving tasks");
        match self.try_save(tasks) {
            Ok(()) => {
                self.sync(tasks);
                true
            }
            Err(err) => {
                tracing::error!(key = %self.key, error = %err, "failed to save tasks");
                false
            }
        }
    }

    fn try_save(&mut self, tasks: &[Task]) -> Result<(), AppError> {
        let content =
            serde_json::to_string(tasks).map_err(|err| AppError::invalid_data(err.to_string()))?;
        self.store.set(&self.key, &content)
    }

    pub fn sync(&self, tasks: &[Task]) {
        self.syncer.sync(tasks);
    }

    /// Installs a new syncer and hands back the previous one.
    pub fn replace_syncer(&mut self, syncer: Box<dyn Syncer>) -> Box<dyn Syncer> {
        std::mem::replace(&mut self.syncer, syncer)
    }
}

pub(crate) fn decode_tasks(content: &str, now: i64) -> Result<Vec<Task>, AppError> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    let mut backfilled = 0usize;
    let mut tasks = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let stored: StoredTask = match serde_json::from_value(record) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping unreadable task record");
                continue;
            }
        };

        let (task, changed) = stored.into_task(now);
        if changed {
            backfilled += 1;
        }
        tasks.push(task);
    }

    if backfilled > 0 {
        tracing::info!(backfilled, "backfilled fields on legacy task records");
    }

    Ok(tasks)
}
