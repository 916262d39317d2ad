//! Flat-file entity store.
//!
//! Every record type lives in its own directory below the data root, one
//! pretty-printed JSON file per record. Reads treat a missing file and a
//! malformed file the same way: the record is absent. Owner queries go
//! through a per-process secondary index that is built from one directory
//! scan and then kept current on every save and delete.

use crate::schema;
use crate::tables::{
    Application, Chat, Message, Notification, Session, SystemState, Todo, User,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record id: {0:?}")]
    InvalidId(String),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("background write failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A record type that is persisted as one JSON file per instance.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Directory below the data root.
    const DIR: &'static str;

    /// Pattern matched by `list_all`.
    const GLOB: &'static str = "*.json";

    /// File name of this record without the `.json` extension.
    fn file_stem(&self) -> String;

    /// Filters files when several record types share one directory.
    fn accepts_stem(_stem: &str) -> bool {
        true
    }

    /// Secondary index keys, e.g. `assignee:user_42`.
    fn index_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Stems become file names, so anything that could escape the directory
/// or hide as a temp file is rejected.
pub fn is_safe_stem(stem: &str) -> bool {
    !stem.is_empty() && !stem.starts_with('.') && sanitize_filename::is_sanitized(stem)
}

#[derive(Default, Debug)]
struct SecondaryIndex {
    by_key: HashMap<String, BTreeSet<String>>,
    by_stem: HashMap<String, Vec<String>>,
}

impl SecondaryIndex {
    fn insert(&mut self, stem: String, keys: Vec<String>) {
        self.remove(&stem);
        for key in &keys {
            self.by_key
                .entry(key.clone())
                .or_default()
                .insert(stem.clone());
        }
        self.by_stem.insert(stem, keys);
    }

    fn remove(&mut self, stem: &str) {
        if let Some(keys) = self.by_stem.remove(stem) {
            for key in keys {
                if let Some(stems) = self.by_key.get_mut(&key) {
                    stems.remove(stem);
                    if stems.is_empty() {
                        self.by_key.remove(&key);
                    }
                }
            }
        }
    }

    fn stems(&self, key: &str) -> Vec<String> {
        self.by_key
            .get(key)
            .map(|stems| stems.iter().cloned().collect())
            .unwrap_or_default()
    }
}

struct StoreInner {
    dir: PathBuf,
    index: RwLock<Option<SecondaryIndex>>,
}

pub struct JsonStore<T> {
    inner: Arc<StoreInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

async fn write_atomically(path: PathBuf, bytes: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|err| err.error)?;
        Ok(())
    })
    .await?
}

async fn read_json<V: DeserializeOwned>(path: &Path) -> Result<Option<V>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring malformed record");
            Ok(None)
        }
    }
}

impl<T: Entity> JsonStore<T> {
    pub async fn open(root: &Path) -> Result<Self, StoreError> {
        let dir = root.join(T::DIR);
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                dir,
                index: RwLock::new(None),
            }),
            _marker: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn path_for(&self, stem: &str) -> Option<PathBuf> {
        is_safe_stem(stem).then(|| self.inner.dir.join(format!("{stem}.json")))
    }

    pub async fn save(&self, entity: &T) -> Result<(), StoreError> {
        let stem = entity.file_stem();
        let path = self
            .path_for(&stem)
            .ok_or_else(|| StoreError::InvalidId(stem.clone()))?;
        let bytes = serde_json::to_vec_pretty(entity)?;
        write_atomically(path, bytes).await?;

        if let Some(index) = self.inner.index.write().await.as_mut() {
            index.insert(stem.clone(), entity.index_keys());
        }
        debug!(dir = T::DIR, stem = %stem, "saved record");
        Ok(())
    }

    pub async fn load(&self, stem: &str) -> Result<Option<T>, StoreError> {
        match self.path_for(stem) {
            Some(path) => read_json(&path).await,
            None => {
                warn!(dir = T::DIR, stem = %stem, "refusing to load unsafe record id");
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, stem: &str) -> Result<bool, StoreError> {
        let Some(path) = self.path_for(stem) else {
            return Ok(false);
        };
        let removed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };
        if let Some(index) = self.inner.index.write().await.as_mut() {
            index.remove(stem);
        }
        debug!(dir = T::DIR, stem = %stem, removed, "deleted record");
        Ok(removed)
    }

    pub async fn list_all(&self) -> Result<Vec<T>, StoreError> {
        self.list_matching(T::GLOB).await
    }

    /// Loads every record whose file name matches `pattern` (relative to the
    /// store directory). Malformed files are skipped.
    pub async fn list_matching(&self, pattern: &str) -> Result<Vec<T>, StoreError> {
        let dir = glob::Pattern::escape(&self.inner.dir.to_string_lossy());
        let full_pattern = format!("{dir}/{pattern}");

        let paths: Vec<PathBuf> = glob::glob(&full_pattern)?
            .filter_map(Result::ok)
            .filter(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(T::accepts_stem)
                    .unwrap_or(false)
            })
            .collect();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = read_json(&path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Records carrying the given index key.
    pub async fn find_by_key(&self, key: &str) -> Result<Vec<T>, StoreError> {
        self.ensure_index().await?;
        let stems = match self.inner.index.read().await.as_ref() {
            Some(index) => index.stems(key),
            None => Vec::new(),
        };

        let mut records = Vec::with_capacity(stems.len());
        for stem in stems {
            // The file may have been rewritten by another process since.
            if let Some(record) = self.load(&stem).await? {
                if record.index_keys().iter().any(|k| k == key) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    pub async fn find_one_by_key(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self.find_by_key(key).await?.into_iter().next())
    }

    /// Drops the secondary index so the next query rebuilds it from disk.
    pub async fn invalidate_index(&self) {
        *self.inner.index.write().await = None;
    }

    async fn ensure_index(&self) -> Result<(), StoreError> {
        if self.inner.index.read().await.is_some() {
            return Ok(());
        }
        let records = self.list_all().await?;
        let mut guard = self.inner.index.write().await;
        if guard.is_none() {
            let mut index = SecondaryIndex::default();
            for record in &records {
                index.insert(record.file_stem(), record.index_keys());
            }
            debug!(dir = T::DIR, records = records.len(), "built secondary index");
            *guard = Some(index);
        }
        Ok(())
    }
}

/// The single `system.json` file recording one-time initialization.
#[derive(Clone, Debug)]
pub struct SystemFile {
    path: PathBuf,
}

impl SystemFile {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(schema::SYSTEM_FILE),
        }
    }

    pub async fn load(&self) -> Result<SystemState, StoreError> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    pub async fn save(&self, state: &SystemState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomically(self.path.clone(), bytes).await
    }
}

/// All entity stores below one data root.
#[derive(Clone)]
pub struct DataStore {
    root: PathBuf,
    pub users: JsonStore<User>,
    pub todos: JsonStore<Todo>,
    pub chats: JsonStore<Chat>,
    pub messages: JsonStore<Message>,
    pub notifications: JsonStore<Notification>,
    pub applications: JsonStore<Application>,
    pub sessions: JsonStore<Session>,
    pub system: SystemFile,
}

impl DataStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        Ok(Self {
            users: JsonStore::open(&root).await?,
            todos: JsonStore::open(&root).await?,
            chats: JsonStore::open(&root).await?,
            messages: JsonStore::open(&root).await?,
            notifications: JsonStore::open(&root).await?,
            applications: JsonStore::open(&root).await?,
            sessions: JsonStore::open(&root).await?,
            system: SystemFile::new(&root),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{ChatKind, TodoPriority};
    use tempfile::TempDir;

    fn todo(assignee: &str) -> Todo {
        Todo::new(
            "Write report".to_string(),
            "Quarterly numbers".to_string(),
            "user_creator".to_string(),
            assignee.to_string(),
            TodoPriority::High,
            None,
        )
    }

    #[tokio::test]
    async fn test_save_then_load_returns_equal_record() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Todo> = JsonStore::open(dir.path()).await.unwrap();

        let original = todo("user_a");
        store.save(&original).await.unwrap();

        let loaded = store.load(&original.id).await.unwrap();
        assert_eq!(loaded, Some(original.clone()));

        let on_disk = std::fs::read_to_string(store.dir().join(format!("{}.json", original.id)))
            .unwrap();
        assert!(on_disk.contains("\n  \"title\""), "expected pretty-printed JSON");
    }

    #[tokio::test]
    async fn test_missing_and_malformed_records_are_absent() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Todo> = JsonStore::open(dir.path()).await.unwrap();

        assert_eq!(store.load("todo_missing").await.unwrap(), None);

        std::fs::write(store.dir().join("todo_broken.json"), "{ not json").unwrap();
        assert_eq!(store.load("todo_broken").await.unwrap(), None);

        let good = todo("user_a");
        store.save(&good).await.unwrap();
        let all = store.list_all().await.unwrap();
        assert_eq!(all, vec![good]);
    }

    #[tokio::test]
    async fn test_unsafe_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Todo> = JsonStore::open(dir.path()).await.unwrap();

        assert_eq!(store.load("../system").await.unwrap(), None);
        assert_eq!(store.load(".hidden").await.unwrap(), None);

        let mut evil = todo("user_a");
        evil.id = "../escape".to_string();
        assert!(matches!(
            store.save(&evil).await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_reports_whether_file_existed() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Todo> = JsonStore::open(dir.path()).await.unwrap();

        let record = todo("user_a");
        store.save(&record).await.unwrap();
        assert!(store.delete(&record.id).await.unwrap());
        assert!(!store.delete(&record.id).await.unwrap());
        assert_eq!(store.load(&record.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_index_follows_saves_and_deletes() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Todo> = JsonStore::open(dir.path()).await.unwrap();

        let mut first = todo("user_a");
        let second = todo("user_b");
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let for_a = store.find_by_key("assignee:user_a").await.unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].id, first.id);

        first.assignee_id = "user_b".to_string();
        store.save(&first).await.unwrap();
        assert!(store.find_by_key("assignee:user_a").await.unwrap().is_empty());
        assert_eq!(store.find_by_key("assignee:user_b").await.unwrap().len(), 2);

        store.delete(&second.id).await.unwrap();
        let for_b = store.find_by_key("assignee:user_b").await.unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].id, first.id);
    }

    #[tokio::test]
    async fn test_index_sees_records_written_before_it_was_built() {
        let dir = TempDir::new().unwrap();
        let writer: JsonStore<Todo> = JsonStore::open(dir.path()).await.unwrap();
        let record = todo("user_a");
        writer.save(&record).await.unwrap();

        let reader: JsonStore<Todo> = JsonStore::open(dir.path()).await.unwrap();
        let found = reader.find_by_key("creator:user_creator").await.unwrap();
        assert_eq!(found, vec![record]);
    }

    #[tokio::test]
    async fn test_chats_and_messages_share_a_directory() {
        let dir = TempDir::new().unwrap();
        let data = DataStore::open(dir.path()).await.unwrap();

        let chat = Chat::new(ChatKind::Group, vec!["user_a".into()], Some("ops".into()));
        data.chats.save(&chat).await.unwrap();
        let message = Message::new(chat.id.clone(), "user_a".into(), "hi".into(), vec![]);
        data.messages.save(&message).await.unwrap();

        assert_eq!(data.chats.list_all().await.unwrap(), vec![chat.clone()]);
        assert_eq!(data.messages.list_all().await.unwrap(), vec![message.clone()]);
        assert_eq!(
            data.messages
                .find_by_key(&format!("chat:{}", chat.id))
                .await
                .unwrap(),
            vec![message]
        );
    }

    #[tokio::test]
    async fn test_system_file_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let data = DataStore::open(dir.path()).await.unwrap();

        let state = data.system.load().await.unwrap();
        assert!(!state.initialized);

        let updated = SystemState {
            initialized: true,
            admin_created: true,
            init_time: Some(crate::tables::now()),
        };
        data.system.save(&updated).await.unwrap();
        assert_eq!(data.system.load().await.unwrap(), updated);
    }
}
