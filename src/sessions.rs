use crate::core::error::AssistantError;
use crate::types::ChatMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One saved conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub archived: bool,
}

impl ChatSession {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            starred: false,
            archived: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub sessions: usize,
    pub messages: usize,
    pub attachments: usize,
    pub total_bytes: u64,
}

/// Persistence seam for chat history. The file-backed implementation below
/// is the default; tests swap in whatever they need.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &ChatSession) -> Result<(), AssistantError>;
    async fn get(&self, id: &str) -> Result<Option<ChatSession>, AssistantError>;
    async fn delete(&self, id: &str) -> Result<(), AssistantError>;
    /// Non-archived sessions, most recently updated first.
    async fn recent(&self, limit: usize) -> Result<Vec<ChatSession>, AssistantError>;
    async fn all(&self) -> Result<Vec<ChatSession>, AssistantError>;
    async fn starred(&self) -> Result<Vec<ChatSession>, AssistantError>;
    async fn archived(&self) -> Result<Vec<ChatSession>, AssistantError>;
    /// Case-insensitive match against titles and message bodies.
    async fn search(&self, query: &str) -> Result<Vec<ChatSession>, AssistantError>;
    async fn set_starred(&self, id: &str, starred: bool) -> Result<(), AssistantError>;
    async fn set_archived(&self, id: &str, archived: bool) -> Result<(), AssistantError>;
    /// Appends a message and bumps the session's `updated_at`.
    async fn add_message(&self, id: &str, message: ChatMessage) -> Result<(), AssistantError>;
    async fn stats(&self) -> Result<StorageStats, AssistantError>;
    async fn clear_all(&self) -> Result<(), AssistantError>;
}

/// Stores each session as `<id>.json` under one directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AssistantError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "session store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn read_session(&self, path: &Path) -> Option<ChatSession> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "skipping unreadable session");
                None
            }
        }
    }

    fn load_all(&self) -> Result<Vec<ChatSession>, AssistantError> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(session) = self.read_session(&path) {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn update_session<F>(&self, id: &str, apply: F) -> Result<(), AssistantError>
    where
        F: FnOnce(&mut ChatSession),
    {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(AssistantError::Input(format!("Session not found: {}", id)));
        }
        let contents = fs::read_to_string(&path)?;
        let mut session: ChatSession = serde_json::from_str(&contents)?;
        apply(&mut session);
        fs::write(&path, serde_json::to_string_pretty(&session)?)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &ChatSession) -> Result<(), AssistantError> {
        let path = self.session_path(&session.id);
        fs::write(&path, serde_json::to_string_pretty(session)?)?;
        tracing::debug!(id = %session.id, "session saved");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>, AssistantError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn delete(&self, id: &str) -> Result<(), AssistantError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(AssistantError::Input(format!("Session not found: {}", id)));
        }
        fs::remove_file(&path)?;
        tracing::debug!(id = %id, "session deleted");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChatSession>, AssistantError> {
        let mut sessions: Vec<_> = self
            .load_all()?
            .into_iter()
            .filter(|s| !s.archived)
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn all(&self) -> Result<Vec<ChatSession>, AssistantError> {
        let mut sessions = self.load_all()?;
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn starred(&self) -> Result<Vec<ChatSession>, AssistantError> {
        Ok(self.all().await?.into_iter().filter(|s| s.starred).collect())
    }

    async fn archived(&self) -> Result<Vec<ChatSession>, AssistantError> {
        Ok(self.all().await?.into_iter().filter(|s| s.archived).collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<ChatSession>, AssistantError> {
        let needle = query.to_lowercase();
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|s| {
                s.title.to_lowercase().contains(&needle)
                    || s.messages
                        .iter()
                        .any(|m| m.content.to_lowercase().contains(&needle))
            })
            .collect())
    }

    async fn set_starred(&self, id: &str, starred: bool) -> Result<(), AssistantError> {
        self.update_session(id, |s| s.starred = starred)
    }

    async fn set_archived(&self, id: &str, archived: bool) -> Result<(), AssistantError> {
        self.update_session(id, |s| s.archived = archived)
    }

    async fn add_message(&self, id: &str, message: ChatMessage) -> Result<(), AssistantError> {
        self.update_session(id, |s| {
            s.messages.push(message);
            s.updated_at = Utc::now();
        })
    }

    async fn stats(&self) -> Result<StorageStats, AssistantError> {
        let mut stats = StorageStats::default();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Ok(meta) = path.metadata() {
                stats.total_bytes += meta.len();
            }
            if let Some(session) = self.read_session(&path) {
                stats.sessions += 1;
                stats.messages += session.messages.len();
                stats.attachments += session
                    .messages
                    .iter()
                    .map(|m| m.attachments.len())
                    .sum::<usize>();
            }
        }
        Ok(stats)
    }

    async fn clear_all(&self) -> Result<(), AssistantError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                fs::remove_file(&path)?;
            }
        }
        tracing::info!(dir = %self.dir.display(), "all sessions cleared");
        Ok(())
    }
}

/// Wipes all saved chats and the line-editor history file, returning the
/// stats for what was there before the wipe.
pub async fn clear_all_data(
    store: &dyn SessionStore,
    history_path: Option<&Path>,
) -> Result<StorageStats, AssistantError> {
    let stats = store.stats().await?;
    tracing::info!(
        sessions = stats.sessions,
        messages = stats.messages,
        attachments = stats.attachments,
        bytes = stats.total_bytes,
        "clearing all stored data"
    );
    store.clear_all().await?;
    if let Some(path) = history_path {
        if path.exists() {
            fs::remove_file(path)?;
            tracing::debug!(path = %path.display(), "input history removed");
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileAttachment;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, FileSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let (_dir, store) = store();
        let mut session = ChatSession::new("rust questions");
        session.messages.push(ChatMessage::user("what is a lifetime?"));
        store.save(&session).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_orders_by_update_time_and_skips_archived() {
        let (_dir, store) = store();
        let now = Utc::now();

        let mut old = ChatSession::new("old");
        old.updated_at = now - Duration::hours(2);
        let mut fresh = ChatSession::new("fresh");
        fresh.updated_at = now;
        let mut buried = ChatSession::new("buried");
        buried.updated_at = now - Duration::hours(1);
        buried.archived = true;

        for s in [&old, &fresh, &buried] {
            store.save(s).await.unwrap();
        }

        let recent = store.recent(10).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["fresh", "old"]);

        assert_eq!(store.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_message_bumps_updated_at() {
        let (_dir, store) = store();
        let mut session = ChatSession::new("chat");
        session.updated_at = Utc::now() - Duration::hours(1);
        store.save(&session).await.unwrap();

        store
            .add_message(&session.id, ChatMessage::user("hello"))
            .await
            .unwrap();

        let loaded = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert!(loaded.updated_at > session.updated_at);
    }

    #[tokio::test]
    async fn search_matches_titles_and_bodies_case_insensitively() {
        let (_dir, store) = store();
        let mut a = ChatSession::new("Borrow checker");
        a.messages.push(ChatMessage::user("tell me about lifetimes"));
        let b = ChatSession::new("unrelated");
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        assert_eq!(store.search("BORROW").await.unwrap().len(), 1);
        assert_eq!(store.search("LIFETIMES").await.unwrap().len(), 1);
        assert!(store.search("python").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn star_and_archive_flags_drive_the_filters() {
        let (_dir, store) = store();
        let a = ChatSession::new("a");
        let b = ChatSession::new("b");
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        store.set_starred(&a.id, true).await.unwrap();
        store.set_archived(&b.id, true).await.unwrap();

        let starred = store.starred().await.unwrap();
        assert_eq!(starred.len(), 1);
        assert_eq!(starred[0].id, a.id);

        let archived = store.archived().await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, b.id);

        let err = store.set_starred("missing", true).await.unwrap_err();
        assert!(matches!(err, AssistantError::Input(_)));
    }

    #[tokio::test]
    async fn stats_count_sessions_messages_and_attachments() {
        let (_dir, store) = store();
        let mut session = ChatSession::new("with files");
        session.messages.push(
            ChatMessage::user("see attached").with_attachments(vec![FileAttachment::new(
                "notes.txt",
                Some("text/plain".into()),
                b"hi".to_vec(),
            )]),
        );
        session.messages.push(ChatMessage::user("and this"));
        store.save(&session).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.attachments, 1);
        assert!(stats.total_bytes > 0);
    }

    #[tokio::test]
    async fn clear_all_data_reports_pre_clear_stats_and_removes_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("sessions")).unwrap();
        let mut session = ChatSession::new("doomed");
        session.messages.push(ChatMessage::user("gone soon"));
        store.save(&session).await.unwrap();

        let history = dir.path().join("history");
        fs::write(&history, "old input\n").unwrap();

        let stats = clear_all_data(&store, Some(&history)).await.unwrap();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.messages, 1);
        assert!(store.all().await.unwrap().is_empty());
        assert!(!history.exists());
    }

    #[tokio::test]
    async fn corrupt_session_files_are_skipped_not_fatal() {
        let (_dir, store) = store();
        let good = ChatSession::new("good");
        store.save(&good).await.unwrap();
        fs::write(store.dir().join("junk.json"), "{ not json").unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, good.id);
    }
}
