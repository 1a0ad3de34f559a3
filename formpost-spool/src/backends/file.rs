use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use formpost_common::internal;
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, error, warn};

use crate::{
    SpoolError, ValidationError,
    message::{Message, SpooledMessage},
    r#trait::BackingStore,
    types::MessageId,
};

const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";

const fn default_stale_claim_secs() -> u64 {
    600
}

/// File-based backing store implementation
///
/// Each message is a single bincode file named after its ULID:
/// - `{id}.msg` - pending, visible to `list_pending`
/// - `{id}.claimed` - owned by a flush that is attempting delivery
///
/// # Atomicity
/// Every state change is a `rename`, which is atomic on POSIX filesystems:
/// - append writes `.tmp_{id}.msg` and renames it into place
/// - claim renames `{id}.msg` to `{id}.claimed`; when two flushes race (in
///   this process or another one sharing the directory) exactly one rename
///   succeeds and the loser sees `NotFound`
/// - `mark_failed` writes the updated message over the claim file, then
///   renames it back to `{id}.msg`
/// - remove renames to `.deleted` before unlinking
///
/// A crash mid-delivery leaves a `.claimed` file behind. [`init`](Self::init)
/// returns claims older than `stale_claim_secs` to pending.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
    stale_claim_secs: u64,
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/formpost"),
            stale_claim_secs: default_stale_claim_secs(),
        }
    }
}

// Custom Deserialize implementation with path validation
impl<'de> Deserialize<'de> for FileBackingStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileBackingStoreHelper {
            path: PathBuf,
            #[serde(default = "default_stale_claim_secs")]
            stale_claim_secs: u64,
        }

        let helper = FileBackingStoreHelper::deserialize(deserializer)?;
        Self::validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self {
            path: helper.path,
            stale_claim_secs: helper.stale_claim_secs,
        })
    }
}

impl FileBackingStore {
    /// Validate a spool path for security
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Ensures the path is absolute
    /// - Rejects paths to sensitive system directories
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(ValidationError::ParentComponent(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(ValidationError::SystemDirectory {
                prefix: (*prefix).to_string(),
                path: path.display().to_string(),
            });
        }

        Ok(())
    }

    /// Create a new `FileBackingStore` builder
    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    /// The spool directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initialize the file-backed spool
    ///
    /// Creates the spool directory if it doesn't exist, removes stale
    /// leftovers of interrupted writes and deletes, and returns stale claims
    /// to pending.
    ///
    /// # Errors
    /// - If the spool path cannot be created
    /// - If the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising Spool at {}", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        self.recover()
    }

    /// Tidy up after processes that died mid-operation
    ///
    /// Another process may share the directory and be mid-write right now,
    /// so only leftovers older than `stale_claim_secs` are touched.
    fn recover(&self) -> crate::Result<()> {
        let stale_after = Duration::from_secs(self.stale_claim_secs);
        let now = SystemTime::now();
        let (mut cleaned, mut restored) = (0, 0);

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            let orphan = filename.starts_with(TEMP_PREFIX) || filename.ends_with(DELETED_SUFFIX);
            let claim = MessageId::from_filename(&filename)
                .filter(|id| entry.path() == self.claimed_path(id));

            if !orphan && claim.is_none() {
                continue;
            }

            let age = match entry.metadata() {
                Ok(metadata) => metadata
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default(),
                // Finished by its owner since the directory scan
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            if age < stale_after {
                continue;
            }

            let result = match &claim {
                Some(id) => std::fs::rename(entry.path(), self.pending_path(id)),
                None => std::fs::remove_file(entry.path()),
            };

            match result {
                Ok(()) if claim.is_some() => restored += 1,
                Ok(()) => cleaned += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if cleaned > 0 {
            internal!(level = INFO, "Cleaned up {cleaned} orphaned files from spool");
        }

        if restored > 0 {
            internal!(
                level = WARN,
                "Returned {restored} stale claims to pending; these messages may be delivered twice"
            );
        }

        Ok(())
    }

    fn pending_path(&self, id: &MessageId) -> PathBuf {
        self.path.join(id.pending_filename())
    }

    fn claimed_path(&self, id: &MessageId) -> PathBuf {
        self.path.join(id.claimed_filename())
    }

    fn temp_path(&self, filename: &str) -> PathBuf {
        self.path.join(format!("{TEMP_PREFIX}{filename}"))
    }

    async fn read_message(path: &Path) -> crate::Result<SpooledMessage> {
        let bytes = fs::read(path).await?;
        let (message, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        Ok(message)
    }

    /// Write `message` to a temporary file and rename it over `target`
    async fn write_atomic(
        &self,
        message: &SpooledMessage,
        target: &Path,
        temp_name: &str,
    ) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(message, bincode::config::standard())?;
        let temp_path = self.temp_path(temp_name);

        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, target).await?;

        Ok(())
    }

    /// Stamp the claim time so `init` can tell a live claim from a stale one
    async fn touch(path: &Path) -> io::Result<()> {
        let file = fs::OpenOptions::new().write(true).open(path).await?;
        file.into_std().await.set_modified(SystemTime::now())
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn append(&self, message: Message) -> crate::Result<MessageId> {
        let id = MessageId::generate();
        let spooled = SpooledMessage::new(id.clone(), message);
        let target = self.pending_path(&id);

        match self
            .write_atomic(&spooled, &target, &id.pending_filename())
            .await
        {
            Ok(()) => {
                debug!(message_id = %id, "Spooled message to {}", target.display());
                Ok(id)
            }
            Err(SpoolError::Io(e)) => Err(SpoolError::Write(e)),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn list_pending(&self) -> crate::Result<Vec<SpooledMessage>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if let Some(id) = MessageId::from_filename(&filename)
                && filename == id.pending_filename()
            {
                ids.push(id);
            }
        }

        // Monotonic ULIDs sort in enqueue order
        ids.sort();

        let mut pending = Vec::with_capacity(ids.len());
        for id in ids {
            match Self::read_message(&self.pending_path(&id)).await {
                Ok(message) => pending.push(message),
                // Claimed or removed by someone else since the directory scan
                Err(e) if e.is_not_found() => {}
                Err(e) => error!(message_id = %id, error = %e, "Skipping unreadable spool entry"),
            }
        }

        debug!("Found {} pending messages in spool", pending.len());

        Ok(pending)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn claim(&self, id: &MessageId) -> crate::Result<Option<SpooledMessage>> {
        let claimed = self.claimed_path(id);

        match fs::rename(self.pending_path(id), &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = Self::touch(&claimed).await {
            warn!(message_id = %id, error = %e, "Unable to stamp claim time");
        }

        match Self::read_message(&claimed).await {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                fs::rename(&claimed, self.pending_path(id)).await?;
                Err(e)
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn release(&self, id: &MessageId) -> crate::Result<()> {
        match fs::rename(self.claimed_path(id), self.pending_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(message_id = %id, "Release of a message that is not claimed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, error), fields(id = %id))]
    async fn mark_failed(&self, id: &MessageId, error: &str) -> crate::Result<()> {
        let claimed = self.claimed_path(id);

        let mut message = match Self::read_message(&claimed).await {
            Ok(message) => message,
            // Not claimed: take the claim first so nobody else is mid-delivery
            Err(e) if e.is_not_found() => self
                .claim(id)
                .await?
                .ok_or_else(|| SpoolError::NotFound(id.clone()))?,
            Err(e) => return Err(e),
        };

        message.record_failure(error);
        self.write_atomic(&message, &claimed, &id.claimed_filename())
            .await?;
        fs::rename(&claimed, self.pending_path(id)).await?;

        debug!(
            message_id = %id,
            attempts = message.attempts,
            "Recorded failed delivery attempt"
        );

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn remove(&self, id: &MessageId) -> crate::Result<()> {
        let deleted = self
            .path
            .join(format!("{}{DELETED_SUFFIX}", id.claimed_filename()));

        // Phase 1: rename out of the visible namespace; a delivered message is
        // normally claimed, but an unclaimed one may be removed too
        let mut renamed = false;
        for source in [self.claimed_path(id), self.pending_path(id)] {
            match fs::rename(&source, &deleted).await {
                Ok(()) => {
                    renamed = true;
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if !renamed {
            warn!(message_id = %id, "Message already removed from spool");
            return Ok(());
        }

        // Phase 2: if this fails, init() cleans the .deleted file up later
        fs::remove_file(&deleted).await?;

        debug!(message_id = %id, "Removed message from spool");

        Ok(())
    }
}

/// Builder for `FileBackingStore`
#[derive(Debug)]
pub struct FileBackingStoreBuilder {
    path: PathBuf,
    stale_claim_secs: u64,
}

impl Default for FileBackingStoreBuilder {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            stale_claim_secs: default_stale_claim_secs(),
        }
    }
}

impl FileBackingStoreBuilder {
    /// Set the spool directory path
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// How old a claim must be before `init` treats it as abandoned
    #[must_use]
    pub const fn stale_claim_secs(mut self, secs: u64) -> Self {
        self.stale_claim_secs = secs;
        self
    }

    /// Build the final `FileBackingStore`
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn build(self) -> Result<FileBackingStore, ValidationError> {
        FileBackingStore::validate_path(&self.path)?;
        Ok(FileBackingStore {
            path: self.path,
            stale_claim_secs: self.stale_claim_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use formpost_common::Address;

    use super::*;

    fn create_test_message(subject: &str) -> Message {
        Message::builder()
            .form("contact")
            .from(Address::parse("site@example.com").expect("valid"))
            .to(Address::parse("admin@example.com").expect("valid"))
            .subject(subject)
            .text("test message")
            .build()
            .expect("complete message")
    }

    fn store_in(dir: &tempfile::TempDir) -> FileBackingStore {
        let store = FileBackingStore::builder()
            .path(dir.path().to_path_buf())
            .build()
            .expect("valid path");
        store.init().expect("init");
        store
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let message = create_test_message("hello");
        let id = store.append(message.clone()).await.expect("append");

        assert!(dir.path().join(id.pending_filename()).exists());

        let pending = store.list_pending().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(*pending[0].message, message);

        let claimed = store.claim(&id).await.expect("claim").expect("claimable");
        assert_eq!(claimed.id, id);
        assert!(dir.path().join(id.claimed_filename()).exists());
        assert!(store.list_pending().await.expect("list").is_empty());

        store.remove(&id).await.expect("remove");
        assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }

    #[tokio::test]
    async fn test_mark_failed_persists_attempts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let id = store.append(create_test_message("hello")).await.expect("append");
        store.claim(&id).await.expect("claim");
        store.mark_failed(&id, "451 try later").await.expect("mark failed");
        store.claim(&id).await.expect("claim");
        store.mark_failed(&id, "421 busy").await.expect("mark failed");

        // A fresh handle sees the same state
        let reopened = store_in(&dir);
        let pending = reopened.list_pending().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("421 busy"));
    }

    #[tokio::test]
    async fn test_remove_twice_is_silent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let id = store.append(create_test_message("hello")).await.expect("append");
        store.remove(&id).await.expect("first remove");
        store.remove(&id).await.expect("second remove");
    }

    #[tokio::test]
    async fn test_init_cleans_orphans_and_restores_stale_claims() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBackingStore::builder()
            .path(dir.path().to_path_buf())
            .stale_claim_secs(0)
            .build()
            .expect("valid path");
        store.init().expect("init");

        let id = store.append(create_test_message("hello")).await.expect("append");
        store.claim(&id).await.expect("claim");
        std::fs::write(dir.path().join(".tmp_garbage.msg"), b"partial").expect("write");
        std::fs::write(dir.path().join("whatever.claimed.deleted"), b"old").expect("write");

        store.init().expect("init");

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![id.pending_filename()]);
    }

    #[tokio::test]
    async fn test_init_keeps_fresh_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = store_in(&dir);

        let id = MessageId::generate();
        let spooled = SpooledMessage::new(id.clone(), create_test_message("hello"));
        let bytes =
            bincode::serde::encode_to_vec(&spooled, bincode::config::standard()).expect("encode");
        let temp = writer.temp_path(&id.pending_filename());
        std::fs::write(&temp, bytes).expect("write");

        // A second process starting up while the first is between write and rename
        store_in(&dir);

        assert!(temp.exists());
        std::fs::rename(&temp, writer.pending_path(&id)).expect("rename");
        assert_eq!(writer.list_pending().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_init_keeps_live_claims() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let id = store.append(create_test_message("hello")).await.expect("append");
        store.claim(&id).await.expect("claim");

        store.init().expect("init");

        assert!(dir.path().join(id.claimed_filename()).exists());
        assert!(store.list_pending().await.expect("list").is_empty());
    }
}
