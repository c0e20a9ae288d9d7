//! A single vault: secrets, their history log and sharing metadata
//!
//! Every secret mutation and every pull runs inside one critical section
//! guarded by the vault's mutex, so each one lands as exactly one commit in
//! lock-acquisition order. Reads never take that mutex.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use strongroom_core::config::HistoryConfig;
use strongroom_core::error::{GitError, Result, StorageError, VaultError};
use strongroom_core::{validate_name, ChangeKind, Storage, VaultMetadata, METADATA_DIR, METADATA_FILE};
use strongroom_git::protocol::{
    fetch_advertisement, fetch_pack, ReferenceAdvertiser, TransferClient, UploadPack,
    UploadPackRequest,
};
use strongroom_git::{CommitInfo, FastForward, GitRepo, Oid};

use crate::index::{SecretEntry, SecretIndex};

/// Capabilities this side asks for when fetching
const FETCH_CAPABILITIES: &[&str] = &["side-band-64k"];

/// Result of pulling a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing new on the remote
    UpToDate,
    /// Local history moved forward to the remote's HEAD
    FastForwarded { from: Option<Oid>, to: Oid },
}

/// A named, versioned collection of secrets
pub struct Vault {
    name: String,
    path: PathBuf,
    storage: Arc<dyn Storage>,
    history: HistoryConfig,
    index: RwLock<SecretIndex>,
    metadata: Mutex<VaultMetadata>,
    lock: Mutex<()>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open the vault stored at `path`, creating whatever is missing.
    ///
    /// Creates the directory and an empty history log on first use, loads
    /// the metadata (or writes an empty document) and scans storage to
    /// build the secret index.
    #[instrument(skip(storage, history), fields(path = %path.display()))]
    pub(crate) async fn load(
        name: &str,
        path: PathBuf,
        storage: Arc<dyn Storage>,
        history: HistoryConfig,
    ) -> Result<Self> {
        storage.mkdir(&path.join(METADATA_DIR), true).await?;

        let host = storage.host_path(&path);
        let branch = history.default_branch.clone();
        blocking(move || {
            if !GitRepo::exists(&host) {
                GitRepo::init(&host, &branch)?;
            }
            Ok(())
        })
        .await?;

        let metadata_path = path.join(METADATA_DIR).join(METADATA_FILE);
        let metadata = match storage.read(&metadata_path).await {
            Ok(bytes) => VaultMetadata::from_json(&bytes)?,
            Err(StorageError::NotFound(_)) => {
                let metadata = VaultMetadata::default();
                storage.write(&metadata_path, &metadata.to_json()?).await?;
                metadata
            }
            Err(e) => return Err(e.into()),
        };

        let index = scan(storage.as_ref(), &path).await?;
        info!(vault = name, secrets = index.len(), "loaded vault");

        Ok(Self {
            name: name.to_string(),
            path,
            storage,
            history,
            index: RwLock::new(index),
            metadata: Mutex::new(metadata),
            lock: Mutex::new(()),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Vault name, also the author of every commit
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage directory holding this vault
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Secrets
    // ------------------------------------------------------------------

    /// Add a new secret and commit it
    #[instrument(skip(self, content), fields(vault = %self.name))]
    pub async fn add_secret(&self, name: &str, content: &[u8]) -> Result<()> {
        validate_name(name)?;
        let _guard = self.lock.lock().await;
        self.ensure_live()?;

        if self.index.read().await.contains(name) {
            return Err(VaultError::SecretExists(name.to_string()).into());
        }

        self.storage.write(&self.secret_path(name), content).await?;
        if let Err(e) = self.commit(name, ChangeKind::Added).await {
            self.rollback(name, None).await;
            return Err(e);
        }
        self.index.write().await.store(name, content.to_vec());

        info!(vault = %self.name, secret = name, "added secret");
        Ok(())
    }

    /// Overwrite an existing secret and commit it
    #[instrument(skip(self, content), fields(vault = %self.name))]
    pub async fn update_secret(&self, name: &str, content: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_live()?;

        if !self.index.read().await.contains(name) {
            return Err(VaultError::SecretNotFound(name.to_string()).into());
        }

        let path = self.secret_path(name);
        let previous = self.read_stored(name).await?;
        self.storage.write(&path, content).await?;
        if let Err(e) = self.commit(name, ChangeKind::Modified).await {
            self.rollback(name, Some(previous.as_slice())).await;
            return Err(e);
        }
        self.index.write().await.store(name, content.to_vec());

        info!(vault = %self.name, secret = name, "updated secret");
        Ok(())
    }

    /// Delete a secret and commit its removal
    #[instrument(skip(self), fields(vault = %self.name))]
    pub async fn remove_secret(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_live()?;

        if !self.index.read().await.contains(name) {
            return Err(VaultError::SecretNotFound(name.to_string()).into());
        }

        let path = self.secret_path(name);
        let previous = self.read_stored(name).await?;
        self.storage.delete(&path).await?;
        if let Err(e) = self.commit(name, ChangeKind::Removed).await {
            self.rollback(name, Some(previous.as_slice())).await;
            return Err(e);
        }
        self.index.write().await.remove(name);

        info!(vault = %self.name, secret = name, "removed secret");
        Ok(())
    }

    /// Read a secret, loading it from storage on first access
    pub async fn get_secret(&self, name: &str) -> Result<Vec<u8>> {
        self.ensure_live()?;

        let generation = {
            let index = self.index.read().await;
            match index.get(name) {
                None => return Err(VaultError::SecretNotFound(name.to_string()).into()),
                Some(SecretEntry::Loaded(content)) => return Ok(content.clone()),
                Some(SecretEntry::Unloaded) => index.generation(),
            }
        };

        let content = self.read_stored(name).await?;

        if self
            .index
            .write()
            .await
            .hydrate(name, content.clone(), generation)
        {
            debug!(vault = %self.name, secret = name, "hydrated secret");
        }
        Ok(content)
    }

    /// Names of all secrets, in no particular order
    pub async fn list_secrets(&self) -> Vec<String> {
        self.index.read().await.names()
    }

    // ------------------------------------------------------------------
    // Sharing
    // ------------------------------------------------------------------

    /// Authorize `pub_key` to pull this vault
    #[instrument(skip(self), fields(vault = %self.name))]
    pub async fn share_vault(&self, pub_key: &str) -> Result<()> {
        self.ensure_live()?;
        let mut metadata = self.metadata.lock().await;
        if !metadata.shared_pub_keys.insert(pub_key.to_string()) {
            return Err(VaultError::AlreadyShared(pub_key.to_string()).into());
        }
        if let Err(e) = self.persist_metadata(&metadata).await {
            metadata.shared_pub_keys.remove(pub_key);
            return Err(e);
        }
        info!(vault = %self.name, "shared vault");
        Ok(())
    }

    /// Revoke a previously shared key
    #[instrument(skip(self), fields(vault = %self.name))]
    pub async fn unshare_vault(&self, pub_key: &str) -> Result<()> {
        self.ensure_live()?;
        let mut metadata = self.metadata.lock().await;
        if !metadata.shared_pub_keys.remove(pub_key) {
            return Err(VaultError::NotShared(pub_key.to_string()).into());
        }
        if let Err(e) = self.persist_metadata(&metadata).await {
            metadata.shared_pub_keys.insert(pub_key.to_string());
            return Err(e);
        }
        info!(vault = %self.name, "unshared vault");
        Ok(())
    }

    /// Whether `pub_key` is authorized to pull this vault
    pub async fn is_shared_with(&self, pub_key: &str) -> bool {
        self.metadata.lock().await.shared_pub_keys.contains(pub_key)
    }

    /// All authorized keys, sorted
    pub async fn shared_keys(&self) -> Vec<String> {
        self.metadata
            .lock()
            .await
            .shared_pub_keys
            .iter()
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // History and transfer
    // ------------------------------------------------------------------

    /// Fast-forward this vault to the remote's HEAD.
    ///
    /// Holds the vault mutex for the whole pull. The secret index is only
    /// rebuilt once the new history is in place; on failure it is untouched.
    #[instrument(skip(self, client), fields(vault = %self.name))]
    pub async fn pull_vault(&self, client: &dyn TransferClient) -> Result<PullOutcome> {
        let _guard = self.lock.lock().await;
        self.ensure_live()?;
        let start = std::time::Instant::now();

        let branch = self
            .with_repo(|repo| repo.current_branch())
            .await?
            .ok_or(GitError::DetachedHead)?;

        let remote = fetch_advertisement(client, &self.name).await?;
        let Some(remote_head) = remote.head() else {
            debug!(vault = %self.name, "remote has no history");
            return Ok(PullOutcome::UpToDate);
        };

        let local_head = self.with_repo(|repo| repo.head_oid()).await?;
        if local_head == Some(remote_head) {
            return Ok(PullOutcome::UpToDate);
        }

        let capabilities = FETCH_CAPABILITIES
            .iter()
            .filter(|c| remote.has_capability(c))
            .map(|c| c.to_string())
            .collect();
        let pack = fetch_pack(
            client,
            &self.name,
            vec![remote_head],
            local_head.into_iter().collect(),
            capabilities,
        )
        .await?;

        let result = self
            .with_repo(move |repo| {
                repo.index_pack(&pack)?;
                repo.fast_forward(&branch, remote_head)
            })
            .await?;

        let outcome = match result {
            FastForward::UpToDate => PullOutcome::UpToDate,
            FastForward::Advanced { from, to } => {
                let fresh = scan(self.storage.as_ref(), &self.path).await?;
                self.index.write().await.replace(fresh);
                PullOutcome::FastForwarded { from, to }
            }
        };

        info!(
            vault = %self.name,
            outcome = ?outcome,
            duration_ms = start.elapsed().as_millis(),
            "pulled vault"
        );
        Ok(outcome)
    }

    /// Commit messages, most recent first, optionally only the newest `depth`
    pub async fn get_vault_history(&self, depth: Option<usize>) -> Result<Vec<String>> {
        Ok(self
            .history(depth)
            .await?
            .into_iter()
            .map(|commit| commit.message)
            .collect())
    }

    /// Full history entries, most recent first
    pub async fn history(&self, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        self.ensure_live()?;
        self.with_repo(move |repo| repo.history(depth)).await
    }

    /// Packet-line ref advertisement for this vault's history log
    pub async fn advertise_refs(&self, capabilities: &str) -> Result<Vec<u8>> {
        self.ensure_live()?;
        let context = format!("vault '{}'", self.name);
        let capabilities = capabilities.to_string();
        self.with_repo(move |repo| {
            ReferenceAdvertiser::new(repo.inner(), capabilities).advertise(&context)
        })
        .await
    }

    /// Answer an upload-pack request body
    pub async fn upload_pack(&self, body: &[u8]) -> Result<Vec<u8>> {
        self.ensure_live()?;
        let request = UploadPackRequest::parse(body)?;
        self.with_repo(move |repo| UploadPack::new(repo.inner()).respond(&request))
            .await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Delete the vault's storage and tombstone this handle.
    ///
    /// Waits for any in-flight mutation to finish. Returns `false` if the
    /// vault was already destroyed.
    pub(crate) async fn destroy(&self) -> Result<bool> {
        let _guard = self.lock.lock().await;
        if self.destroyed.load(Ordering::Acquire) {
            return Ok(false);
        }

        self.storage.remove_dir_all(&self.path).await?;
        self.destroyed.store(true, Ordering::Release);
        self.index.write().await.clear();

        info!(vault = %self.name, "destroyed vault");
        Ok(true)
    }

    /// Whether the vault has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(VaultError::Destroyed(self.name.clone()).into());
        }
        Ok(())
    }

    fn secret_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    async fn commit(&self, name: &str, change: ChangeKind) -> Result<Oid> {
        let path = PathBuf::from(name);
        let author = self.name.clone();
        let email = self.history.author_email.clone();
        self.with_repo(move |repo| repo.commit_change(&path, change, &author, &email))
            .await
    }

    /// Content of a secret as stored, bypassing the index
    async fn read_stored(&self, name: &str) -> Result<Vec<u8>> {
        match self.storage.read(&self.secret_path(name)).await {
            Ok(content) => Ok(content),
            // Removed behind the index's back.
            Err(StorageError::NotFound(_)) => {
                Err(VaultError::SecretNotFound(name.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Put storage and the history index back the way they were before a
    /// mutation whose commit failed. `previous` is the content to restore,
    /// `None` if the secret did not exist.
    async fn rollback(&self, name: &str, previous: Option<&[u8]>) {
        let path = self.secret_path(name);
        let restored = match previous {
            Some(content) => self.storage.write(&path, content).await,
            None => self.storage.delete(&path).await,
        };
        if let Err(e) = restored {
            warn!(vault = %self.name, secret = name, error = %e, "failed to restore secret");
        }

        let relative = PathBuf::from(name);
        if let Err(e) = self.with_repo(move |repo| repo.unstage(&relative)).await {
            warn!(vault = %self.name, secret = name, error = %e, "failed to reset history index");
        }
        debug!(vault = %self.name, secret = name, "rolled back secret");
    }

    async fn persist_metadata(&self, metadata: &VaultMetadata) -> Result<()> {
        let path = self.path.join(METADATA_DIR).join(METADATA_FILE);
        self.storage.write(&path, &metadata.to_json()?).await?;
        Ok(())
    }

    /// Run `f` against the history log on the blocking pool
    async fn with_repo<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&GitRepo) -> strongroom_git::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let host = self.storage.host_path(&self.path);
        blocking(move || {
            let repo = GitRepo::open(&host)?;
            f(&repo)
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> strongroom_git::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GitError::Task(e.to_string()))?;
    Ok(result?)
}

/// Build an index of every secret file directly under `path`
async fn scan(storage: &dyn Storage, path: &Path) -> Result<SecretIndex> {
    let entries = storage.list_directory(path).await?;
    let names = entries
        .into_iter()
        .filter(|entry| !entry.is_dir && validate_name(&entry.name).is_ok())
        .map(|entry| entry.name);
    Ok(SecretIndex::from_names(names))
}
