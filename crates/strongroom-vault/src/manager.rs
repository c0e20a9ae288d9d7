//! Vault registry and lifecycle
//!
//! The manager guarantees at most one live [`Vault`] per name. Names being
//! created or cloned are reserved in the registry so concurrent creations of
//! the same name fail fast without holding the registry lock across I/O.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, instrument, warn};

use strongroom_core::error::{Result, VaultError};
use strongroom_core::{validate_name, Config, Storage};
use strongroom_git::protocol::TransferClient;
use strongroom_git::GitRepo;

use crate::vault::Vault;

#[derive(Default)]
struct Registry {
    vaults: HashMap<String, Arc<Vault>>,
    pending: HashSet<String>,
}

/// Owns every vault under one storage root
pub struct VaultManager {
    storage: Arc<dyn Storage>,
    config: Config,
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for VaultManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultManager")
            .field("vaults_dir", &self.config.storage.vaults_dir)
            .finish_non_exhaustive()
    }
}

/// A name held while its vault is being built
struct Reservation<'m> {
    manager: &'m VaultManager,
    name: String,
}

impl Reservation<'_> {
    fn register(self, vault: Arc<Vault>) {
        let mut registry = self.manager.registry();
        registry.pending.remove(&self.name);
        registry.vaults.insert(self.name.clone(), vault);
        // Release before `Drop` takes the lock again.
        drop(registry);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.manager.registry().pending.remove(&self.name);
    }
}

impl VaultManager {
    /// Open the manager and load every vault already in storage
    #[instrument(skip(storage, config), fields(vaults_dir = %config.storage.vaults_dir.display()))]
    pub async fn open(storage: Arc<dyn Storage>, config: Config) -> Result<Self> {
        let manager = Self {
            storage,
            config,
            registry: Mutex::new(Registry::default()),
        };

        let root = manager.config.storage.vaults_dir.clone();
        manager.storage.mkdir(&root, true).await?;

        let mut vaults = HashMap::new();
        for entry in manager.storage.list_directory(&root).await? {
            if !entry.is_dir || validate_name(&entry.name).is_err() {
                continue;
            }
            let path = manager.vault_path(&entry.name);
            if !GitRepo::exists(&manager.storage.host_path(&path)) {
                warn!(entry = %entry.name, "skipping directory without history log");
                continue;
            }
            let vault = Vault::load(
                &entry.name,
                path,
                manager.storage.clone(),
                manager.config.history.clone(),
            )
            .await?;
            vaults.insert(entry.name, Arc::new(vault));
        }

        info!(vaults = vaults.len(), "opened vault manager");
        manager.registry().vaults = vaults;
        Ok(manager)
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an empty vault
    #[instrument(skip(self))]
    pub async fn create_vault(&self, name: &str) -> Result<Arc<Vault>> {
        let reservation = self.reserve(name)?;
        let vault = Arc::new(self.build(name).await?);

        reservation.register(vault.clone());
        info!(vault = name, "created vault");
        Ok(vault)
    }

    /// Whether a vault with this name is registered
    pub fn vault_exists(&self, name: &str) -> bool {
        self.registry().vaults.contains_key(name)
    }

    /// Look up a registered vault
    pub fn get_vault(&self, name: &str) -> Result<Arc<Vault>> {
        self.registry()
            .vaults
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::VaultNotFound(name.to_string()).into())
    }

    /// Names of all registered vaults, sorted
    pub fn list_vaults(&self) -> Vec<String> {
        let mut names: Vec<_> = self.registry().vaults.keys().cloned().collect();
        names.sort();
        names
    }

    /// Delete a vault and its storage.
    ///
    /// Returns `Ok(false)` when no vault with this name is registered. The
    /// registry entry is only dropped once storage is gone, so a failed
    /// destroy leaves the vault registered and usable.
    #[instrument(skip(self))]
    pub async fn destroy_vault(&self, name: &str) -> Result<bool> {
        let Some(vault) = self.registry().vaults.get(name).cloned() else {
            return Ok(false);
        };

        let destroyed = vault.destroy().await?;

        let mut registry = self.registry();
        if registry
            .vaults
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, &vault))
        {
            registry.vaults.remove(name);
        }
        Ok(destroyed)
    }

    /// Copy a remote vault's full history into a new local vault
    #[instrument(skip(self, client))]
    pub async fn clone_vault(&self, name: &str, client: &dyn TransferClient) -> Result<Arc<Vault>> {
        let start = std::time::Instant::now();
        let reservation = self.reserve(name)?;
        let vault = self.build(name).await?;

        if let Err(e) = vault.pull_vault(client).await {
            self.discard(name).await;
            return Err(e);
        }

        let secrets = vault.list_secrets().await.len();
        let vault = Arc::new(vault);
        reservation.register(vault.clone());
        info!(
            vault = name,
            secrets,
            duration_ms = start.elapsed().as_millis(),
            "cloned vault"
        );
        Ok(vault)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn vault_path(&self, name: &str) -> PathBuf {
        self.config.storage.vaults_dir.join(name)
    }

    fn reserve(&self, name: &str) -> Result<Reservation<'_>> {
        validate_name(name)?;
        let mut registry = self.registry();
        if registry.vaults.contains_key(name) || !registry.pending.insert(name.to_string()) {
            return Err(VaultError::VaultExists(name.to_string()).into());
        }
        Ok(Reservation {
            manager: self,
            name: name.to_string(),
        })
    }

    /// Load a fresh vault for a reserved name, cleaning up on failure
    async fn build(&self, name: &str) -> Result<Vault> {
        let path = self.vault_path(name);
        if self.storage.exists(&path).await? {
            return Err(VaultError::VaultExists(name.to_string()).into());
        }

        match Vault::load(
            name,
            path,
            self.storage.clone(),
            self.config.history.clone(),
        )
        .await
        {
            Ok(vault) => Ok(vault),
            Err(e) => {
                self.discard(name).await;
                Err(e)
            }
        }
    }

    async fn discard(&self, name: &str) {
        if let Err(e) = self.storage.remove_dir_all(&self.vault_path(name)).await {
            warn!(vault = name, error = %e, "failed to clean up vault directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{LocalTransferClient, VaultTransferService};
    use strongroom_core::{ErrorKind, FsStorage, StrongroomError};
    use tempfile::TempDir;

    async fn manager_in(temp: &TempDir) -> Arc<VaultManager> {
        let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(temp.path()));
        Arc::new(VaultManager::open(storage, Config::default()).await.unwrap())
    }

    fn client_for(manager: &Arc<VaultManager>) -> LocalTransferClient {
        LocalTransferClient::new(VaultTransferService::new(manager.clone()))
    }

    #[tokio::test]
    async fn test_create_exists_destroy_roundtrip() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp).await;

        for name in ["alpha", "beta-2", "with space"] {
            manager.create_vault(name).await.unwrap();
            assert!(manager.vault_exists(name));
            assert!(temp.path().join("vaults").join(name).join(".git").is_dir());

            assert!(manager.destroy_vault(name).await.unwrap());
            assert!(!manager.vault_exists(name));
            assert!(!temp.path().join("vaults").join(name).exists());
        }
        assert!(!manager.destroy_vault("alpha").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp).await;

        let first = manager.create_vault("ops").await.unwrap();
        first.add_secret("keep", b"me").await.unwrap();

        let err = manager.create_vault("ops").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(manager.list_vaults(), vec!["ops".to_string()]);
        assert_eq!(first.get_secret("keep").await.unwrap(), b"me");
    }

    #[tokio::test]
    async fn test_invalid_vault_name() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp).await;

        let err = manager.create_vault("../escape").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(manager.list_vaults().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_vault() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp).await;
        assert!(matches!(
            manager.get_vault("nope"),
            Err(StrongroomError::Vault(VaultError::VaultNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_linearized() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp).await;
        let vault = manager.create_vault("busy").await.unwrap();

        let mut handles = Vec::new();
        for i in 1..=50 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                vault
                    .add_secret(&i.to_string(), format!("value {i}").as_bytes())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = vault.get_vault_history(None).await.unwrap();
        assert_eq!(history.len(), 50);
        let order: Vec<u32> = history
            .iter()
            .rev()
            .map(|message| {
                message
                    .trim_start_matches("Add secret: ")
                    .parse()
                    .unwrap()
            })
            .collect();
        assert_eq!(order, (1..=50).collect::<Vec<_>>());
        assert_eq!(vault.list_secrets().await.len(), 50);
    }

    #[tokio::test]
    async fn test_clone_and_pull_converge() {
        let origin_dir = TempDir::new().unwrap();
        let origin = manager_in(&origin_dir).await;
        let source = origin.create_vault("shared").await.unwrap();
        source
            .add_secret("ASecret", b"super confidential information")
            .await
            .unwrap();

        let peer_dir = TempDir::new().unwrap();
        let peer = manager_in(&peer_dir).await;
        let client = client_for(&origin);

        let copy = peer.clone_vault("shared", &client).await.unwrap();
        assert_eq!(
            copy.get_secret("ASecret").await.unwrap(),
            b"super confidential information"
        );

        source.add_secret("Another", b"second").await.unwrap();
        let outcome = copy.pull_vault(&client).await.unwrap();
        assert!(matches!(outcome, crate::PullOutcome::FastForwarded { .. }));
        assert_eq!(copy.get_secret("Another").await.unwrap(), b"second");
        assert_eq!(
            copy.get_vault_history(None).await.unwrap(),
            source.get_vault_history(None).await.unwrap()
        );

        assert_eq!(
            copy.pull_vault(&client).await.unwrap(),
            crate::PullOutcome::UpToDate
        );
    }

    #[tokio::test]
    async fn test_pull_reflects_deletion() {
        let origin_dir = TempDir::new().unwrap();
        let origin = manager_in(&origin_dir).await;
        let source = origin.create_vault("shared").await.unwrap();
        source.add_secret("stays", b"1").await.unwrap();
        source.add_secret("goes", b"2").await.unwrap();

        let peer_dir = TempDir::new().unwrap();
        let peer = manager_in(&peer_dir).await;
        let client = client_for(&origin);
        let copy = peer.clone_vault("shared", &client).await.unwrap();
        assert_eq!(copy.get_secret("goes").await.unwrap(), b"2");

        source.remove_secret("goes").await.unwrap();
        copy.pull_vault(&client).await.unwrap();

        let mut local = copy.list_secrets().await;
        let mut remote = source.list_secrets().await;
        local.sort();
        remote.sort();
        assert_eq!(local, vec!["stays".to_string()]);
        assert_eq!(local, remote);
        assert_eq!(
            copy.get_secret("goes").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_clone_of_empty_vault() {
        let origin_dir = TempDir::new().unwrap();
        let origin = manager_in(&origin_dir).await;
        origin.create_vault("empty").await.unwrap();

        let peer_dir = TempDir::new().unwrap();
        let peer = manager_in(&peer_dir).await;
        let copy = peer
            .clone_vault("empty", &client_for(&origin))
            .await
            .unwrap();
        assert!(copy.list_secrets().await.is_empty());
        assert!(copy.get_vault_history(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_nothing_behind() {
        let origin_dir = TempDir::new().unwrap();
        let origin = manager_in(&origin_dir).await;

        let peer_dir = TempDir::new().unwrap();
        let peer = manager_in(&peer_dir).await;

        let err = peer
            .clone_vault("missing", &client_for(&origin))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransferFailure);
        assert!(!peer.vault_exists("missing"));
        assert!(!peer_dir.path().join("vaults").join("missing").exists());

        // The name is free again after the failure.
        origin.create_vault("missing").await.unwrap();
        peer.clone_vault("missing", &client_for(&origin))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clone_existing_name_fails() {
        let origin_dir = TempDir::new().unwrap();
        let origin = manager_in(&origin_dir).await;
        origin.create_vault("ops").await.unwrap();

        let peer_dir = TempDir::new().unwrap();
        let peer = manager_in(&peer_dir).await;
        peer.create_vault("ops").await.unwrap();

        let err = peer
            .clone_vault("ops", &client_for(&origin))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_diverged_pull_is_rejected() {
        let origin_dir = TempDir::new().unwrap();
        let origin = manager_in(&origin_dir).await;
        let source = origin.create_vault("shared").await.unwrap();
        source.add_secret("base", b"0").await.unwrap();

        let peer_dir = TempDir::new().unwrap();
        let peer = manager_in(&peer_dir).await;
        let client = client_for(&origin);
        let copy = peer.clone_vault("shared", &client).await.unwrap();

        source.add_secret("remote", b"r").await.unwrap();
        copy.add_secret("local", b"l").await.unwrap();

        let err = copy.pull_vault(&client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransferFailure);

        let mut names = copy.list_secrets().await;
        names.sort();
        assert_eq!(names, vec!["base".to_string(), "local".to_string()]);
        // The lock was released on failure.
        copy.add_secret("after", b"a").await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_loads_existing_vaults() {
        let temp = TempDir::new().unwrap();
        {
            let manager = manager_in(&temp).await;
            let vault = manager.create_vault("ops").await.unwrap();
            vault.add_secret("token", b"abc").await.unwrap();
            manager.create_vault("dev").await.unwrap();
        }
        std::fs::create_dir_all(temp.path().join("vaults").join("stray")).unwrap();

        let manager = manager_in(&temp).await;
        assert_eq!(
            manager.list_vaults(),
            vec!["dev".to_string(), "ops".to_string()]
        );
        let vault = manager.get_vault("ops").unwrap();
        assert_eq!(vault.get_secret("token").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_stale_handle_after_destroy() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp).await;
        let vault = manager.create_vault("ops").await.unwrap();
        vault.add_secret("a", b"1").await.unwrap();

        manager.destroy_vault("ops").await.unwrap();
        assert!(vault.is_destroyed());
        assert!(matches!(
            vault.add_secret("b", b"2").await,
            Err(StrongroomError::Vault(VaultError::Destroyed(_)))
        ));

        // A new vault under the same name starts empty.
        let fresh = manager.create_vault("ops").await.unwrap();
        assert!(fresh.list_secrets().await.is_empty());
    }
}
