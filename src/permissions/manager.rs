//! Per-origin permission state machine.
//!
//! ```text
//! prompt  --consent granted-->  granted
//! prompt  --consent denied--->  prompt   (caller sees "denied" once)
//! granted --revoke----------->  prompt
//! ```
//!
//! `denied` is never persisted. When the backing store is unavailable (for
//! instance cookies blocked in a third-party context) reads fall back to
//! `prompt` and writes are dropped; any other storage failure propagates.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::errors::{MediatorError, StorageError};
use crate::permissions::types::{PermissionDescriptor, PermissionState, PermissionStatus};
use crate::storage::{StorageArea, StorageFactory, StoreConfig};

/// Asks the user (or some policy) for a permission.
///
/// Only called when the cached state is `prompt`. The returned value is
/// validated as a permission status.
#[async_trait]
pub trait ConsentHandler: Send + Sync {
    async fn request_permission(&self, descriptor: &PermissionDescriptor) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`ConsentHandler`].
pub struct ConsentFn<F>(F);

#[async_trait]
impl<F, Fut> ConsentHandler for ConsentFn<F>
where
    F: Fn(PermissionDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn request_permission(&self, descriptor: &PermissionDescriptor) -> anyhow::Result<Value> {
        (self.0)(descriptor.clone()).await
    }
}

/// Wraps `f` as a shareable consent handler.
pub fn consent_fn<F, Fut>(f: F) -> Arc<dyn ConsentHandler>
where
    F: Fn(PermissionDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(ConsentFn(f))
}

/// Permission cache and consent gate for one relying origin.
pub struct PermissionManager {
    origin: String,
    factory: Arc<StorageFactory>,
    driver: Option<String>,
    consent: Arc<dyn ConsentHandler>,
    /// Permission names this manager recognizes.
    registry: RwLock<HashSet<String>>,
    storage: OnceCell<Arc<dyn StorageArea>>,
    /// One lock per permission name so only one consent prompt is in flight.
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PermissionManager {
    /// Creates a manager for `origin`, storing through `factory`'s default driver.
    pub fn new(
        origin: &url::Origin,
        factory: Arc<StorageFactory>,
        consent: Arc<dyn ConsentHandler>,
    ) -> Result<Self, MediatorError> {
        if !origin.is_tuple() {
            return Err(MediatorError::Validation("permission origin must not be opaque".to_string()));
        }
        Ok(Self {
            origin: origin.ascii_serialization(),
            factory,
            driver: None,
            consent,
            registry: RwLock::new(HashSet::new()),
            storage: OnceCell::new(),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Stores permissions through the named driver instead of the default.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Name of the storage instance holding this origin's permissions.
    pub fn storage_name(&self) -> String {
        format!("permission_{}", self.origin)
    }

    /// Adds `name` to the permissions this manager recognizes.
    pub fn register_permission(&self, name: impl Into<String>) {
        self.registry.write().unwrap().insert(name.into());
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.read().unwrap().contains(name)
    }

    /// Returns the cached status, or `prompt` when nothing is stored.
    pub async fn query(&self, descriptor: &PermissionDescriptor) -> Result<PermissionStatus, MediatorError> {
        self.validate(descriptor)?;
        self.read_status(&descriptor.name).await
    }

    /// Returns the cached status, asking for consent first if it is `prompt`.
    ///
    /// A denial is returned to the caller but persisted as `prompt`.
    pub async fn request(&self, descriptor: &PermissionDescriptor) -> Result<PermissionStatus, MediatorError> {
        self.validate(descriptor)?;
        let lock = self.request_lock(&descriptor.name);
        let _guard = lock.lock().await;

        let cached = self.read_status(&descriptor.name).await?;
        if cached.state != PermissionState::Prompt {
            return Ok(cached);
        }

        log::debug!("Asking consent for {} on {}", descriptor.name, self.origin);
        let raw = self
            .consent
            .request_permission(descriptor)
            .await
            .map_err(MediatorError::Consent)?;
        let status = PermissionStatus::try_from(&raw)?;

        self.write_status(&descriptor.name, &status.for_storage()).await?;
        log::debug!("Permission {} on {} is now {}", descriptor.name, self.origin, status.state);
        Ok(status)
    }

    /// Resets the permission to `prompt` and returns the fresh status.
    pub async fn revoke(&self, descriptor: &PermissionDescriptor) -> Result<PermissionStatus, MediatorError> {
        self.validate(descriptor)?;
        {
            let lock = self.request_lock(&descriptor.name);
            let _guard = lock.lock().await;
            self.write_status(&descriptor.name, &PermissionStatus::prompt()).await?;
        }
        log::debug!("Permission {} on {} revoked", descriptor.name, self.origin);
        self.query(descriptor).await
    }

    /// Fails with [`MediatorError::NotAllowed`] unless the permission is granted.
    pub async fn ensure_granted(&self, descriptor: &PermissionDescriptor) -> Result<(), MediatorError> {
        if self.query(descriptor).await?.is_granted() {
            Ok(())
        } else {
            Err(MediatorError::NotAllowed(format!(
                "{} is not granted for {}",
                descriptor.name, self.origin
            )))
        }
    }

    fn validate(&self, descriptor: &PermissionDescriptor) -> Result<(), MediatorError> {
        if descriptor.name.is_empty() {
            return Err(MediatorError::Validation("permission name must not be empty".to_string()));
        }
        if !self.is_registered(&descriptor.name) {
            return Err(MediatorError::UnknownPermission(descriptor.name.clone()));
        }
        Ok(())
    }

    fn request_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.in_flight
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn storage(&self) -> anyhow::Result<Arc<dyn StorageArea>> {
        self.storage
            .get_or_try_init(|| async {
                let mut config = StoreConfig::new(self.storage_name());
                config.driver = self.driver.clone();
                self.factory.create_instance(config).await
            })
            .await
            .cloned()
    }

    async fn read_status(&self, name: &str) -> Result<PermissionStatus, MediatorError> {
        let stored = match self.storage().await {
            Ok(storage) => storage.get(name).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(Some(value)) => PermissionStatus::try_from(&value),
            Ok(None) => Ok(PermissionStatus::default()),
            Err(e) if is_unavailable(&e) => {
                log::warn!("Permission storage for {} unavailable, assuming prompt: {e}", self.origin);
                Ok(PermissionStatus::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_status(&self, name: &str, status: &PermissionStatus) -> Result<(), MediatorError> {
        debug_assert_ne!(status.state, PermissionState::Denied);

        let written = match self.storage().await {
            Ok(storage) => storage.set_json(name, status).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => Ok(()),
            Err(e) if is_unavailable(&e) => {
                log::warn!("Permission storage for {} unavailable, not persisting {name}: {e}", self.origin);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_unavailable(err: &anyhow::Error) -> bool {
    StorageError::from_anyhow(err).is_some_and(StorageError::is_unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediatorConfig;
    use crate::cookies::{CookieJarHandle, DefaultCookieJar};
    use crate::storage::{InMemoryDriver, StorageDriver};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STORAGE_ACCESS: &str = "storageAccess";

    fn origin(s: &str) -> url::Origin {
        url::Url::parse(s).unwrap().origin()
    }

    fn factory_on(jar: CookieJarHandle) -> Arc<StorageFactory> {
        Arc::new(StorageFactory::from_config(&MediatorConfig::default(), jar).unwrap())
    }

    /// Consent handler answering `answer` and counting calls.
    fn answering(answer: Value) -> (Arc<dyn ConsentHandler>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = consent_fn(move |_desc| {
            counter.fetch_add(1, Ordering::SeqCst);
            let answer = answer.clone();
            async move { anyhow::Ok(answer) }
        });
        (handler, calls)
    }

    fn manager(jar: CookieJarHandle, consent: Arc<dyn ConsentHandler>) -> PermissionManager {
        let _ = env_logger::builder().is_test(true).try_init();
        let manager = PermissionManager::new(&origin("https://relying.example"), factory_on(jar), consent).unwrap();
        manager.register_permission(STORAGE_ACCESS);
        manager
    }

    fn desc() -> PermissionDescriptor {
        PermissionDescriptor::new(STORAGE_ACCESS)
    }

    #[tokio::test]
    async fn granted_request_is_cached() {
        let (consent, calls) = answering(json!({"state": "granted"}));
        let manager = manager(DefaultCookieJar::new().into(), consent);

        assert_eq!(manager.query(&desc()).await.unwrap(), PermissionStatus::prompt());
        assert_eq!(manager.request(&desc()).await.unwrap(), PermissionStatus::granted());
        assert_eq!(manager.request(&desc()).await.unwrap(), PermissionStatus::granted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.query(&desc()).await.unwrap(), PermissionStatus::granted());
    }

    #[tokio::test]
    async fn denial_is_returned_but_not_persisted() {
        let (consent, calls) = answering(json!({"state": "denied"}));
        let jar: CookieJarHandle = DefaultCookieJar::new().into();
        let manager = manager(jar.clone(), consent);

        assert_eq!(manager.request(&desc()).await.unwrap(), PermissionStatus::denied());
        assert_eq!(manager.query(&desc()).await.unwrap(), PermissionStatus::prompt());

        let cookie = jar
            .read()
            .unwrap()
            .get_cookie("_lf_permission_https://relying.example__storageAccess")
            .unwrap();
        assert_eq!(cookie.value, r#"{"state":"prompt"}"#);

        // asked again on the next request
        manager.request(&desc()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn revoke_returns_to_prompt() {
        let (consent, calls) = answering(json!({"state": "granted"}));
        let manager = manager(DefaultCookieJar::new().into(), consent);

        manager.request(&desc()).await.unwrap();
        assert_eq!(manager.revoke(&desc()).await.unwrap(), PermissionStatus::prompt());
        assert_eq!(manager.query(&desc()).await.unwrap(), PermissionStatus::prompt());

        // revoke of a never-requested permission is fine too
        assert_eq!(manager.revoke(&desc()).await.unwrap(), PermissionStatus::prompt());

        manager.request(&desc()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_permissions_are_rejected() {
        let (consent, calls) = answering(json!({"state": "granted"}));
        let manager = manager(DefaultCookieJar::new().into(), consent);
        let camera = PermissionDescriptor::new("camera");

        assert!(matches!(manager.query(&camera).await, Err(MediatorError::UnknownPermission(n)) if n == "camera"));
        assert!(matches!(manager.request(&camera).await, Err(MediatorError::UnknownPermission(_))));
        assert!(matches!(manager.revoke(&camera).await, Err(MediatorError::UnknownPermission(_))));
        assert!(matches!(
            manager.query(&PermissionDescriptor::new("")).await,
            Err(MediatorError::Validation(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        manager.register_permission("camera");
        assert_eq!(manager.query(&camera).await.unwrap(), PermissionStatus::prompt());
    }

    #[tokio::test]
    async fn registries_are_per_manager() {
        let (consent, _) = answering(json!({"state": "granted"}));
        let factory = factory_on(DefaultCookieJar::new().into());
        let a = PermissionManager::new(&origin("https://a.example"), factory.clone(), consent.clone()).unwrap();
        let b = PermissionManager::new(&origin("https://b.example"), factory, consent).unwrap();

        a.register_permission(STORAGE_ACCESS);
        assert!(a.is_registered(STORAGE_ACCESS));
        assert!(!b.is_registered(STORAGE_ACCESS));
    }

    #[tokio::test]
    async fn malformed_consent_answer_is_a_validation_error() {
        let (consent, _) = answering(json!({"state": "sure"}));
        let manager = manager(DefaultCookieJar::new().into(), consent);

        assert!(matches!(manager.request(&desc()).await, Err(MediatorError::Validation(_))));
        assert_eq!(manager.query(&desc()).await.unwrap(), PermissionStatus::prompt());
    }

    #[tokio::test]
    async fn failing_consent_propagates() {
        let consent = consent_fn(|_desc| async { Err::<Value, _>(anyhow::anyhow!("dialog closed")) });
        let manager = manager(DefaultCookieJar::new().into(), consent);
        assert!(matches!(manager.request(&desc()).await, Err(MediatorError::Consent(_))));
    }

    #[tokio::test]
    async fn cached_denial_is_returned_without_prompting() {
        let (consent, calls) = answering(json!({"state": "granted"}));
        let jar: CookieJarHandle = DefaultCookieJar::new().into();
        let manager = manager(jar.clone(), consent);

        // written by some other implementation sharing the jar
        let store = manager.storage().await.unwrap();
        store.set(STORAGE_ACCESS, json!({"state": "denied"})).await.unwrap();

        assert_eq!(manager.request(&desc()).await.unwrap(), PermissionStatus::denied());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blocked_storage_degrades_to_prompt() {
        let (consent, calls) = answering(json!({"state": "granted"}));
        let manager = manager(DefaultCookieJar::blocked().into(), consent);

        assert_eq!(manager.query(&desc()).await.unwrap(), PermissionStatus::prompt());
        // granted for this call only, nothing could be stored
        assert_eq!(manager.request(&desc()).await.unwrap(), PermissionStatus::granted());
        assert_eq!(manager.query(&desc()).await.unwrap(), PermissionStatus::prompt());
        assert_eq!(manager.revoke(&desc()).await.unwrap(), PermissionStatus::prompt());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Driver whose instances fail every call with a non-availability error.
    struct BrokenDriver;

    struct BrokenArea(StoreConfig);

    #[async_trait]
    impl StorageArea for BrokenArea {
        fn config(&self) -> &StoreConfig {
            &self.0
        }
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Value>> {
            Err(StorageError::Backend("disk on fire".into()).into())
        }
        async fn set(&self, _key: &str, _value: Value) -> anyhow::Result<Value> {
            Err(StorageError::Backend("disk on fire".into()).into())
        }
        async fn remove(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn clear(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn keys(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn drop_instance(&self, _options: Option<&StoreConfig>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl StorageDriver for BrokenDriver {
        fn name(&self) -> &str {
            "broken"
        }
        async fn open(&self, config: &StoreConfig) -> anyhow::Result<Arc<dyn StorageArea>> {
            Ok(Arc::new(BrokenArea(config.clone())))
        }
    }

    #[tokio::test]
    async fn other_storage_failures_propagate() {
        let (consent, _) = answering(json!({"state": "granted"}));
        let factory = factory_on(DefaultCookieJar::new().into());
        factory.define_driver(Arc::new(BrokenDriver));
        let manager = PermissionManager::new(&origin("https://relying.example"), factory, consent)
            .unwrap()
            .with_driver("broken");
        manager.register_permission(STORAGE_ACCESS);

        let err = manager.query(&desc()).await.unwrap_err();
        assert!(matches!(err, MediatorError::Storage(_)));
        assert!(!err.is_storage_unavailable());
        assert!(manager.revoke(&desc()).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_requests_prompt_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let consent = consent_fn(move |_desc| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::task::yield_now().await;
                anyhow::Ok(json!({"state": "granted"}))
            }
        });
        let manager = Arc::new(manager(DefaultCookieJar::new().into(), consent));

        let d = desc();
        let (a, b) = tokio::join!(manager.request(&d), manager.request(&d));
        assert_eq!(a.unwrap(), PermissionStatus::granted());
        assert_eq!(b.unwrap(), PermissionStatus::granted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_memory_driver() {
        let (consent, _) = answering(json!({"state": "granted"}));
        let manager = manager(DefaultCookieJar::new().into(), consent).with_driver(InMemoryDriver::NAME);
        manager.request(&desc()).await.unwrap();
        assert_eq!(manager.storage().await.unwrap().config().driver.as_deref(), Some(InMemoryDriver::NAME));
        assert_eq!(manager.storage_name(), "permission_https://relying.example");
    }

    #[test]
    fn opaque_origin_is_rejected() {
        let (consent, _) = answering(json!({"state": "granted"}));
        let opaque = url::Url::parse("data:text/plain,hi").unwrap().origin();
        let factory = factory_on(DefaultCookieJar::new().into());
        assert!(matches!(
            PermissionManager::new(&opaque, factory, consent),
            Err(MediatorError::Validation(_))
        ));
    }
}
