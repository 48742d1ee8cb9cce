use std::sync::{Arc, RwLock};

use futures::future::try_join_all;
use serde_json::Value;

use crate::errors::{MediatorError, StorageError};
use crate::handlers::event::{RegistryBus, RegistryEvent, Subscription, UnregisterEvent, UnregisterListener};
use crate::handlers::url::normalize_url;
use crate::storage::{StorageArea, StorageFactory, StoreConfig};

/// Handler registrations made by one relying origin.
pub struct HandlerRegistry {
    origin: url::Origin,
    origin_str: String,
    factory: Arc<StorageFactory>,
    driver: Option<String>,
    listeners: RwLock<Vec<UnregisterListener>>,
    bus: RegistryBus,
}

impl HandlerRegistry {
    pub fn new(origin: &url::Origin, factory: Arc<StorageFactory>) -> Result<Self, MediatorError> {
        if !origin.is_tuple() {
            return Err(MediatorError::Validation("handler origin must not be opaque".to_string()));
        }
        Ok(Self {
            origin: origin.clone(),
            origin_str: origin.ascii_serialization(),
            factory,
            driver: None,
            listeners: RwLock::new(Vec::new()),
            bus: RegistryBus::default(),
        })
    }

    /// Stores registrations through the named driver instead of the default.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin_str
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Adds a listener called, in registration order, before each removal.
    pub fn add_unregister_listener<F>(&self, listener: F)
    where
        F: Fn(&UnregisterEvent) + Send + Sync + 'static,
    {
        self.listeners.write().unwrap().push(Arc::new(listener));
    }

    /// Registers `url` as a handler for `request_type` and returns it normalized.
    ///
    /// Registering an already registered URL changes nothing.
    pub async fn register(&self, request_type: &str, url: &str) -> Result<String, MediatorError> {
        validate_request_type(request_type)?;
        let url = normalize_url(url, &self.origin)?;

        let handlers = self.handler_store(request_type).await?;
        if is_registered(handlers.get(&url).await?) {
            return Ok(url);
        }

        let index = self.origin_index(request_type).await?;
        index.set_json(&self.origin_str, handlers.config()).await?;
        handlers.set(&url, Value::Bool(true)).await?;

        log::debug!("Registered {request_type} handler {url}");
        self.bus.publish(RegistryEvent::Registered {
            request_type: request_type.to_string(),
            registration: url.clone(),
        });
        Ok(url)
    }

    /// Removes the registration of `url`. Returns `false` if there was none.
    ///
    /// Listeners run first; if the work one attached fails, the registration
    /// is kept and the failure is returned.
    pub async fn unregister(&self, request_type: &str, url: &str) -> Result<bool, MediatorError> {
        validate_request_type(request_type)?;
        let url = normalize_url(url, &self.origin)?;

        let handlers = self.handler_store(request_type).await?;
        if !is_registered(handlers.get(&url).await?) {
            return Ok(false);
        }

        let event = UnregisterEvent::new(request_type, url.clone());
        let listeners = self.listeners.read().unwrap().clone();
        for listener in listeners {
            listener(&event);
        }
        if let Some(work) = event.take_pending() {
            work.await.map_err(MediatorError::Unregister)?;
        }

        handlers.remove(&url).await?;

        log::debug!("Unregistered {request_type} handler {url}");
        self.bus.publish(RegistryEvent::Unregistered {
            request_type: request_type.to_string(),
            registration: url.clone(),
        });
        Ok(true)
    }

    /// Returns the normalized URL if it is registered for `request_type`.
    pub async fn get_registration(&self, request_type: &str, url: &str) -> Result<Option<String>, MediatorError> {
        validate_request_type(request_type)?;
        let url = normalize_url(url, &self.origin)?;

        let handlers = self.handler_store(request_type).await?;
        if is_registered(handlers.get(&url).await?) {
            Ok(Some(url))
        } else {
            Ok(None)
        }
    }

    pub async fn has_registration(&self, request_type: &str, url: &str) -> Result<bool, MediatorError> {
        Ok(self.get_registration(request_type, url).await?.is_some())
    }

    /// Every handler URL registered for `request_type`, across all origins
    /// recorded in the origin index.
    pub async fn get_all_registrations(&self, request_type: &str) -> Result<Vec<String>, MediatorError> {
        validate_request_type(request_type)?;
        let index = self.origin_index(request_type).await?;

        let mut stores: Vec<(String, Value)> = Vec::new();
        index
            .iterate(&mut |value: Value, origin: &str, _ordinal: usize| -> Option<Value> {
                stores.push((origin.to_string(), value));
                None
            })
            .await?;

        let per_origin = stores.into_iter().map(|(origin, value)| async move {
            let config: StoreConfig = serde_json::from_value(value)
                .map_err(|source| anyhow::Error::from(StorageError::Malformed { key: origin, source }))?;
            let handlers = self.factory.create_instance(config).await?;

            let mut urls = Vec::new();
            handlers
                .iterate(&mut |value: Value, url: &str, _ordinal: usize| -> Option<Value> {
                    if is_registered(Some(value)) {
                        urls.push(url.to_string());
                    }
                    None
                })
                .await?;
            Ok::<_, anyhow::Error>(urls)
        });

        let found = try_join_all(per_origin).await?;
        Ok(found.into_iter().flatten().collect())
    }

    /// Name of the instance mapping origins to their handler store config.
    pub fn origin_index_name(request_type: &str) -> String {
        format!("webRequestHandler_{request_type}_origin")
    }

    /// Name of this origin's handler store for `request_type`.
    pub fn handler_store_name(&self, request_type: &str) -> String {
        format!("webRequestHandler_{request_type}_{}_registration", self.origin_str)
    }

    async fn origin_index(&self, request_type: &str) -> anyhow::Result<Arc<dyn StorageArea>> {
        self.open(Self::origin_index_name(request_type)).await
    }

    async fn handler_store(&self, request_type: &str) -> anyhow::Result<Arc<dyn StorageArea>> {
        self.open(self.handler_store_name(request_type)).await
    }

    async fn open(&self, name: String) -> anyhow::Result<Arc<dyn StorageArea>> {
        let mut config = StoreConfig::new(name);
        config.driver = self.driver.clone();
        self.factory.create_instance(config).await
    }
}

fn validate_request_type(request_type: &str) -> Result<(), MediatorError> {
    if request_type.is_empty() {
        return Err(MediatorError::Validation("request type must not be empty".to_string()));
    }
    Ok(())
}

fn is_registered(flag: Option<Value>) -> bool {
    matches!(flag, Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediatorConfig;
    use crate::cookies::{CookieJar, CookieJarHandle, DefaultCookieJar};
    use crate::storage::InMemoryDriver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CREDENTIAL: &str = "credentialHandler";

    fn origin(s: &str) -> url::Origin {
        url::Url::parse(s).unwrap().origin()
    }

    fn factory_with(jar: CookieJarHandle) -> Arc<StorageFactory> {
        Arc::new(StorageFactory::from_config(&MediatorConfig::default(), jar).unwrap())
    }

    fn registry(factory: Arc<StorageFactory>, o: &str) -> HandlerRegistry {
        HandlerRegistry::new(&origin(o), factory).unwrap()
    }

    #[tokio::test]
    async fn register_then_unregister() {
        let reg = registry(factory_with(DefaultCookieJar::new().into()), "https://issuer.example");
        let url = reg.register(CREDENTIAL, "https://issuer.example/handler").await.unwrap();
        assert_eq!(url, "https://issuer.example/handler");
        assert!(reg.has_registration(CREDENTIAL, &url).await.unwrap());
        assert_eq!(reg.get_all_registrations(CREDENTIAL).await.unwrap(), vec![url.clone()]);

        assert!(reg.unregister(CREDENTIAL, &url).await.unwrap());
        assert!(!reg.has_registration(CREDENTIAL, &url).await.unwrap());
        assert!(reg.get_all_registrations(CREDENTIAL).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registrations_are_written_as_cookies() {
        let jar: CookieJarHandle = DefaultCookieJar::new().into();
        let reg = registry(factory_with(jar.clone()), "https://issuer.example");
        reg.register(CREDENTIAL, "/handler").await.unwrap();

        let jar = jar.read().unwrap();
        let flag = jar
            .get_cookie("_lf_webRequestHandler_credentialHandler_https://issuer.example_registration__https://issuer.example/handler")
            .unwrap();
        assert_eq!(flag.value, "true");

        let index = jar
            .get_cookie("_lf_webRequestHandler_credentialHandler_origin__https://issuer.example")
            .unwrap();
        let config: StoreConfig = serde_json::from_str(&index.value).unwrap();
        assert_eq!(config.name, "webRequestHandler_credentialHandler_https://issuer.example_registration");
        assert_eq!(config.driver.as_deref(), Some("cookie"));
    }

    #[tokio::test]
    async fn register_is_idempotent_and_normalizes() {
        let reg = registry(factory_with(DefaultCookieJar::new().into()), "https://issuer.example");
        let mut rx = reg.subscribe();

        let a = reg.register(CREDENTIAL, "https://issuer.example/h?x=1").await.unwrap();
        let b = reg.register(CREDENTIAL, "/h#frag").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.get_all_registrations(CREDENTIAL).await.unwrap(), vec![a.clone()]);

        // only the first call publishes
        assert_eq!(
            rx.try_recv().unwrap(),
            RegistryEvent::Registered { request_type: CREDENTIAL.into(), registration: a }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn foreign_urls_are_rejected() {
        let reg = registry(factory_with(DefaultCookieJar::new().into()), "https://issuer.example");
        let err = reg.register(CREDENTIAL, "https://evil.example/h").await.unwrap_err();
        assert!(matches!(err, MediatorError::InvalidUrl { .. }));
        assert!(matches!(
            reg.register("", "/h").await.unwrap_err(),
            MediatorError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn unregister_of_unknown_url_does_not_notify() {
        let reg = registry(factory_with(DefaultCookieJar::new().into()), "https://issuer.example");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        reg.add_unregister_listener(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!reg.unregister(CREDENTIAL, "/nothing").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listeners_run_before_removal() {
        let reg = registry(factory_with(DefaultCookieJar::new().into()), "https://issuer.example");
        let url = reg.register(CREDENTIAL, "/h").await.unwrap();

        let cleaned = Arc::new(AtomicUsize::new(0));
        let done = cleaned.clone();
        reg.add_unregister_listener(move |ev| {
            assert_eq!(ev.event_type(), "unregister");
            assert_eq!(ev.registration, "https://issuer.example/h");
            let done = done.clone();
            ev.wait_until(async move {
                done.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            })
            .unwrap();
        });

        let mut rx = reg.subscribe();
        assert!(reg.unregister(CREDENTIAL, &url).await.unwrap());
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::Unregistered { request_type: CREDENTIAL.into(), registration: url }
        );
    }

    #[tokio::test]
    async fn failed_cleanup_keeps_registration() {
        let reg = registry(factory_with(DefaultCookieJar::new().into()), "https://issuer.example");
        let url = reg.register(CREDENTIAL, "/h").await.unwrap();
        reg.add_unregister_listener(|ev| {
            ev.wait_until(async { Err::<(), _>(anyhow::anyhow!("wallet still busy")) }).unwrap();
        });

        let err = reg.unregister(CREDENTIAL, &url).await.unwrap_err();
        assert!(matches!(err, MediatorError::Unregister(_)));
        assert!(reg.has_registration(CREDENTIAL, &url).await.unwrap());
    }

    #[tokio::test]
    async fn second_wait_until_is_invalid_state() {
        let reg = registry(factory_with(DefaultCookieJar::new().into()), "https://issuer.example");
        let url = reg.register(CREDENTIAL, "/h").await.unwrap();

        let rejected = Arc::new(AtomicUsize::new(0));
        let count = rejected.clone();
        reg.add_unregister_listener(|ev| ev.wait_until(async { anyhow::Ok(()) }).unwrap());
        reg.add_unregister_listener(move |ev| {
            if let Err(MediatorError::InvalidState(_)) = ev.wait_until(async { anyhow::Ok(()) }) {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(reg.unregister(CREDENTIAL, &url).await.unwrap());
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_registrations_span_origins() {
        let factory = factory_with(DefaultCookieJar::new().into());
        let issuer = registry(factory.clone(), "https://issuer.example");
        let wallet = registry(factory.clone(), "https://wallet.example");

        issuer.register(CREDENTIAL, "/a").await.unwrap();
        issuer.register(CREDENTIAL, "/b").await.unwrap();
        wallet.register(CREDENTIAL, "/w").await.unwrap();
        wallet.register("paymentHandler", "/pay").await.unwrap();

        let mut all = issuer.get_all_registrations(CREDENTIAL).await.unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![
                "https://issuer.example/a".to_string(),
                "https://issuer.example/b".to_string(),
                "https://wallet.example/w".to_string(),
            ]
        );
        assert_eq!(
            issuer.get_all_registrations("paymentHandler").await.unwrap(),
            vec!["https://wallet.example/pay".to_string()]
        );

        // only the origin's own registrations can be removed
        assert!(!issuer.unregister(CREDENTIAL, "/w").await.unwrap());
        assert!(wallet.has_registration(CREDENTIAL, "/w").await.unwrap());
    }

    #[tokio::test]
    async fn origin_index_holds_reopenable_config() {
        let factory = factory_with(DefaultCookieJar::new().into());
        let reg = registry(factory.clone(), "https://issuer.example");
        reg.register(CREDENTIAL, "/a").await.unwrap();

        let index = factory
            .create_instance(StoreConfig::new(HandlerRegistry::origin_index_name(CREDENTIAL)))
            .await
            .unwrap();
        assert_eq!(index.keys().await.unwrap(), vec!["https://issuer.example".to_string()]);

        let config: StoreConfig = index.get_json("https://issuer.example").await.unwrap().unwrap();
        assert_eq!(config.name, reg.handler_store_name(CREDENTIAL));
        let handlers = factory.create_instance(config).await.unwrap();
        assert_eq!(handlers.get("https://issuer.example/a").await.unwrap(), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn one_bad_origin_fails_the_whole_enumeration() {
        let factory = factory_with(DefaultCookieJar::new().into());
        let reg = registry(factory.clone(), "https://issuer.example");
        reg.register(CREDENTIAL, "/a").await.unwrap();

        let index = factory
            .create_instance(StoreConfig::new(HandlerRegistry::origin_index_name(CREDENTIAL)))
            .await
            .unwrap();
        index
            .set("https://broken.example", Value::String("not a store config".into()))
            .await
            .unwrap();

        let err = reg.get_all_registrations(CREDENTIAL).await.unwrap_err();
        let MediatorError::Storage(inner) = &err else {
            panic!("expected a storage error, got {err:?}");
        };
        assert!(matches!(
            StorageError::from_anyhow(inner),
            Some(StorageError::Malformed { key, .. }) if key == "https://broken.example"
        ));
    }

    #[tokio::test]
    async fn memory_driver_is_used_when_named() {
        let jar: CookieJarHandle = DefaultCookieJar::new().into();
        let reg = registry(factory_with(jar.clone()), "https://issuer.example").with_driver(InMemoryDriver::NAME);
        let url = reg.register(CREDENTIAL, "/h").await.unwrap();

        assert!(jar.read().unwrap().cookies().is_empty());
        assert_eq!(reg.get_all_registrations(CREDENTIAL).await.unwrap(), vec![url]);
    }

    #[tokio::test]
    async fn blocked_cookies_fail_registration() {
        let reg = registry(factory_with(DefaultCookieJar::blocked().into()), "https://issuer.example");
        let err = reg.register(CREDENTIAL, "/h").await.unwrap_err();
        assert!(err.is_storage_unavailable());
    }

    #[test]
    fn opaque_origin_is_rejected() {
        let factory = factory_with(DefaultCookieJar::new().into());
        let opaque = origin("data:text/plain,hi");
        assert!(matches!(
            HandlerRegistry::new(&opaque, factory),
            Err(MediatorError::Validation(_))
        ));
    }
}
