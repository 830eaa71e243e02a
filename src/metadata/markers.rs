//! Lazily populated, per-(class, element kind) marker cache.
//!
//! Each key is reflected at most once; population is serialized per key and the
//! finished map is published in one step. When a [`CacheStore`] is attached the
//! whole structure is saved under one key after every population and seeded from
//! it at construction.

use crate::error::AccessError;
use crate::metadata::CacheStore;
use crate::schema::{ElementKind, EntityRegistry, Marker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// element name -> marker type -> marker
pub type MarkerMap = BTreeMap<String, BTreeMap<String, Marker>>;

type CacheKey = (String, ElementKind);

/// Reads the markers attached to one kind of element of a class.
pub trait MarkerSource: Send + Sync {
    /// `(element name, marker)` pairs; unknown classes fail with `ClassNotFound`.
    fn reflect(&self, class: &str, kind: ElementKind) -> Result<Vec<(String, Marker)>, AccessError>;

    /// The spelling of `class` its markers are cached under.
    fn canonical_name(&self, class: &str) -> String {
        class.to_string()
    }
}

/// Marker source backed by the static entity registry.
#[derive(Debug, Clone)]
pub struct RegistryMarkerSource {
    registry: Arc<EntityRegistry>,
}

impl RegistryMarkerSource {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        RegistryMarkerSource { registry }
    }
}

impl MarkerSource for RegistryMarkerSource {
    fn reflect(&self, class: &str, kind: ElementKind) -> Result<Vec<(String, Marker)>, AccessError> {
        let t = self
            .registry
            .get(class)
            .ok_or_else(|| AccessError::ClassNotFound(class.to_string()))?;
        let out = match kind {
            ElementKind::Class => {
                let mut markers = vec![Marker::Entity {
                    qualified_name: t.qualified_name.clone(),
                }];
                markers.extend(t.class_markers.iter().cloned());
                markers.into_iter().map(|m| (class.to_string(), m)).collect()
            }
            ElementKind::Property => t
                .fields
                .iter()
                .flat_map(|f| {
                    f.declared_markers(t.generator)
                        .into_iter()
                        .map(move |m| (f.name.clone(), m))
                })
                .collect(),
            ElementKind::Method => t
                .methods
                .iter()
                .flat_map(|m| m.markers.iter().map(move |mk| (m.name.clone(), mk.clone())))
                .collect(),
        };
        Ok(out)
    }

    fn canonical_name(&self, class: &str) -> String {
        self.registry
            .get(class)
            .map_or_else(|| class.to_string(), |t| t.qualified_name.clone())
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    class: String,
    kind: ElementKind,
    elements: MarkerMap,
}

pub struct MarkerCache {
    source: Arc<dyn MarkerSource>,
    store: Option<Arc<dyn CacheStore>>,
    cache_key: String,
    entries: RwLock<HashMap<CacheKey, Arc<MarkerMap>>>,
    populating: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    // held from snapshot to save so a stale snapshot never lands last
    saving: Mutex<()>,
}

impl MarkerCache {
    /// Seeds from `store` when it holds a snapshot under `cache_key`. An unreadable
    /// snapshot is logged and ignored.
    pub fn new(
        source: Arc<dyn MarkerSource>,
        store: Option<Arc<dyn CacheStore>>,
        cache_key: impl Into<String>,
    ) -> Self {
        let cache_key = cache_key.into();
        let mut entries = HashMap::new();
        if let Some(store) = &store {
            if store.contains(&cache_key) {
                match Self::read_snapshot(store.as_ref(), &cache_key) {
                    Ok(snapshot) => {
                        tracing::debug!(key = %cache_key, entries = snapshot.len(), "seeded marker cache");
                        for e in snapshot {
                            entries.insert((e.class, e.kind), Arc::new(e.elements));
                        }
                    }
                    Err(e) => tracing::warn!(key = %cache_key, error = %e, "ignoring unreadable marker cache"),
                }
            }
        }
        MarkerCache {
            source,
            store,
            cache_key,
            entries: RwLock::new(entries),
            populating: Mutex::new(HashMap::new()),
            saving: Mutex::new(()),
        }
    }

    /// Cache without a backing store.
    pub fn in_process(source: Arc<dyn MarkerSource>) -> Self {
        Self::new(source, None, crate::settings::DEFAULT_CACHE_KEY)
    }

    fn read_snapshot(store: &dyn CacheStore, key: &str) -> Result<Vec<SnapshotEntry>, AccessError> {
        let Some(blob) = store.fetch(key)? else {
            return Ok(Vec::new());
        };
        serde_json::from_slice(&blob).map_err(|e| AccessError::Cache(e.to_string()))
    }

    fn cached(&self, key: &CacheKey) -> Option<Arc<MarkerMap>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// All markers of one element kind of `class`, reflecting on first access.
    pub fn get_markers(&self, class: &str, kind: ElementKind) -> Result<Arc<MarkerMap>, AccessError> {
        let class = self.source.canonical_name(class);
        let key = (class.clone(), kind);
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let gate = self
            .populating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);

        // another caller may have finished while we waited
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let mut map = MarkerMap::new();
        for (element, marker) in self.source.reflect(&class, kind)? {
            map.entry(element)
                .or_default()
                .insert(marker.type_name().to_string(), marker);
        }
        let map = Arc::new(map);
        tracing::debug!(class = %class, kind = ?kind, elements = map.len(), "reflected markers");

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, map.clone());
        self.persist();
        Ok(map)
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _saving = self.saving.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot: Vec<SnapshotEntry> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let mut out: Vec<SnapshotEntry> = entries
                .iter()
                .map(|((class, kind), elements)| SnapshotEntry {
                    class: class.clone(),
                    kind: *kind,
                    elements: elements.as_ref().clone(),
                })
                .collect();
            out.sort_by(|a, b| (&a.class, a.kind).cmp(&(&b.class, b.kind)));
            out
        };
        let saved = serde_json::to_vec(&snapshot)
            .map_err(|e| AccessError::Cache(e.to_string()))
            .and_then(|blob| store.save(&self.cache_key, &blob));
        if let Err(e) = saved {
            tracing::warn!(key = %self.cache_key, error = %e, "failed to persist marker cache");
        }
    }

    pub fn get_marker(
        &self,
        class: &str,
        kind: ElementKind,
        element: &str,
        marker_type: &str,
    ) -> Result<Option<Marker>, AccessError> {
        let map = self.get_markers(class, kind)?;
        Ok(map.get(element).and_then(|m| m.get(marker_type)).cloned())
    }

    pub fn has_marker(
        &self,
        class: &str,
        kind: ElementKind,
        element: &str,
        marker_type: &str,
    ) -> Result<bool, AccessError> {
        Ok(self.get_marker(class, kind, element, marker_type)?.is_some())
    }

    pub fn get_for_property(&self, class: &str, property: &str, marker_type: &str) -> Result<Option<Marker>, AccessError> {
        let map = self.get_markers(class, ElementKind::Property)?;
        Ok(find_element(&map, property).and_then(|m| m.get(marker_type)).cloned())
    }

    pub fn has_property_marker(&self, class: &str, property: &str, marker_type: &str) -> Result<bool, AccessError> {
        Ok(self.get_for_property(class, property, marker_type)?.is_some())
    }

    /// Every marker on one property, keyed by marker type.
    pub fn property_markers(&self, class: &str, property: &str) -> Result<BTreeMap<String, Marker>, AccessError> {
        let map = self.get_markers(class, ElementKind::Property)?;
        Ok(find_element(&map, property).cloned().unwrap_or_default())
    }

    pub fn get_for_method(&self, class: &str, method: &str, marker_type: &str) -> Result<Option<Marker>, AccessError> {
        let map = self.get_markers(class, ElementKind::Method)?;
        Ok(find_element(&map, method).and_then(|m| m.get(marker_type)).cloned())
    }

    pub fn has_method_marker(&self, class: &str, method: &str, marker_type: &str) -> Result<bool, AccessError> {
        Ok(self.get_for_method(class, method, marker_type)?.is_some())
    }

    pub fn get_for_class(&self, class: &str, marker_type: &str) -> Result<Option<Marker>, AccessError> {
        let class = self.source.canonical_name(class);
        self.get_marker(&class, ElementKind::Class, &class, marker_type)
    }

    /// Populate every element kind of the given classes up front.
    pub fn warm_up<'a, I>(&self, classes: I) -> Result<(), AccessError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for class in classes {
            for kind in [ElementKind::Class, ElementKind::Property, ElementKind::Method] {
                self.get_markers(class, kind)?;
            }
        }
        Ok(())
    }

    /// Drop every in-process entry. The attached store is left as is.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("cleared marker cache");
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MarkerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerCache")
            .field("cache_key", &self.cache_key)
            .field("entries", &self.len())
            .field("store", &self.store.is_some())
            .finish()
    }
}

fn find_element<'m>(map: &'m MarkerMap, name: &str) -> Option<&'m BTreeMap<String, Marker>> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(k, _)| crate::case::same_name(k, name))
            .map(|(_, v)| v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryCacheStore;
    use crate::schema::{resolve, EntityType, FieldDef, FieldType, GeneratorType, MethodDef};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        inner: RegistryMarkerSource,
        calls: AtomicUsize,
    }

    impl MarkerSource for Counting {
        fn reflect(&self, class: &str, kind: ElementKind) -> Result<Vec<(String, Marker)>, AccessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.reflect(class, kind)
        }

        fn canonical_name(&self, class: &str) -> String {
            self.inner.canonical_name(class)
        }
    }

    fn counting() -> Arc<Counting> {
        let registry = resolve(vec![EntityType::new("app::Visit")
            .generator(GeneratorType::Identity)
            .field(FieldDef::new("id", FieldType::Integer).identifier())
            .field(FieldDef::new("group", FieldType::Integer).many_to_one("Visit").nullable())
            .method(MethodDef::new("confirm").marker(Marker::PostArgs {
                args: vec!["visit_id".into()],
            }))])
        .unwrap();
        Arc::new(Counting {
            inner: RegistryMarkerSource::new(Arc::new(registry)),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn reflects_each_key_once() {
        let source = counting();
        let cache = MarkerCache::in_process(source.clone());
        let first = cache.get_markers("app::Visit", ElementKind::Property).unwrap();
        let second = cache.get_markers("app::Visit", ElementKind::Property).unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(cache.has_property_marker("app::Visit", "group", Marker::MANY_TO_ONE).unwrap());
        assert!(cache.has_property_marker("app::Visit", "id", Marker::GENERATED_VALUE).unwrap());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_class_is_an_error() {
        let cache = MarkerCache::in_process(counting());
        let err = cache.get_markers("app::Nope", ElementKind::Class).unwrap_err();
        assert!(matches!(err, AccessError::ClassNotFound(c) if c == "app::Nope"));
    }

    #[test]
    fn class_and_method_markers() {
        let cache = MarkerCache::in_process(counting());
        assert!(cache.get_for_class("app::Visit", Marker::ENTITY).unwrap().is_some());
        let args = cache.get_for_method("app::Visit", "confirm", Marker::POST_ARGS).unwrap();
        assert_eq!(
            args,
            Some(Marker::PostArgs {
                args: vec!["visit_id".into()]
            })
        );
        assert!(!cache.has_method_marker("app::Visit", "cancel", Marker::POST_ARGS).unwrap());
    }

    #[test]
    fn store_seeds_a_fresh_cache() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let first = counting();
        let cache = MarkerCache::new(first.clone(), Some(store.clone()), "annotations");
        cache.warm_up(["app::Visit"]).unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 3);
        assert!(store.contains("annotations"));

        let second = counting();
        let seeded = MarkerCache::new(second.clone(), Some(store), "annotations");
        assert_eq!(seeded.len(), 3);
        assert!(seeded.has_property_marker("app::Visit", "group", Marker::MANY_TO_ONE).unwrap());
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_forces_reflection_again() {
        let source = counting();
        let cache = MarkerCache::in_process(source.clone());
        cache.get_markers("app::Visit", ElementKind::Class).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.get_markers("app::Visit", ElementKind::Class).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn short_and_qualified_names_share_an_entry() {
        let source = counting();
        let cache = MarkerCache::in_process(source.clone());
        let short = cache.get_markers("Visit", ElementKind::Property).unwrap();
        let qualified = cache.get_markers("app::Visit", ElementKind::Property).unwrap();
        assert!(Arc::ptr_eq(&short, &qualified));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get_for_class("Visit", Marker::ENTITY).unwrap(),
            Some(Marker::Entity {
                qualified_name: "app::Visit".into()
            })
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_saves_keep_every_entry() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let registry = resolve(
            (0..6)
                .map(|i| {
                    EntityType::new(format!("app::Kind{i}"))
                        .field(FieldDef::new("id", FieldType::Integer).identifier())
                })
                .collect(),
        )
        .unwrap();
        let source = Arc::new(RegistryMarkerSource::new(Arc::new(registry)));
        let cache = MarkerCache::new(source.clone(), Some(store.clone()), "annotations");
        std::thread::scope(|s| {
            for i in 0..6 {
                let cache = &cache;
                s.spawn(move || {
                    let class = format!("app::Kind{i}");
                    cache.get_markers(&class, ElementKind::Property).unwrap();
                });
            }
        });

        let reopened = MarkerCache::new(source, Some(store), "annotations");
        assert_eq!(reopened.len(), 6);
    }
}
