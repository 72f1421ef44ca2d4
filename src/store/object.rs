use super::{ArtifactStore, ListPage, ObjectSummary, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::path::{Path, PathPart};
use object_store::ObjectStore;
use std::borrow::Cow;
use std::sync::Arc;

/// Adapter from [`ArtifactStore`] onto an `object_store` backend (S3 or in-memory).
///
/// `object_store` percent-encodes each path segment (non-ASCII, `%`, `#`,
/// `~` and friends), so keys are stored in encoded form and decoded back on
/// listing. Callers only ever see the raw key they passed to `put`.
///
/// `object_store` prefixes are path-segment based, so string prefixes are
/// matched here over the encoded listing. Relies on the backend listing keys
/// in lexicographic order, which S3 and `InMemory` both do.
pub struct ObjectStoreBackend {
    inner: Arc<dyn ObjectStore>,
    page_size: usize,
}

impl ObjectStoreBackend {
    pub fn new(inner: Arc<dyn ObjectStore>, page_size: usize) -> Self {
        Self {
            inner,
            page_size: page_size.max(1),
        }
    }
}

/// `prefix` as it appears at the start of an encoded location.
fn encoded_prefix(prefix: &str) -> String {
    prefix
        .split(object_store::path::DELIMITER)
        .map(|segment| {
            let part = PathPart::from(segment);
            let encoded: &str = part.as_ref();
            encoded.to_string()
        })
        .collect::<Vec<_>>()
        .join(object_store::path::DELIMITER)
}

/// Where a first page starts listing: a location sorting strictly before
/// every key under `prefix`, so the backend skips the rest of the bucket.
fn seek_offset(prefix: &str) -> Option<Path> {
    let mut shorter = prefix.chars();
    shorter.next_back()?;
    let shorter = shorter.as_str();
    if shorter.is_empty() {
        return None;
    }
    let offset = Path::from(shorter);
    // Only seek when the offset is a proper prefix of the encoded range.
    let encoded = encoded_prefix(prefix);
    let below: &str = offset.as_ref();
    let proper = encoded.starts_with(below) && encoded.len() > below.len();
    proper.then_some(offset)
}

/// Raw key for a listed location, undoing the per-segment encoding.
fn raw_key(location: &Path) -> Result<String, StoreError> {
    let segments = location
        .parts()
        .map(|part| urlencoding::decode(part.as_ref()).map(Cow::into_owned))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Unavailable(format!("undecodable key {}: {}", location, e)))?;
    Ok(segments.join(object_store::path::DELIMITER))
}

#[async_trait]
impl ArtifactStore for ObjectStoreBackend {
    async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        self.inner.put(&Path::from(key), payload.into()).await?;
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let offset = match token {
            Some(after) => Some(Path::from(after)),
            None => seek_offset(prefix),
        };
        let mut listing = match &offset {
            Some(after) => self.inner.list_with_offset(None, after),
            None => self.inner.list(None),
        };

        let prefix = encoded_prefix(prefix);
        let mut items = Vec::new();
        let mut more = false;
        while let Some(meta) = listing.next().await {
            let meta = meta?;
            let location: &str = meta.location.as_ref();
            if !location.starts_with(prefix.as_str()) {
                if location > prefix.as_str() {
                    // Past the prefix range.
                    break;
                }
                continue;
            }
            if items.len() == self.page_size {
                more = true;
                break;
            }
            items.push(ObjectSummary {
                key: raw_key(&meta.location)?,
                last_modified: meta.last_modified,
            });
        }

        let next_token = if more {
            items.last().map(|item| item.key.clone())
        } else {
            None
        };
        Ok(ListPage { items, next_token })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let result = match self.inner.get(&Path::from(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(result.bytes().await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.inner.delete(&Path::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::artifact_key;
    use crate::cache::{CacheResolver, FreshnessPolicy, Sweeper};
    use crate::clock::ManualClock;
    use crate::store::scan;
    use chrono::Utc;
    use object_store::memory::InMemory;

    fn backend(page_size: usize) -> ObjectStoreBackend {
        ObjectStoreBackend::new(Arc::new(InMemory::new()), page_size)
    }

    #[tokio::test]
    async fn test_round_trip_bytes() {
        let store = backend(10);
        let body = Bytes::from_static(br#"{"name":"Cairo","main":{"temp":301.2}}"#);

        store.put("Cairo_1700000000000-aa", body.clone()).await.unwrap();
        let fetched = store.get("Cairo_1700000000000-aa").await.unwrap();

        assert_eq!(fetched, body);
    }

    #[tokio::test]
    async fn test_prefix_is_a_string_prefix() {
        let store = backend(10);
        for key in ["rome_1", "rome_2", "romeo_1", "sofia_1"] {
            store.put(key, Bytes::from_static(b"{}")).await.unwrap();
        }

        let page = store.list_page("rome_", None).await.unwrap();
        let keys: Vec<_> = page.items.into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec!["rome_1", "rome_2"]);
    }

    #[tokio::test]
    async fn test_pages_resume_from_token() {
        let store = backend(2);
        for i in 0..7 {
            store
                .put(&format!("kyiv_{}", i), Bytes::from_static(b"{}"))
                .await
                .unwrap();
        }
        store.put("zagreb_1", Bytes::from_static(b"{}")).await.unwrap();

        let first = store.list_page("kyiv_", None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.next_token.is_some());

        let mut keys = Vec::new();
        let seen = scan(&store, "kyiv_", |item| keys.push(item.key)).await.unwrap();
        assert_eq!(seen, 7);
        assert_eq!(keys.first().map(String::as_str), Some("kyiv_0"));
        assert_eq!(keys.last().map(String::as_str), Some("kyiv_6"));
    }

    #[tokio::test]
    async fn test_missing_get_and_delete() {
        let store = backend(10);

        assert!(store.get("ghost_1").await.unwrap_err().is_not_found());
        store.delete("ghost_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_encoded_keys_list_as_written() {
        let store = backend(10);
        for key in ["Zürich_1", "São Paulo_1", "a#b~c|d%e_1"] {
            store.put(key, Bytes::from_static(b"{}")).await.unwrap();
        }

        let zurich = store.list_page("Zürich_", None).await.unwrap();
        let keys: Vec<_> = zurich.items.into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec!["Zürich_1"]);

        let mut all = Vec::new();
        scan(&store, "", |item| all.push(item.key)).await.unwrap();
        all.sort();
        assert_eq!(all, vec!["São Paulo_1", "Zürich_1", "a#b~c|d%e_1"]);
        for key in &all {
            store.get(key).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_non_ascii_city_is_found_then_evicted() {
        let inner = Arc::new(InMemory::new());
        let store = Arc::new(ObjectStoreBackend::new(inner.clone(), 10));
        let key = artifact_key("Zürich", Utc::now());
        store
            .put(&key, Bytes::from_static(r#"{"name":"Zürich"}"#.as_bytes()))
            .await
            .unwrap();

        let resolver = CacheResolver::new(store.clone());
        let latest = resolver.find_latest("Zürich").await.unwrap().unwrap();
        assert_eq!(latest.key, key);
        let artifact = resolver.read_latest("Zürich").await.unwrap().unwrap();
        assert_eq!(&artifact.payload[..], r#"{"name":"Zürich"}"#.as_bytes());

        let later = Arc::new(ManualClock::new(Utc::now() + chrono::Duration::minutes(10)));
        let report = Sweeper::new(store.clone(), FreshnessPolicy::default(), later)
            .sweep()
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(inner.list(None).count().await, 0);
        assert!(resolver.find_latest("Zürich").await.unwrap().is_none());
    }

    #[test]
    fn test_seek_offset_sorts_before_prefix() {
        let offset = seek_offset("Zürich_").unwrap();
        let offset: &str = offset.as_ref();
        assert_eq!(offset, "Z%C3%BCrich");
        assert!(encoded_prefix("Zürich_").starts_with(offset));
        assert_eq!(encoded_prefix("Zürich_"), "Z%C3%BCrich_");

        assert!(seek_offset("").is_none());
        assert!(seek_offset("a").is_none());
    }

    #[tokio::test]
    async fn test_first_page_skips_keys_before_prefix() {
        let store = backend(2);
        for i in 0..40 {
            store
                .put(&format!("Aachen_{:02}", i), Bytes::from_static(b"{}"))
                .await
                .unwrap();
        }
        for key in ["Zürich_1", "Zürich_2", "Zürich_3", "zagreb_1"] {
            store.put(key, Bytes::from_static(b"{}")).await.unwrap();
        }

        let first = store.list_page("Zürich_", None).await.unwrap();
        let keys: Vec<_> = first.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["Zürich_1", "Zürich_2"]);
        assert_eq!(first.next_token.as_deref(), Some("Zürich_2"));

        let rest = store
            .list_page("Zürich_", first.next_token.as_deref())
            .await
            .unwrap();
        let keys: Vec<_> = rest.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["Zürich_3"]);
        assert!(rest.next_token.is_none());
    }
}
