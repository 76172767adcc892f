//! Cache read-through for forms.
//!
//! Reads `form:<id>` from the cache and falls back to persistence on a miss,
//! an undecodable entry or a cache error. Whatever persistence returns is
//! written back to the cache; a failing write-back is only logged.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::CacheGateway;
use crate::models::{Form, FormId};
use crate::persistence::{FormRepository, PersistenceResult};

#[derive(Clone)]
pub struct FormReader {
    repository: Arc<dyn FormRepository>,
    cache: Arc<dyn CacheGateway>,
}

impl FormReader {
    pub fn new(repository: Arc<dyn FormRepository>, cache: Arc<dyn CacheGateway>) -> Self {
        Self { repository, cache }
    }

    pub async fn get_form(&self, id: &FormId) -> PersistenceResult<Form> {
        let key = id.cache_key();

        match self.cache.read(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Form>(&bytes) {
                Ok(form) => {
                    debug!(form_id = %id, "Form served from cache");
                    return Ok(form);
                }
                Err(e) => warn!(form_id = %id, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(form_id = %id, "Form cache miss"),
            Err(e) => warn!(form_id = %id, error = %e, "Cache read failed, falling back to persistence"),
        }

        let form = self.repository.get(id).await?;

        match serde_json::to_vec(&form) {
            Ok(bytes) => {
                if let Err(e) = self.cache.write(&key, &bytes).await {
                    warn!(form_id = %id, error = %e, "Cache repopulation failed");
                }
            }
            Err(e) => warn!(form_id = %id, error = %e, "Form could not be serialized for cache"),
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::persistence::InMemoryFormRepository;

    #[tokio::test]
    async fn test_miss_falls_back_and_repopulates() {
        let repo = InMemoryFormRepository::new();
        let cache = InMemoryCache::new();
        let form = Form::new("T", "D", "A");
        repo.create_form(&form).await.unwrap();

        let reader = FormReader::new(Arc::new(repo.clone()), Arc::new(cache.clone()));
        let loaded = reader.get_form(&form.id).await.unwrap();
        assert_eq!(loaded.id, form.id);
        assert!(cache.contains_key(&form.cache_key()));

        repo.delete_form(&form.id).await.unwrap();
        let from_cache = reader.get_form(&form.id).await.unwrap();
        assert_eq!(from_cache.title, "T");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_replaced() {
        let repo = InMemoryFormRepository::new();
        let cache = InMemoryCache::new();
        let form = Form::new("T", "D", "A");
        repo.create_form(&form).await.unwrap();
        cache.write(&form.cache_key(), b"not json").await.unwrap();

        let reader = FormReader::new(Arc::new(repo), Arc::new(cache.clone()));
        assert_eq!(reader.get_form(&form.id).await.unwrap().id, form.id);

        let bytes = cache.read(&form.cache_key()).await.unwrap().unwrap();
        assert!(serde_json::from_slice::<Form>(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_not_found() {
        let reader = FormReader::new(
            Arc::new(InMemoryFormRepository::new()),
            Arc::new(InMemoryCache::new()),
        );
        assert!(reader.get_form(&FormId::new("nope")).await.unwrap_err().is_not_found());
    }
}
