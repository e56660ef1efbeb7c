use std::collections::HashMap;

use crate::db::RecordStore;
use crate::error::Result;
use crate::models::Coupon;

/// Posts already collected, keyed by post id. Rebuilt from the store on start
/// and never evicted.
#[derive(Debug, Default)]
pub struct DedupCache {
    posts: HashMap<String, Coupon>,
}

impl DedupCache {
    pub async fn load(store: &dyn RecordStore) -> Result<Self> {
        let posts = store.load_collected().await?;
        tracing::info!(posts = posts.len(), "dedup cache loaded");
        Ok(Self { posts })
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.posts.contains_key(post_id)
    }

    pub fn get(&self, post_id: &str) -> Option<&Coupon> {
        self.posts.get(post_id)
    }

    pub fn insert(&mut self, coupon: Coupon) {
        self.posts.insert(coupon.post_id.clone(), coupon);
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}
