use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use url::Url;

/// A URL together with the depth it was discovered at. The seed is depth 1.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageReference {
    pub url: Url,
    pub depth: usize,
}

impl PageReference {
    pub fn new(url: Url, depth: usize) -> Self {
        Self { url, depth }
    }

    /// A link found on this page.
    pub fn child(&self, url: Url) -> Self {
        Self::new(url, self.depth + 1)
    }
}

type AtomicMap = Arc<RwLock<HashMap<Url, usize>>>;

/// Every URL claimed for crawling, each with the depth it was first
/// admitted at. Cloning shares the same underlying set.
#[derive(Debug, Clone)]
pub struct Frontier {
    max_depth: usize,
    visited: AtomicMap,
}

impl Frontier {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            visited: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Claims `page` for crawling. Returns `true` for exactly one caller per
    /// URL, and only if the depth is within the ceiling. A `false` leaves the
    /// set untouched.
    pub async fn try_admit(&self, page: &PageReference) -> bool {
        if page.depth > self.max_depth {
            return false;
        }
        let mut visited = self.visited.write().await;
        if visited.contains_key(&page.url) {
            return false;
        }
        visited.insert(page.url.clone(), page.depth);
        true
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.visited.read().await.len()
    }

    /// Admitted URLs and their depths, ordered by depth then URL. Only
    /// meaningful once no worker can admit anything else.
    pub async fn snapshot(&self) -> Vec<PageReference> {
        let mut pages: Vec<_> = self
            .visited
            .read()
            .await
            .iter()
            .map(|(url, depth)| PageReference::new(url.clone(), *depth))
            .collect();
        pages.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
        pages
    }
}
