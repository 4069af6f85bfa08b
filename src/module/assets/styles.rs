//! Style resource reference counting
//!
//! Several modules may reference the same stylesheet. The node is attached on
//! the first reference (0 -> 1) and detached when the last reference is dropped
//! (1 -> 0). Each batch is decided under one synchronous lock; the lock is never
//! held across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A style locator whose last reference was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRelease {
    /// Locator to detach
    pub url: String,
    /// Module tag the node was attached under
    pub owner: String,
}

#[derive(Debug)]
struct StyleRef {
    count: usize,
    owner: String,
}

/// Reference counts for shared style resources, keyed by locator
#[derive(Debug, Default)]
pub struct StyleRefCounter {
    refs: Mutex<HashMap<String, StyleRef>>,
}

impl StyleRefCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on each locator on behalf of `module`.
    ///
    /// Returns only the locators that were not referenced before and therefore
    /// need a real attach.
    pub fn acquire(&self, module: &str, urls: &[String]) -> Vec<String> {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        urls.iter()
            .filter(|url| match refs.get_mut(url.as_str()) {
                Some(entry) => {
                    entry.count += 1;
                    debug!("Style {} shared by {} (refs: {})", url, module, entry.count);
                    false
                }
                None => {
                    refs.insert(
                        (*url).clone(),
                        StyleRef {
                            count: 1,
                            owner: module.to_string(),
                        },
                    );
                    true
                }
            })
            .cloned()
            .collect()
    }

    /// Drop a reference on each locator on behalf of `module`.
    ///
    /// Returns only the locators whose count reached zero and therefore need a
    /// real detach. Unknown locators are released under `module`'s own tag.
    pub fn release(&self, module: &str, urls: &[String]) -> Vec<StyleRelease> {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut released = Vec::new();
        for url in urls {
            match refs.get_mut(url.as_str()) {
                Some(entry) if entry.count > 1 => {
                    entry.count -= 1;
                    debug!("Style {} still referenced (refs: {})", url, entry.count);
                }
                Some(_) => {
                    if let Some(entry) = refs.remove(url.as_str()) {
                        released.push(StyleRelease {
                            url: url.clone(),
                            owner: entry.owner,
                        });
                    }
                }
                None => {
                    released.push(StyleRelease {
                        url: url.clone(),
                        owner: module.to_string(),
                    });
                }
            }
        }
        released
    }

    /// Current reference count (0 when absent)
    pub fn count(&self, url: &str) -> usize {
        self.refs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }

    /// Number of locators currently referenced
    pub fn len(&self) -> usize {
        self.refs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every reference
    pub fn clear(&self) {
        self.refs.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_acquire_attaches() {
        let counter = StyleRefCounter::new();
        assert_eq!(counter.acquire("a", &urls(&["a.css", "b.css"])), urls(&["a.css", "b.css"]));
        assert_eq!(counter.count("a.css"), 1);
    }

    #[test]
    fn test_shared_style_attached_once() {
        let counter = StyleRefCounter::new();
        assert_eq!(counter.acquire("c1", &urls(&["shared.css"])).len(), 1);
        assert!(counter.acquire("c2", &urls(&["shared.css"])).is_empty());
        assert_eq!(counter.count("shared.css"), 2);
    }

    #[test]
    fn test_release_detaches_on_last_reference() {
        let counter = StyleRefCounter::new();
        counter.acquire("c1", &urls(&["shared.css"]));
        counter.acquire("c2", &urls(&["shared.css"]));

        assert!(counter.release("c1", &urls(&["shared.css"])).is_empty());
        assert_eq!(counter.count("shared.css"), 1);

        let released = counter.release("c2", &urls(&["shared.css"]));
        assert_eq!(
            released,
            vec![StyleRelease {
                url: "shared.css".into(),
                owner: "c1".into()
            }]
        );
        assert!(counter.is_empty());
    }

    #[test]
    fn test_release_unknown_locator() {
        let counter = StyleRefCounter::new();
        let released = counter.release("g", &urls(&["ghost.css"]));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].owner, "g");
        assert!(counter.is_empty());
    }
}
