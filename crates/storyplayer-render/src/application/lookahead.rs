//! Lookahead cache of renderers for neighbouring narrative elements.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::renderer::Renderer;

/// Renderers prepared ahead of navigation, keyed by narrative element id.
///
/// Owned and mutated only by the render manager. An entry may be the same
/// instance as the current renderer.
#[derive(Debug, Default)]
pub struct LookaheadCache {
    entries: BTreeMap<Uuid, Arc<Renderer>>,
}

impl LookaheadCache {
    /// Renderer cached for an element.
    #[must_use]
    pub fn get(&self, narrative_element_id: Uuid) -> Option<&Arc<Renderer>> {
        self.entries.get(&narrative_element_id)
    }

    /// Caches a renderer, returning the one it displaces.
    pub fn insert(
        &mut self,
        narrative_element_id: Uuid,
        renderer: Arc<Renderer>,
    ) -> Option<Arc<Renderer>> {
        self.entries.insert(narrative_element_id, renderer)
    }

    /// Evicts an entry.
    pub fn remove(&mut self, narrative_element_id: Uuid) -> Option<Arc<Renderer>> {
        self.entries.remove(&narrative_element_id)
    }

    /// Cached element ids, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<Uuid> {
        self.entries.keys().copied().collect()
    }

    /// Whether `renderer` is cached under any id.
    #[must_use]
    pub fn holds(&self, renderer: &Arc<Renderer>) -> bool {
        self.entries
            .values()
            .any(|cached| Arc::ptr_eq(cached, renderer))
    }

    /// Cached entries.
    pub fn iter(&self) -> impl Iterator<Item = (Uuid, &Arc<Renderer>)> {
        self.entries.iter().map(|(id, renderer)| (*id, renderer))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the cache, returning every renderer it held.
    pub fn drain(&mut self) -> Vec<Arc<Renderer>> {
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

/// What reconciliation does with one required id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// The cached renderer still fits.
    Keep,
    /// Nothing cached; build one.
    Build,
    /// The cached renderer no longer fits; destroy and rebuild.
    Rebuild,
}

/// Decides whether a cached renderer still fits the representation the
/// reasoner now picks. A VR-viewable renderer built for the other viewing
/// mode does not fit.
#[must_use]
pub fn decide(cached: Option<&Arc<Renderer>>, representation_id: Uuid, in_vr: bool) -> CacheDecision {
    match cached {
        None => CacheDecision::Build,
        Some(renderer)
            if renderer.representation().id != representation_id
                || (renderer.is_vr_viewable() && renderer.built_in_vr() != in_vr) =>
        {
            CacheDecision::Rebuild
        }
        Some(_) => CacheDecision::Keep,
    }
}

/// Required cache membership: the next ids followed by the previous id,
/// without duplicates.
#[must_use]
pub fn required_ids(previous: Option<Uuid>, next: &[Uuid]) -> Vec<Uuid> {
    let mut required = Vec::with_capacity(next.len() + 1);
    for id in next.iter().copied().chain(previous) {
        if !required.contains(&id) {
            required.push(id);
        }
    }
    required
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_ids_unions_next_and_previous() {
        // Arrange
        let previous = Uuid::new_v4();
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();

        // Act
        let required = required_ids(Some(previous), &[left, right, left]);

        // Assert
        assert_eq!(required, vec![left, right, previous]);
    }

    #[test]
    fn test_required_ids_without_previous() {
        let next = Uuid::new_v4();

        assert_eq!(required_ids(None, &[next]), vec![next]);
        assert!(required_ids(None, &[]).is_empty());
    }

    #[test]
    fn test_previous_that_is_also_next_appears_once() {
        let loop_back = Uuid::new_v4();

        assert_eq!(required_ids(Some(loop_back), &[loop_back]), vec![loop_back]);
    }

    #[test]
    fn test_nothing_cached_means_build() {
        assert_eq!(decide(None, Uuid::new_v4(), false), CacheDecision::Build);
    }
}
