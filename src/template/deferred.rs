//! Deferred queue
//!
//! Tags whose convention is `deferred` are not expanded in place. Their call
//! is queued instead and replayed once the whole document has been rendered,
//! each entry receiving the output accumulated so far and returning its
//! replacement.
//!
//! Slots are reserved when a deferred tag is encountered and filled once its
//! parameter and body are ready, so replay follows source order even when a
//! deferred tag sits inside the body of another one.

use crate::template::convention::Convention;
use crate::template::engine::TagCall;
use crate::template::registry::Handler;
use std::fmt;
use std::rc::Rc;

/// A queued handler call.
#[derive(Clone)]
pub struct DeferredEntry {
    pub handler: Rc<dyn Handler>,
    pub call: TagCall,
    pub convention: Convention,
}

impl fmt::Debug for DeferredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredEntry")
            .field("call", &self.call)
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    slots: Vec<Option<DeferredEntry>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next slot in encounter order.
    pub fn reserve(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }

    pub fn fill(&mut self, slot: usize, entry: DeferredEntry) {
        if let Some(target) = self.slots.get_mut(slot) {
            *target = Some(entry);
        }
    }

    /// Number of filled entries
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Remove and return all filled entries in slot order. Slots reserved by
    /// invocations that failed before filling them are skipped.
    pub fn drain(&mut self) -> Vec<DeferredEntry> {
        self.slots.drain(..).flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::engine::Engine;
    use crate::template::error::TemplateResult;

    fn entry(name: &str) -> DeferredEntry {
        let handler: Rc<dyn Handler> =
            Rc::new(|_: &mut Engine, _: &TagCall| -> TemplateResult<String> { Ok(String::new()) });
        DeferredEntry {
            handler,
            call: TagCall::new(name),
            convention: Convention::new().postprocess(),
        }
    }

    #[test]
    fn test_drain_follows_reservation_order() {
        let mut queue = DeferredQueue::new();
        let outer = queue.reserve();
        let inner = queue.reserve();
        // the inner tag finishes first
        queue.fill(inner, entry("inner"));
        queue.fill(outer, entry("outer"));

        let names: Vec<String> = queue.drain().into_iter().map(|e| e.call.name).collect();
        assert_eq!(names, vec!["outer", "inner"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unfilled_slots_are_skipped() {
        let mut queue = DeferredQueue::new();
        queue.reserve();
        let slot = queue.reserve();
        queue.fill(slot, entry("only"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain().len(), 1);
    }
}
