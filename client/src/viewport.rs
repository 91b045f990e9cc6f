//! Viewport allocation for the multi-monitor layout.
//!
//! A fixed number of slots share one pool of streams. A stream id is held by
//! at most one slot at a time; the reverse index makes that check O(1) and is
//! kept in lock-step with the slots by every mutation.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error};

use feedwatch_common::protocol::{Stream, StreamId};

use crate::error::AllocationError;

/// Index of a viewport slot, `0..count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewportId(pub usize);

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct ViewportAllocator {
    slots: Vec<Option<StreamId>>,
    held_by: HashMap<StreamId, ViewportId>,
}

impl ViewportAllocator {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![None; count],
            held_by: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ViewportId> {
        (0..self.slots.len()).map(ViewportId)
    }

    /// Stream currently shown by `viewport`, if any.
    pub fn assigned(&self, viewport: ViewportId) -> Option<&StreamId> {
        self.slots.get(viewport.0).and_then(|s| s.as_ref())
    }

    /// Viewport currently holding `stream`, if any.
    pub fn holder(&self, stream: &StreamId) -> Option<ViewportId> {
        self.held_by.get(stream).copied()
    }

    /// Streams not assigned to any viewport, in directory order.
    pub fn list_available<'a>(&self, streams: &'a [Stream]) -> Vec<&'a Stream> {
        streams
            .iter()
            .filter(|s| !self.held_by.contains_key(&s.id))
            .collect()
    }

    /// First empty viewport, lowest index first.
    pub fn first_empty(&self) -> Option<ViewportId> {
        self.slots.iter().position(Option::is_none).map(ViewportId)
    }

    /// Bind `stream` to `viewport`.
    ///
    /// A stream held elsewhere is an invariant violation: the picker only
    /// offers available streams. It is logged and rejected, leaving the
    /// target viewport untouched.
    pub fn assign(&mut self, viewport: ViewportId, stream: StreamId) -> Result<(), AllocationError> {
        let slot = self
            .slots
            .get(viewport.0)
            .ok_or(AllocationError::UnknownViewport(viewport))?;

        if let Some(&held_by) = self.held_by.get(&stream) {
            error!("Allocation conflict: stream {stream} already in viewport {held_by}, refused for {viewport}");
            return Err(AllocationError::Conflict { stream, held_by });
        }
        if let Some(current) = slot {
            return Err(AllocationError::Occupied {
                viewport,
                stream: current.clone(),
            });
        }

        debug!("Viewport {viewport} ← stream {stream}");
        self.held_by.insert(stream.clone(), viewport);
        self.slots[viewport.0] = Some(stream);
        Ok(())
    }

    /// Empty `viewport`, returning the stream it held to the pool.
    pub fn release(&mut self, viewport: ViewportId) -> Result<Option<StreamId>, AllocationError> {
        let slot = self
            .slots
            .get_mut(viewport.0)
            .ok_or(AllocationError::UnknownViewport(viewport))?;

        let released = slot.take();
        if let Some(stream) = &released {
            self.held_by.remove(stream);
            debug!("Viewport {viewport} released stream {stream}");
        }
        Ok(released)
    }

    /// Empty every viewport.
    pub fn clear(&mut self) -> Vec<(ViewportId, StreamId)> {
        self.held_by.clear();
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.take().map(|s| (ViewportId(i), s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::stream;

    fn directory() -> Vec<Stream> {
        vec![
            stream("1", "a.mp4"),
            stream("2", "rtsp://cam/2"),
            stream("3", "b.m3u8"),
        ]
    }

    fn ids(streams: &[&Stream]) -> Vec<String> {
        streams.iter().map(|s| s.id.to_string()).collect()
    }

    /// No stream id appears in two slots.
    fn assert_exclusive(alloc: &ViewportAllocator) {
        let mut seen = std::collections::HashSet::new();
        for v in alloc.ids() {
            if let Some(s) = alloc.assigned(v) {
                assert!(seen.insert(s.clone()), "stream {s} in two viewports");
                assert_eq!(alloc.holder(s), Some(v));
            }
        }
        assert_eq!(seen.len(), alloc.held_by.len());
    }

    #[test]
    fn test_assign_removes_from_every_picker() {
        let streams = directory();
        let mut alloc = ViewportAllocator::new(4);
        assert_eq!(ids(&alloc.list_available(&streams)), ["1", "2", "3"]);

        alloc.assign(ViewportId(0), StreamId::from("2")).unwrap();
        assert_eq!(ids(&alloc.list_available(&streams)), ["1", "3"]);
        assert_eq!(alloc.assigned(ViewportId(0)), Some(&StreamId::from("2")));
        assert_eq!(alloc.first_empty(), Some(ViewportId(1)));
        assert_exclusive(&alloc);
    }

    #[test]
    fn test_conflict_leaves_target_empty() {
        let mut alloc = ViewportAllocator::new(4);
        alloc.assign(ViewportId(0), StreamId::from("1")).unwrap();

        let err = alloc.assign(ViewportId(1), StreamId::from("1")).unwrap_err();
        assert_eq!(
            err,
            AllocationError::Conflict {
                stream: StreamId::from("1"),
                held_by: ViewportId(0),
            }
        );
        assert_eq!(alloc.assigned(ViewportId(1)), None);
        assert_exclusive(&alloc);
    }

    #[test]
    fn test_occupied_and_unknown_viewport() {
        let mut alloc = ViewportAllocator::new(2);
        alloc.assign(ViewportId(0), StreamId::from("1")).unwrap();
        assert!(matches!(
            alloc.assign(ViewportId(0), StreamId::from("2")),
            Err(AllocationError::Occupied { .. })
        ));
        assert_eq!(
            alloc.assign(ViewportId(5), StreamId::from("2")),
            Err(AllocationError::UnknownViewport(ViewportId(5)))
        );
        assert!(alloc.release(ViewportId(9)).is_err());
    }

    #[test]
    fn test_release_returns_stream_to_pool() {
        let streams = directory();
        let mut alloc = ViewportAllocator::new(4);
        alloc.assign(ViewportId(2), StreamId::from("3")).unwrap();

        assert_eq!(
            alloc.release(ViewportId(2)).unwrap(),
            Some(StreamId::from("3"))
        );
        assert_eq!(alloc.release(ViewportId(2)).unwrap(), None);
        assert_eq!(ids(&alloc.list_available(&streams)), ["1", "2", "3"]);

        // Reassignable elsewhere once released.
        alloc.assign(ViewportId(1), StreamId::from("3")).unwrap();
        assert_exclusive(&alloc);
    }

    #[test]
    fn test_exclusivity_under_mixed_operations() {
        let mut alloc = ViewportAllocator::new(4);
        let ops: &[(usize, &str, bool)] = &[
            (0, "1", true),
            (1, "1", true),
            (1, "2", true),
            (0, "", false),
            (2, "2", true),
            (3, "1", true),
            (1, "", false),
            (2, "2", true),
            (0, "2", true),
        ];
        for (v, s, assign) in ops {
            if *assign {
                let _ = alloc.assign(ViewportId(*v), StreamId::from(*s));
            } else {
                alloc.release(ViewportId(*v)).unwrap();
            }
            assert_exclusive(&alloc);
        }
    }

    #[test]
    fn test_clear() {
        let mut alloc = ViewportAllocator::new(3);
        alloc.assign(ViewportId(0), StreamId::from("1")).unwrap();
        alloc.assign(ViewportId(2), StreamId::from("2")).unwrap();
        let cleared = alloc.clear();
        assert_eq!(cleared.len(), 2);
        assert_eq!(alloc.first_empty(), Some(ViewportId(0)));
        assert_exclusive(&alloc);
    }
}
