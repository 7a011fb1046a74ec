//! Video fragment reassembly
//!
//! Rebuilds one compressed frame from its datagram-sized fragments. Only one
//! frame is tracked at a time: a fragment for a newer frame sequence evicts
//! an incomplete older one, bounding memory against stalled or vanished
//! senders. Owned exclusively by the video receive thread; no locking.

use bytes::{Bytes, BytesMut};

use crate::protocol::VideoFragment;

/// Wrapping distance beyond which a frame sequence counts as older, not newer
const HALF_RANGE: u32 = u32::MAX / 2;

/// Upper bound on fragments per frame; a header claiming more is corrupt
/// rather than a frame worth allocating for
const MAX_FRAGMENTS: u32 = 1024;

/// In-progress frame: payloads stored by fragment index
struct ReassemblyEntry {
    frame_sequence: u32,
    total_fragments: u32,
    parts: Vec<Option<Bytes>>,
    received: u32,
}

impl ReassemblyEntry {
    fn new(frame_sequence: u32, total_fragments: u32) -> Self {
        Self {
            frame_sequence,
            total_fragments,
            parts: vec![None; total_fragments as usize],
            received: 0,
        }
    }

    fn store(&mut self, index: u32, payload: Bytes) {
        let slot = &mut self.parts[index as usize];
        // Duplicate delivery overwrites: last write wins
        if slot.replace(payload).is_none() {
            self.received += 1;
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.total_fragments
    }

    fn assemble(self) -> Bytes {
        let mut frame = BytesMut::new();
        for part in self.parts {
            frame.extend_from_slice(&part.expect("complete entry has every index"));
        }
        frame.freeze()
    }
}

/// Reorders and reassembles fragments into whole frames
#[derive(Default)]
pub struct FragmentReassembler {
    current: Option<ReassemblyEntry>,
    frames_completed: u64,
    frames_evicted: u64,
    fragments_dropped: u64,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one fragment; returns the whole frame once every index of its
    /// sequence has arrived
    pub fn ingest(&mut self, fragment: VideoFragment) -> Option<Bytes> {
        if fragment.total_fragments == 0
            || fragment.total_fragments > MAX_FRAGMENTS
            || fragment.fragment_index >= fragment.total_fragments
        {
            // Corrupt header
            self.fragments_dropped += 1;
            return None;
        }

        match &self.current {
            Some(entry) if entry.frame_sequence == fragment.frame_sequence => {
                if entry.total_fragments != fragment.total_fragments {
                    // Same sequence disagreeing on its own shape: corrupt
                    self.fragments_dropped += 1;
                    return None;
                }
            }
            Some(entry) => {
                let distance = fragment.frame_sequence.wrapping_sub(entry.frame_sequence);
                if distance > HALF_RANGE {
                    // Fragment of an already-abandoned older frame
                    self.fragments_dropped += 1;
                    return None;
                }
                // Newer frame started: the incomplete one is gone for good
                tracing::trace!(
                    evicted = entry.frame_sequence,
                    started = fragment.frame_sequence,
                    "evicting incomplete frame"
                );
                self.frames_evicted += 1;
                self.current = Some(ReassemblyEntry::new(
                    fragment.frame_sequence,
                    fragment.total_fragments,
                ));
            }
            None => {
                self.current = Some(ReassemblyEntry::new(
                    fragment.frame_sequence,
                    fragment.total_fragments,
                ));
            }
        }

        let entry = self.current.as_mut().expect("entry ensured above");
        entry.store(fragment.fragment_index, fragment.payload);

        // Completion is checked on every fragment, not only the last-flagged
        // one, so any arrival order finishes the frame
        if entry.is_complete() {
            let entry = self.current.take().expect("entry present");
            self.frames_completed += 1;
            Some(entry.assemble())
        } else {
            None
        }
    }

    pub fn stats(&self) -> ReassemblyStats {
        ReassemblyStats {
            frames_completed: self.frames_completed,
            frames_evicted: self.frames_evicted,
            fragments_dropped: self.fragments_dropped,
        }
    }
}

/// Reassembly statistics
#[derive(Debug, Clone)]
pub struct ReassemblyStats {
    pub frames_completed: u64,
    pub frames_evicted: u64,
    pub fragments_dropped: u64,
}
