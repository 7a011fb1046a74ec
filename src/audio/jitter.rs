//! Playout-side jitter buffer
//!
//! Absorbs network reordering and paces playout. Packets accumulate until the
//! target depth is reached (Filling), then every pop hands out the next unit
//! in sequence order (Playing). A missing sequence number is concealed with
//! one period of silence instead of stalling, and a packet that arrives after
//! its slot has already played is discarded.
//!
//! Owned exclusively by the audio receive thread; no locking.

use std::collections::BTreeMap;

use crate::protocol::AudioPacket;

/// Wrapping distance beyond which a sequence is treated as being behind the
/// playhead rather than ahead of it
const HALF_RANGE: u32 = u32::MAX / 2;

/// One unit handed to the playback path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayoutUnit {
    /// A real received packet
    Packet(AudioPacket),
    /// Stand-in for a lost packet: one period of silence
    Concealment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Filling,
    Playing,
}

/// Reordering, loss-concealing playout buffer for one audio stream
pub struct JitterBuffer {
    /// Held packets keyed by sequence
    slots: BTreeMap<u32, AudioPacket>,
    /// Packets required before playout starts
    target_depth: usize,
    state: State,
    /// Sequence of the unit most recently handed out (real or concealed)
    last_played: Option<u32>,
    packets_received: u64,
    packets_late: u64,
    units_concealed: u64,
}

impl JitterBuffer {
    pub fn new(target_depth: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            target_depth,
            state: State::Filling,
            last_played: None,
            packets_received: 0,
            packets_late: 0,
            units_concealed: 0,
        }
    }

    /// Enqueue a packet in playout order
    ///
    /// Returns false when the packet arrived behind the playhead and was
    /// discarded; already-played output is never replaced.
    pub fn push(&mut self, packet: AudioPacket) -> bool {
        if let Some(last) = self.last_played {
            let distance = packet.sequence.wrapping_sub(last);
            if distance == 0 || distance > HALF_RANGE {
                self.packets_late += 1;
                return false;
            }
        }
        self.packets_received += 1;
        // Duplicate sequence overwrites: last write wins
        self.slots.insert(packet.sequence, packet);
        true
    }

    /// Dequeue the next unit to render
    ///
    /// Returns `None` while filling toward the target depth, or when nothing
    /// is buffered. A gap of K missing sequences yields K `Concealment` units
    /// before the next real packet, preserving pacing.
    pub fn pop(&mut self) -> Option<PlayoutUnit> {
        if self.state == State::Filling {
            if self.slots.len() < self.target_depth {
                return None;
            }
            self.state = State::Playing;
        }

        loop {
            let next_seq = self.next_key()?;

            let last = match self.last_played {
                None => {
                    // First unit ever played sets the playhead
                    let packet = self.slots.remove(&next_seq).expect("key just observed");
                    self.last_played = Some(next_seq);
                    return Some(PlayoutUnit::Packet(packet));
                }
                Some(last) => last,
            };

            let distance = next_seq.wrapping_sub(last);
            if distance == 0 || distance > HALF_RANGE {
                // Behind the playhead: drop and look at the next slot
                self.slots.remove(&next_seq);
                self.packets_late += 1;
                continue;
            }

            if distance == 1 {
                let packet = self.slots.remove(&next_seq).expect("key just observed");
                self.last_played = Some(next_seq);
                return Some(PlayoutUnit::Packet(packet));
            }

            // Gap: advance the playhead one step per concealment unit, leaving
            // the real packet in place until its turn comes
            self.last_played = Some(last.wrapping_add(1));
            self.units_concealed += 1;
            return Some(PlayoutUnit::Concealment);
        }
    }

    /// Slot to play next: smallest wrapping distance ahead of the playhead.
    /// Raw numeric order is wrong when buffered sequences straddle the u32
    /// wrap. Before anything has played, pick the slot every other slot is
    /// ahead of.
    fn next_key(&self) -> Option<u32> {
        match self.last_played {
            Some(last) => self
                .slots
                .keys()
                .copied()
                .min_by_key(|seq| seq.wrapping_sub(last)),
            None => self.slots.keys().copied().min_by_key(|&seq| {
                self.slots
                    .keys()
                    .map(|other| other.wrapping_sub(seq))
                    .max()
                    .unwrap_or(0)
            }),
        }
    }

    /// Buffered packet count
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Whether playout has started
    pub fn is_playing(&self) -> bool {
        self.state == State::Playing
    }

    pub fn stats(&self) -> JitterStats {
        JitterStats {
            depth: self.slots.len(),
            target_depth: self.target_depth,
            packets_received: self.packets_received,
            packets_late: self.packets_late,
            units_concealed: self.units_concealed,
        }
    }
}

/// Jitter buffer statistics
#[derive(Debug, Clone)]
pub struct JitterStats {
    pub depth: usize,
    pub target_depth: usize,
    pub packets_received: u64,
    pub packets_late: u64,
    pub units_concealed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(sequence: u32) -> AudioPacket {
        AudioPacket {
            sequence,
            timestamp: sequence as u64 * 1000,
            samples: vec![sequence as i16; 4],
        }
    }

    fn seq_of(unit: PlayoutUnit) -> Option<u32> {
        match unit {
            PlayoutUnit::Packet(p) => Some(p.sequence),
            PlayoutUnit::Concealment => None,
        }
    }

    #[test]
    fn test_not_ready_until_target_depth() {
        let mut jitter = JitterBuffer::new(3);

        jitter.push(packet(1));
        assert!(jitter.pop().is_none());
        jitter.push(packet(2));
        assert!(jitter.pop().is_none());
        jitter.push(packet(3));

        assert_eq!(seq_of(jitter.pop().unwrap()), Some(1));
        assert!(jitter.is_playing());
    }

    #[test]
    fn test_each_push_enables_one_pop_once_playing() {
        let mut jitter = JitterBuffer::new(2);
        jitter.push(packet(1));
        jitter.push(packet(2));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(1));

        // Steady state: one pop per push, then dry
        for seq in 3..8 {
            jitter.push(packet(seq));
            assert!(jitter.pop().is_some());
        }
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(7));
        assert!(jitter.pop().is_none());
    }

    #[test]
    fn test_gap_emits_concealment_in_order() {
        let mut jitter = JitterBuffer::new(2);
        for seq in [1, 2, 4, 5] {
            jitter.push(packet(seq));
        }

        assert_eq!(seq_of(jitter.pop().unwrap()), Some(1));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(2));
        assert_eq!(jitter.pop().unwrap(), PlayoutUnit::Concealment);
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(4));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(5));
        assert!(jitter.pop().is_none());
        assert_eq!(jitter.stats().units_concealed, 1);
    }

    #[test]
    fn test_gap_of_k_conceals_k_units() {
        let mut jitter = JitterBuffer::new(1);
        jitter.push(packet(1));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(1));

        jitter.push(packet(5));
        assert_eq!(jitter.pop().unwrap(), PlayoutUnit::Concealment);
        assert_eq!(jitter.pop().unwrap(), PlayoutUnit::Concealment);
        assert_eq!(jitter.pop().unwrap(), PlayoutUnit::Concealment);
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(5));
    }

    #[test]
    fn test_reordered_arrival_plays_in_sequence() {
        let mut jitter = JitterBuffer::new(3);
        for seq in [3, 1, 2] {
            jitter.push(packet(seq));
        }

        assert_eq!(seq_of(jitter.pop().unwrap()), Some(1));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(2));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(3));
    }

    #[test]
    fn test_late_packet_discarded() {
        let mut jitter = JitterBuffer::new(1);
        jitter.push(packet(5));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(5));

        // Arrives after its slot already played
        assert!(!jitter.push(packet(5)));
        assert!(!jitter.push(packet(3)));
        assert!(jitter.pop().is_none());
        assert_eq!(jitter.stats().packets_late, 2);
    }

    #[test]
    fn test_no_refill_pause_once_playing() {
        let mut jitter = JitterBuffer::new(3);
        for seq in 1..=3 {
            jitter.push(packet(seq));
        }
        for _ in 0..3 {
            assert!(jitter.pop().is_some());
        }

        // Depth is now zero but a new push is playable immediately
        jitter.push(packet(4));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(4));
    }

    #[test]
    fn test_sequence_wraparound_continues() {
        let mut jitter = JitterBuffer::new(1);
        jitter.push(packet(u32::MAX));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(u32::MAX));

        // Counter wraps to 0: treated as the next packet, not a late one
        jitter.push(packet(0));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(0));
    }

    #[test]
    fn test_buffer_straddling_wraparound_plays_in_order() {
        // Both sides of the wrap buffered at once: the pre-wrap sequence
        // plays first, nothing is discarded as late
        let mut jitter = JitterBuffer::new(2);
        jitter.push(packet(u32::MAX));
        jitter.push(packet(0));

        assert_eq!(seq_of(jitter.pop().unwrap()), Some(u32::MAX));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(0));
        assert_eq!(jitter.stats().packets_late, 0);
    }

    #[test]
    fn test_straddling_buffer_ordered_after_playhead_set() {
        let mut jitter = JitterBuffer::new(1);
        jitter.push(packet(u32::MAX - 1));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(u32::MAX - 1));

        // Arrivals reordered across the wrap
        jitter.push(packet(0));
        jitter.push(packet(u32::MAX));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(u32::MAX));
        assert_eq!(seq_of(jitter.pop().unwrap()), Some(0));
        assert_eq!(jitter.stats().packets_late, 0);
    }

    #[test]
    fn test_drain_restores_depth_after_gap() {
        // The receive loop's policy: pop once per push, then keep popping
        // while the depth exceeds the target. A gap's concealments inflate
        // the depth; the drain must bring it back without unbounded growth.
        let mut jitter = JitterBuffer::new(2);

        for seq in [1, 2, 3, 7, 8, 9, 10, 11, 12] {
            jitter.push(packet(seq));
            while jitter.pop().is_some() {
                if jitter.depth() <= 2 {
                    break;
                }
            }
        }

        assert_eq!(jitter.depth(), 2);
        assert_eq!(jitter.stats().units_concealed, 3);
        assert_eq!(jitter.stats().packets_late, 0);
    }
}
