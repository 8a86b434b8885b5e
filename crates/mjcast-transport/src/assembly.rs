//! In-flight frame reassembly.
//!
//! Frames live in a table keyed by frame ID. A second, creation-ordered
//! queue lets the purge pass stop at the first entry that is still young,
//! so a purge costs O(expired) rather than O(in flight).
//!
//! ```text
//! absent --first fragment--> assembling --last missing index--> complete (removed)
//!                                 \--older than max_age-------> purged   (removed)
//! ```
//!
//! Completed frame IDs are remembered for `max_age` so that repeated or
//! late fragments of an emitted frame are ignored instead of starting a
//! frame that can never complete.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::protocol::FragmentHeader;

/// A frame whose fragments are still arriving.
///
/// Parts are kept sparse: memory follows the payload actually received, not
/// the fragment count claimed by the header.
#[derive(Debug)]
pub struct AssemblingFrame {
    frame_id: u32,
    total: u16,
    parts: BTreeMap<u16, Bytes>,
    created_at: Instant,
    generation: u64,
}

impl AssemblingFrame {
    fn new(frame_id: u32, total: u16, created_at: Instant, generation: u64) -> Self {
        Self {
            frame_id,
            total,
            parts: BTreeMap::new(),
            created_at,
            generation,
        }
    }

    /// Store a payload. Returns false if the index was already filled.
    fn set(&mut self, index: u16, payload: Bytes) -> bool {
        match self.parts.entry(index) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(payload);
                true
            }
        }
    }

    #[inline]
    fn is_complete(&self) -> bool {
        self.parts.len() == self.total as usize
    }

    /// Concatenate all parts strictly by index.
    fn assemble(self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.buffered_bytes());
        for part in self.parts.into_values() {
            out.extend_from_slice(&part);
        }
        out.freeze()
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    pub fn received(&self) -> u16 {
        self.parts.len() as u16
    }

    /// Payload bytes held for this frame so far.
    pub fn buffered_bytes(&self) -> usize {
        self.parts.values().map(Bytes::len).sum()
    }

    pub fn total(&self) -> u16 {
        self.total
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// Outcome of feeding one fragment to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// Stored; the frame still misses fragments.
    Pending,
    /// Index already present; ignored.
    Duplicate,
    /// Fragment of a frame that was already emitted; ignored.
    Late,
    /// Index out of range, zero total, or a total that disagrees with the
    /// frame's first fragment; ignored.
    Malformed,
    /// Last missing fragment arrived; the frame left the table.
    Complete { frame_id: u32, fragments: u16, frame: Bytes },
}

/// All frames currently being reassembled.
pub struct AssemblyTable {
    frames: HashMap<u32, AssemblingFrame>,
    by_creation: VecDeque<(Instant, u32, u64)>,
    completed: HashMap<u32, Instant>,
    by_completion: VecDeque<(Instant, u32)>,
    next_generation: u64,
    max_age: Duration,
}

impl AssemblyTable {
    pub fn new(max_age: Duration) -> Self {
        Self {
            frames: HashMap::new(),
            by_creation: VecDeque::new(),
            completed: HashMap::new(),
            by_completion: VecDeque::new(),
            next_generation: 0,
            max_age,
        }
    }

    /// Number of frames in flight.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Look at an in-flight frame.
    pub fn get(&self, frame_id: u32) -> Option<&AssemblingFrame> {
        self.frames.get(&frame_id)
    }

    /// Feed one fragment received at `now`.
    pub fn insert(&mut self, header: FragmentHeader, payload: Bytes, now: Instant) -> Ingest {
        if header.total == 0 || header.index >= header.total {
            return Ingest::Malformed;
        }
        if self.completed.contains_key(&header.frame_id) {
            return Ingest::Late;
        }

        let by_creation = &mut self.by_creation;
        let next_generation = &mut self.next_generation;
        let frame = self.frames.entry(header.frame_id).or_insert_with(|| {
            let generation = *next_generation;
            *next_generation += 1;
            by_creation.push_back((now, header.frame_id, generation));
            AssemblingFrame::new(header.frame_id, header.total, now, generation)
        });
        if frame.total != header.total {
            return Ingest::Malformed;
        }

        if !frame.set(header.index, payload) {
            return Ingest::Duplicate;
        }
        if !frame.is_complete() {
            return Ingest::Pending;
        }

        // Completed entries leave a stale creation record behind; purge skips
        // it by generation.
        self.completed.insert(header.frame_id, now);
        self.by_completion.push_back((now, header.frame_id));
        match self.frames.remove(&header.frame_id) {
            Some(frame) => Ingest::Complete {
                frame_id: header.frame_id,
                fragments: frame.total,
                frame: frame.assemble(),
            },
            None => Ingest::Pending,
        }
    }

    /// Drop every frame created more than `max_age` before `now`, and forget
    /// completions older than `max_age`.
    /// Returns how many incomplete frames were removed.
    pub fn purge(&mut self, now: Instant) -> usize {
        while let Some(&(completed_at, frame_id)) = self.by_completion.front() {
            if now.saturating_duration_since(completed_at) <= self.max_age {
                break;
            }
            self.by_completion.pop_front();
            if self.completed.get(&frame_id) == Some(&completed_at) {
                self.completed.remove(&frame_id);
            }
        }

        let mut purged = 0;
        while let Some(&(created_at, frame_id, generation)) = self.by_creation.front() {
            if now.saturating_duration_since(created_at) <= self.max_age {
                break;
            }
            self.by_creation.pop_front();
            if self.frames.get(&frame_id).is_some_and(|f| f.generation == generation) {
                self.frames.remove(&frame_id);
                purged += 1;
            }
        }
        purged
    }
}
