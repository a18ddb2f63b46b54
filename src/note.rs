//! Note numbers and the queue of notes that are releasing.

use slotmap::SlotMap;

use crate::{NoteOutOfRange, NOTE_COUNT, NOTE_MAX, NOTE_MIN};

/// A note number known to be within `NOTE_MIN..=NOTE_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteNumber(u8);

impl NoteNumber {
    pub fn new(note: u8) -> Result<Self, NoteOutOfRange> {
        if (NOTE_MIN..=NOTE_MAX).contains(&note) {
            Ok(Self(note))
        } else {
            Err(NoteOutOfRange(note))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Position of this note in per-note arrays.
    pub fn index(self) -> usize {
        (self.0 - NOTE_MIN) as usize
    }
}

impl TryFrom<u8> for NoteNumber {
    type Error = NoteOutOfRange;

    fn try_from(note: u8) -> Result<Self, Self::Error> {
        Self::new(note)
    }
}

slotmap::new_key_type! {
    struct ReleaseKey;
}

struct ListEntry {
    note: NoteNumber,
    next: Option<ReleaseKey>,
    prev: Option<ReleaseKey>,
}

/// Notes in their release phase, oldest first.
///
/// A doubly linked list inside a preallocated slot map, so pushing, evicting and removing an
/// arbitrary note are all constant time and never allocate once the queue is built.
pub struct ReleaseQueue {
    head: Option<ReleaseKey>,
    tail: Option<ReleaseKey>,
    capacity: usize,
    entries: SlotMap<ReleaseKey, ListEntry>,
    keys: [Option<ReleaseKey>; NOTE_COUNT],
}

impl ReleaseQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "release queue needs room for at least one note");
        ReleaseQueue {
            head: None,
            tail: None,
            capacity,
            entries: SlotMap::with_capacity_and_key(capacity),
            keys: [None; NOTE_COUNT],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, note: NoteNumber) -> bool {
        self.keys[note.index()].is_some()
    }

    /// Append `note` as the newest release. If the queue is full the oldest note is evicted
    /// first and returned so the caller can silence it. A note already queued is left where it is.
    pub fn push(&mut self, note: NoteNumber) -> Option<NoteNumber> {
        if self.contains(note) {
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.pop_oldest()
        } else {
            None
        };

        let key = self.entries.insert(ListEntry {
            note,
            next: None,
            prev: self.tail,
        });
        if let Some(tail) = self.tail {
            self.entries[tail].next = Some(key);
        }
        if self.head.is_none() {
            self.head = Some(key);
        }
        self.tail = Some(key);
        self.keys[note.index()] = Some(key);
        evicted
    }

    /// Remove and return the note that has been releasing the longest.
    pub fn pop_oldest(&mut self) -> Option<NoteNumber> {
        let head = self.head?;
        self.unlink(head)
    }

    /// Remove `note` wherever it is. Returns whether it was queued.
    pub fn remove(&mut self, note: NoteNumber) -> bool {
        match self.keys[note.index()] {
            Some(key) => self.unlink(key).is_some(),
            None => false,
        }
    }

    fn unlink(&mut self, key: ReleaseKey) -> Option<NoteNumber> {
        let entry = self.entries.remove(key)?;
        if let Some(prev) = entry.prev {
            self.entries[prev].next = entry.next;
        } else {
            self.head = entry.next;
        }
        if let Some(next) = entry.next {
            self.entries[next].prev = entry.prev;
        } else {
            self.tail = entry.prev;
        }
        self.keys[entry.note.index()] = None;
        Some(entry.note)
    }

    /// Queued notes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = NoteNumber> + '_ {
        let mut key = self.head;
        std::iter::from_fn(move || {
            let entry = &self.entries[key?];
            key = entry.next;
            Some(entry.note)
        })
    }
}
