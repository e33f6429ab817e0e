//! Data published through the emulated tag.
//!
//! Two slots hold the record served to the next reader:
//!
//! - **persistent**: served to every session until replaced or cleared
//! - **one-time**: takes precedence over the persistent slot and is cleared
//!   after a session reads it completely
//!
//! The slots are shared between the UI, which publishes at any time, and the
//! card-emulation service, so every access goes through a mutex.
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::hce::{PublishSource, PublishedData};
//! use flagcarrier_core::record::TagRecord;
//!
//! let published = PublishedData::new();
//! published.publish([("display_name", "always")].into_iter().collect());
//! published.publish_once([("display_name", "once")].into_iter().collect());
//!
//! let next = published.resolve().unwrap();
//! assert_eq!(next.record.get("display_name"), Some("once"));
//! assert!(matches!(next.source, PublishSource::OneTime { .. }));
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::record::TagRecord;

/// Which slot a served record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishSource {
    /// The persistent slot.
    Persistent,
    /// The one-time slot, identified by its publication counter.
    OneTime {
        /// Counter value of the publication that was served.
        generation: u64,
    },
}

/// A record resolved for a session along with its source.
#[derive(Debug, Clone)]
pub struct Publication {
    /// The slot the record came from.
    pub source: PublishSource,
    /// The record to serve.
    pub record: Arc<TagRecord>,
}

#[derive(Debug)]
struct OneTime {
    generation: u64,
    record: Arc<TagRecord>,
}

#[derive(Debug, Default)]
struct Slots {
    persistent: Option<Arc<TagRecord>>,
    one_time: Option<OneTime>,
    generation: u64,
}

/// The shared persistent and one-time publish slots.
#[derive(Debug, Default)]
pub struct PublishedData {
    slots: Mutex<Slots>,
}

impl PublishedData {
    /// Creates empty slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the persistent record.
    pub fn publish(&self, record: TagRecord) {
        self.lock().persistent = Some(Arc::new(record));
    }

    /// Replaces the one-time record.
    pub fn publish_once(&self, record: TagRecord) {
        let mut slots = self.lock();
        slots.generation += 1;
        let generation = slots.generation;
        slots.one_time = Some(OneTime {
            generation,
            record: Arc::new(record),
        });
    }

    /// Clears the persistent record.
    pub fn clear(&self) {
        self.lock().persistent = None;
    }

    /// Clears the one-time record.
    pub fn clear_once(&self) {
        self.lock().one_time = None;
    }

    /// Returns `true` if a persistent record is published.
    #[must_use]
    pub fn has_persistent(&self) -> bool {
        self.lock().persistent.is_some()
    }

    /// Returns `true` if a one-time record is waiting to be served.
    #[must_use]
    pub fn has_one_time(&self) -> bool {
        self.lock().one_time.is_some()
    }

    /// Picks the record for the next session: the one-time record if there
    /// is one, otherwise the persistent record.
    #[must_use]
    pub fn resolve(&self) -> Option<Publication> {
        let slots = self.lock();

        if let Some(once) = &slots.one_time {
            return Some(Publication {
                source: PublishSource::OneTime {
                    generation: once.generation,
                },
                record: Arc::clone(&once.record),
            });
        }

        slots.persistent.as_ref().map(|record| Publication {
            source: PublishSource::Persistent,
            record: Arc::clone(record),
        })
    }

    /// Clears the one-time slot if it still holds publication `generation`.
    ///
    /// A record published after the served one is left in place. Returns
    /// `true` if the slot was cleared.
    pub fn consume_once(&self, generation: u64) -> bool {
        let mut slots = self.lock();

        let served = slots
            .one_time
            .as_ref()
            .is_some_and(|once| once.generation == generation);
        if served {
            slots.one_time = None;
        }
        served
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Every critical section leaves the slots consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
