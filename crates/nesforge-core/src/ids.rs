use std::fmt;

use serde::{Deserialize, Serialize};

pub type RawId = u32;

pub const FIRST_ID: RawId = 100;

/// Wire sentinel for "no reference".
pub const NO_ID: RawId = RawId::MAX;

pub trait EntityId: Copy + Eq {
    fn from_raw(raw: RawId) -> Self;
    fn raw(self) -> RawId;
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(RawId);

        impl $name {
            #[must_use]
            pub const fn new(raw: RawId) -> Self {
                Self(raw)
            }

            #[must_use]
            pub const fn get(self) -> RawId {
                self.0
            }
        }

        impl EntityId for $name {
            fn from_raw(raw: RawId) -> Self {
                Self(raw)
            }

            fn raw(self) -> RawId {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(SongId);
entity_id!(PatternId);
entity_id!(InstrumentId);
entity_id!(ArpeggioId);
entity_id!(
    SampleId
);

/// Issues document-unique ids. The watermark is the smallest id not yet
/// issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next: RawId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: FIRST_ID }
    }
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> RawId {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    pub fn allocate<I: EntityId>(&mut self) -> I {
        I::from_raw(self.next_id())
    }

    #[must_use]
    pub fn watermark(&self) -> RawId {
        self.next
    }

    pub(crate) fn watermark_mut(&mut self) -> &mut RawId {
        &mut self.next
    }

    pub fn ensure_above(&mut self, ids: impl IntoIterator<Item = RawId>) {
        if let Some(largest) = ids.into_iter().max() {
            if largest >= self.next {
                self.next = largest.saturating_add(1);
            }
        }
    }
}
