// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! sequence_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }

            /// Returns the following id. Zero is reserved for "never issued",
            /// so the sequence wraps to 1.
            pub const fn next(self) -> Self {
                match self.0.checked_add(1) {
                    Some(value) => Self(value),
                    None => Self(1),
                }
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

sequence_id!(RequestId);
sequence_id!(Generation);

static MOUNTS: AtomicU64 = AtomicU64::new(0);

impl Generation {
    /// A generation never handed out before in this process. Owners that
    /// share a completion channel use it so their requests cannot collide.
    pub fn unique() -> Self {
        Self(MOUNTS.fetch_add(1, Ordering::Relaxed).wrapping_add(1).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::{Generation, RequestId};

    #[test]
    fn next_skips_zero_on_wrap() {
        assert_eq!(RequestId::new(u64::MAX).next(), RequestId::new(1));
        assert_eq!(RequestId::default().next(), RequestId::new(1));
    }

    #[test]
    fn ids_are_ordered_by_issue() {
        let first = Generation::default().next();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.get(), 2);
    }

    #[test]
    fn unique_generations_never_repeat() {
        let first = Generation::unique();
        let second = Generation::unique();
        assert_ne!(first, second);
        assert!(second > first);
        assert_ne!(first, Generation::default());
    }
}
