//! Monotonic id allocation for channels, sources and subscriptions.
//!
//! Every kind gets its own newtype so a `ChannelId` can never be handed to
//! an operation expecting a `SourceId` by accident, and its own counter so
//! ids are unique for the lifetime of the process without a
//! central registry having to hand them out.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

macro_rules! monotonic_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub fn get(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> usize {
                id.0
            }
        }
    };
}

monotonic_id!(ChannelId);
monotonic_id!(SourceId);
monotonic_id!(SubscriptionId);

/// A process-wide counter handing out one id kind. The `Manager` owns one
/// instance per kind so separate id spaces never collide even though they
/// are all backed by the same `usize` counter shape.
pub struct IdAllocator<T> {
    next: AtomicUsize,
    make: fn(usize) -> T,
}

impl<T> IdAllocator<T> {
    pub fn new(make: fn(usize) -> T) -> Self {
        IdAllocator {
            next: AtomicUsize::new(1),
            make,
        }
    }

    #[inline]
    pub fn alloc(&self) -> T {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        (self.make)(id)
    }
}

impl ChannelId {
    pub(crate) fn allocator() -> IdAllocator<ChannelId> {
        IdAllocator::new(ChannelId)
    }
}

impl SourceId {
    pub(crate) fn allocator() -> IdAllocator<SourceId> {
        IdAllocator::new(SourceId)
    }
}

impl SubscriptionId {
    pub(crate) fn allocator() -> IdAllocator<SubscriptionId> {
        IdAllocator::new(SubscriptionId)
    }
}
