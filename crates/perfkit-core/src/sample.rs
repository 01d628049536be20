//! An opaque, pre-encoded payload produced by a source.
//! Samples are immutable after construction and reference-counted so the
//! fan-out in `crate::channel` can hand the same payload to every
//! subscription without copying it.

use std::sync::Arc;

use crate::ids::SourceId;

#[derive(Debug, Clone)]
pub struct Sample {
    inner: Arc<SampleInner>,
}

#[derive(Debug)]
struct SampleInner {
    source_id: SourceId,
    data: Vec<u8>,
}

impl Sample {
    /// Wrap an already-encoded payload. The source id is stamped in here
    /// at construction (the channel's `deliver` re-stamps it on arrival,
    /// so a source need not know its own assigned id to build a sample).
    pub fn new(source_id: SourceId, data: Vec<u8>) -> Self {
        Sample {
            inner: Arc::new(SampleInner { source_id, data }),
        }
    }

    #[inline]
    pub fn source_id(&self) -> SourceId {
        self.inner.source_id
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.inner.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    /// Re-stamp with a channel-assigned source id, without copying the
    /// payload — used by `Channel::deliver`.
    pub(crate) fn restamped(&self, source_id: SourceId) -> Sample {
        if source_id == self.inner.source_id {
            return self.clone();
        }
        Sample::new(source_id, self.inner.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_the_payload() {
        let id = SourceId::allocator().alloc();
        let sample = Sample::new(id, vec![1, 2, 3]);
        let clone = sample.clone();
        assert_eq!(sample.data(), clone.data());
        assert_eq!(sample.source_id(), clone.source_id());
    }
}
