//! The schema descriptor a source publishes before any sample decodes
//! against it. A `Manifest` is built once via
//! [`ManifestBuilder`] and is immutable and reference-counted from the
//! moment it is published, since every subscription that has seen it keeps
//! a shared handle for as long as samples are queued against it.

use std::sync::Arc;
use std::time::SystemTime;

use crate::error::Result;
use crate::ids::SourceId;

/// Wire-stable row types. The discriminant
/// values are part of the wire format and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RowType {
    I32 = 1,
    U32 = 2,
    I64 = 3,
    U64 = 4,
    Utf8 = 5,
    I8 = 6,
    Bool = 7,
}

impl RowType {
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// The resolution at which samples under this manifest report their
/// delta-timestamps. The core never converts timestamps
/// itself; it only reports which resolution a receiver should interpret
/// payloads with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Resolution {
    Precise = 0,
    Usec = 1,
    Msec = 2,
    Sec = 3,
    Min = 4,
    Hour = 5,
}

impl Resolution {
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// One column of a manifest: a 1-based row id, its wire type, and its name.
#[derive(Debug, Clone)]
pub struct Row {
    pub row_id: u32,
    pub row_type: RowType,
    pub name: String,
}

/// An immutable, shared schema descriptor. Construct one through
/// [`ManifestBuilder`]; every `Manifest` that reaches a [`Subscription`]
/// is `Arc`-shared so the last subscription to advance past it is the one
/// that drops it.
///
/// [`Subscription`]: crate::subscription::Subscription
#[derive(Debug)]
pub struct Manifest {
    source_id: SourceId,
    rows: Vec<Row>,
    timestamp: SystemTime,
    resolution: Resolution,
}

impl Manifest {
    #[inline]
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 1-based row access; out-of-range returns `None`.
    pub fn row_name(&self, row_id: u32) -> Option<&str> {
        self.rows.get(row_id.checked_sub(1)? as usize).map(|r| r.name.as_str())
    }

    pub fn row_type(&self, row_id: u32) -> Option<RowType> {
        self.rows.get(row_id.checked_sub(1)? as usize).map(|r| r.row_type)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[inline]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// A manifest with `row_count <= 255` is eligible for the compact
    /// row-id encoding in the default wire format.
    #[inline]
    pub fn compact_ids(&self) -> bool {
        self.rows.len() <= 255
    }
}

/// Builds a [`Manifest`] one row at a time. `source_id`, `timestamp` and
/// `resolution` are set exactly once before [`build`](Self::build) is
/// called.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    rows: Vec<Row>,
    source_id: Option<SourceId>,
    timestamp: Option<SystemTime>,
    resolution: Option<Resolution>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        ManifestBuilder::default()
    }

    /// Append a row, returning its 1-based row id.
    pub fn append(&mut self, name: impl Into<String>, row_type: RowType) -> Result<u32> {
        let row_id = self.rows.len() as u32 + 1;
        self.rows.push(Row {
            row_id,
            row_type,
            name: name.into(),
        });
        Ok(row_id)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn set_source_id(&mut self, source_id: SourceId) -> &mut Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn set_timestamp(&mut self, timestamp: SystemTime) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn set_resolution(&mut self, resolution: Resolution) -> &mut Self {
        self.resolution = Some(resolution);
        self
    }

    /// Finalize the manifest. Fails with [`PerfkitError::NoTarget`]-shaped
    /// misuse is not possible here by construction; a missing `source_id`
    /// or `resolution` is a programmer error in the owning source, so this
    /// panics rather than returning a `Result` a caller would have to
    /// thread through every call site that is guaranteed to have set them.
    pub fn build(self) -> Arc<Manifest> {
        Arc::new(Manifest {
            source_id: self.source_id.expect("source_id must be set before build()"),
            rows: self.rows,
            timestamp: self.timestamp.unwrap_or_else(SystemTime::now),
            resolution: self.resolution.unwrap_or(Resolution::Precise),
        })
    }
}
