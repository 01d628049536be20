//! Wire codecs: the [`Encoder`] trait a `Subscription` calls into, and the
//! bit-exact [`DefaultEncoder`] layout this pipeline ships with. The manual
//! length-prefixed, NUL-terminated layout here follows the same shape as a
//! hand-rolled `Serialize`/`Deserialize` pair — write fields directly to a
//! byte sink rather than going through `serde` — but
//! targets a growable `Vec<u8>` instead of a capacity-bounded cursor, since
//! encoded buffers here are built once and handed off, not reused in place.

use byteorder::{NativeEndian, WriteBytesExt};

use crate::error::{PerfkitError, Result};
use crate::manifest::Manifest;
use crate::sample::Sample;

/// Converts manifests and sample batches into byte buffers for delivery to
/// a listener. Implementations may substitute an
/// alternative framing (compression, encryption) as long as they ship a
/// matching decoder on the consuming side.
pub trait Encoder: Send + Sync {
    fn encode_manifest(&self, manifest: &Manifest) -> Result<Vec<u8>>;
    fn encode_samples(&self, samples: &[Sample]) -> Result<Vec<u8>>;
}

/// The default identity encoder. All integers are written native-endian —
/// an intentional, documented limitation (see `DESIGN.md`) rather than an
/// oversight, matching the wire format the original daemon spoke.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEncoder;

impl Encoder for DefaultEncoder {
    fn encode_manifest(&self, manifest: &Manifest) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u8(manifest.source_id().get() as u8)
            .map_err(|e| PerfkitError::EncoderFailure(e.to_string()))?;

        let compact = manifest.compact_ids();
        buf.write_u8(compact as u8).map_err(|e| PerfkitError::EncoderFailure(e.to_string()))?;

        for row in manifest.rows() {
            if compact {
                buf.write_u8(row.row_id as u8)
            } else {
                buf.write_i32::<NativeEndian>(row.row_id as i32)
            }
            .map_err(|e| PerfkitError::EncoderFailure(e.to_string()))?;

            buf.write_u8(row.row_type.tag())
                .map_err(|e| PerfkitError::EncoderFailure(e.to_string()))?;
            buf.extend_from_slice(row.name.as_bytes());
            buf.push(0);
        }

        Ok(buf)
    }

    fn encode_samples(&self, samples: &[Sample]) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(samples.iter().map(|s| 5 + s.len()).sum());

        for sample in samples {
            let length = sample.len() as i32 + 1;
            buf.write_i32::<NativeEndian>(length)
                .map_err(|e| PerfkitError::EncoderFailure(e.to_string()))?;
            buf.write_u8(sample.source_id().get() as u8)
                .map_err(|e| PerfkitError::EncoderFailure(e.to_string()))?;
            buf.extend_from_slice(sample.data());
        }

        Ok(buf)
    }
}
