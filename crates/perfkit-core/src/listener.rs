//! The transport-facing notification surface. A `Listener`
//! is handed topology events and the encoded byte buffers a subscription
//! produces; it is the seam a transport (RPC, local socket, whatever) hangs
//! off of. The core ships no implementation — only the trait and the
//! `Manager`'s fan-out to however many listeners are registered.

use crate::error::Result;
use crate::ids::{ChannelId, SourceId, SubscriptionId};

/// Implemented by a transport layer to receive pipeline topology changes
/// and delivered buffers. Multiple listeners may be registered with a
/// `Manager`; each receives independent notifications.
///
/// Implementations are called from whichever core thread produced the
/// event — a sampler thread for `deliver_sample`, the thread that issued a
/// topology mutation for the `*_added`/`*_removed` hooks. Implementations
/// must not block the caller and must not re-enter the `Manager` while
/// holding their own locks.
pub trait Listener: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self);

    fn channel_added(&self, channel_id: ChannelId);
    fn channel_removed(&self, channel_id: ChannelId);
    fn source_added(&self, source_id: SourceId);
    fn source_removed(&self, source_id: SourceId);
    fn subscription_added(&self, subscription_id: SubscriptionId);
    fn subscription_removed(&self, subscription_id: SubscriptionId);

    fn deliver_manifest(&self, subscription_id: SubscriptionId, bytes: &[u8]);
    fn deliver_sample(&self, subscription_id: SubscriptionId, bytes: &[u8]);
}
