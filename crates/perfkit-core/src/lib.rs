//! In-process pipeline core for the Perfkit performance-data collection
//! agent: the channel/source/subscription object model, its shared-clock
//! scheduling, and the default wire encoding. A transport (RPC, local
//! socket, whatever an embedder wires up) drives all of this through a
//! single [`Manager`](manager::Manager) and observes it through the
//! [`Listener`](listener::Listener) trait.

pub mod channel;
pub mod clock;
pub mod encode;
pub mod error;
mod hostname;
pub mod ids;
pub mod listener;
pub mod manager;
pub mod manifest;
pub mod plugin;
pub mod sample;
pub mod source;
pub mod spawn;
pub mod subscription;

pub use channel::{Channel, ChannelState};
pub use encode::{DefaultEncoder, Encoder};
pub use error::{PerfkitError, Result};
pub use ids::{ChannelId, SourceId, SubscriptionId};
pub use manager::Manager;
pub use manifest::{Manifest, ManifestBuilder, Resolution, RowType};
pub use plugin::{PluginInfo, PluginType};
pub use sample::Sample;
pub use source::{Source, SourceCallback, SpawnCallback};
pub use spawn::SpawnInfo;
pub use subscription::Subscription;
