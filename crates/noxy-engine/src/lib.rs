pub mod audio;
pub mod autoreply;
pub mod bridge;
pub mod commands;
pub mod decoder;
pub mod dedup;
pub mod dispatch;
pub mod feature;
pub mod features;
pub mod registry;

pub use audio::AudioDeck;
pub use autoreply::AutoReplyTimer;
pub use bridge::BridgeEngine;
pub use dedup::DuplicateCache;
pub use feature::{Feature, FeatureContext};
pub use registry::{ActionRegistry, ContextRegistry, Registry, RegistryEntry};
