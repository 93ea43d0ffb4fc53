//! One [`crate::Feature`] per bridge instance kind.

mod actions;
mod application;
mod audio;
mod auto_reply;
mod chat;
mod contexts;
mod joystick;
mod keyboard;

pub use actions::ActionFeature;
pub use application::ApplicationFeature;
pub use audio::AudioFeature;
pub use auto_reply::AutoReplyFeature;
pub use chat::ChatFeature;
pub use contexts::ContextFeature;
pub use joystick::JoystickFeature;
pub use keyboard::KeyboardFeature;
