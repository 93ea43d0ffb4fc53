pub mod actions;
pub mod bus;
pub mod contexts;
pub mod devices;
pub mod errors;
pub mod ids;
pub mod session;
pub mod wire;

pub mod testing;

pub use actions::{ActionDefinition, ActionEffect, ArgumentDefinition, ArgumentType, Timing};
pub use bus::{BusEvent, BusMessage, BusTransport, ConnectOptions, QoS};
pub use contexts::ContextDefinition;
pub use errors::{BridgeError, TransportError};
pub use ids::SessionId;
pub use session::{ChatRole, ClientMessage, SessionEvent, SessionHost, TriggerArgument};
