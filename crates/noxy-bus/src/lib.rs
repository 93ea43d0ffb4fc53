pub mod connection;
pub mod mock;
pub mod mqtt;
pub mod retry;

pub use connection::Connection;
pub use mock::MockTransport;
pub use mqtt::MqttTransport;
pub use retry::{retry_with_backoff, RetryError, RetryPolicy};
