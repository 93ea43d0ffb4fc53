use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use noxy_core::devices::KeyboardDriver;
use noxy_core::{BridgeError, BusMessage};

use crate::decoder::parse_key_sequence;
use crate::feature::{Feature, FeatureContext};

pub struct KeyboardFeature {
    topic: String,
    driver: Arc<dyn KeyboardDriver>,
}

impl KeyboardFeature {
    pub fn new(topic: impl Into<String>, driver: Arc<dyn KeyboardDriver>) -> Self {
        Self {
            topic: topic.into(),
            driver,
        }
    }
}

#[async_trait]
impl Feature for KeyboardFeature {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    async fn on_bus_message(&self, _ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        let sequence = parse_key_sequence(&message.text())?;
        info!(codes = ?sequence.codes(), "simulating key sequence");
        sequence.execute(self.driver.as_ref()).await
    }
}
