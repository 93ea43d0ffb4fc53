use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use noxy_core::devices::JoystickDriver;
use noxy_core::{BridgeError, BusMessage};

use crate::decoder::{parse_button, BUTTON_PULSE};
use crate::feature::{Feature, FeatureContext};

pub struct JoystickFeature {
    topic: String,
    button_count: u32,
    driver: Arc<dyn JoystickDriver>,
}

impl JoystickFeature {
    pub fn new(topic: impl Into<String>, button_count: u32, driver: Arc<dyn JoystickDriver>) -> Self {
        Self {
            topic: topic.into(),
            button_count,
            driver,
        }
    }
}

#[async_trait]
impl Feature for JoystickFeature {
    fn name(&self) -> &'static str {
        "joystick"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    async fn on_bus_message(&self, _ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        let button = parse_button(&message.text(), self.button_count)?;
        info!(button, "pulsing joystick button");
        self.driver.press_button(button)?;
        tokio::time::sleep(BUTTON_PULSE).await;
        self.driver.release_button(button)?;
        Ok(())
    }

    async fn on_shutdown(&self) {
        self.driver.release();
    }
}
