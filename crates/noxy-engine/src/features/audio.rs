use async_trait::async_trait;
use tracing::info;

use noxy_core::{BridgeError, BusMessage};

use crate::audio::{index_presets, AudioDeck};
use crate::decoder::{parse_audio_command, AudioCommand};
use crate::feature::{Feature, FeatureContext};

pub struct AudioFeature {
    topic: String,
    deck: AudioDeck,
}

impl AudioFeature {
    pub fn new(topic: impl Into<String>, deck: AudioDeck) -> Self {
        Self {
            topic: topic.into(),
            deck,
        }
    }

    pub fn deck(&self) -> &AudioDeck {
        &self.deck
    }
}

#[async_trait]
impl Feature for AudioFeature {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    async fn on_start(&self, _ctx: &FeatureContext) -> Result<(), BridgeError> {
        let presets = index_presets(self.deck.presets_dir());
        info!(
            dir = %self.deck.presets_dir().display(),
            count = presets.len(),
            "audio presets indexed"
        );
        for preset in &presets {
            tracing::debug!(file = %preset.display(), "preset");
        }
        Ok(())
    }

    async fn on_bus_message(&self, _ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        match parse_audio_command(&message.text())? {
            AudioCommand::Play(prefix) => self.deck.play(&prefix),
            AudioCommand::Stop(prefix) => self.deck.stop(&prefix),
            AudioCommand::Fade(prefix) => self.deck.fade(&prefix),
        }
    }

    async fn on_shutdown(&self) {
        self.deck.release_all();
    }
}
