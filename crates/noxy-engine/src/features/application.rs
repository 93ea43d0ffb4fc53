use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use noxy_core::devices::AppLauncher;
use noxy_core::{BridgeError, BusMessage};

use crate::decoder::{parse_app_command, AppCommand};
use crate::feature::{Feature, FeatureContext};

/// Opens URLs and launches local applications on request.
pub struct ApplicationFeature {
    topic: String,
    launcher: Arc<dyn AppLauncher>,
}

impl ApplicationFeature {
    pub fn new(topic: impl Into<String>, launcher: Arc<dyn AppLauncher>) -> Self {
        Self {
            topic: topic.into(),
            launcher,
        }
    }
}

#[async_trait]
impl Feature for ApplicationFeature {
    fn name(&self) -> &'static str {
        "application"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    async fn on_bus_message(&self, _ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        match parse_app_command(&message.text())? {
            AppCommand::OpenUrl(url) => {
                info!(url = %url, "opening url");
                self.launcher.open_url(&url)?;
            }
            AppCommand::Launch(path) => {
                if !path.exists() {
                    return Err(BridgeError::NotFound(path.display().to_string()));
                }
                info!(path = %path.display(), "launching application");
                self.launcher.launch(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::context;
    use noxy_core::testing::{DeviceOp, RecordingDevices};

    #[tokio::test]
    async fn web_and_app_commands() {
        let (_, _, ctx) = context().await;
        let devices = RecordingDevices::new();
        let f = ApplicationFeature::new("/noxyred/app", Arc::new(devices.clone()));
        let app = tempfile::NamedTempFile::new().unwrap();

        let web = BusMessage::new("/noxyred/app", r#"{"type":"web","value":"https://example.com"}"#);
        f.on_bus_message(&ctx, &web).await.unwrap();

        let launch = BusMessage::new(
            "/noxyred/app",
            serde_json::json!({"Type": "app", "Value": app.path()}).to_string(),
        );
        f.on_bus_message(&ctx, &launch).await.unwrap();

        let missing = BusMessage::new(
            "/noxyred/app",
            r#"{"type":"app","value":"/definitely/not/here.exe"}"#,
        );
        assert!(matches!(
            f.on_bus_message(&ctx, &missing).await,
            Err(BridgeError::NotFound(_))
        ));

        assert_eq!(
            devices.ops(),
            vec![
                DeviceOp::OpenUrl("https://example.com/".into()),
                DeviceOp::Launch(app.path().to_path_buf())
            ]
        );
    }
}
