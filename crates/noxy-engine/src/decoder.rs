//! Compact device-command grammars carried on the raw-command topics.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use url::Url;

use noxy_core::devices::KeyboardDriver;
use noxy_core::wire::from_json_ci;
use noxy_core::BridgeError;

/// How long a lone key is held.
pub const SINGLE_KEY_HOLD: Duration = Duration::from_millis(100);
/// Gap between consecutive presses or releases of a combination.
pub const KEY_STAGGER: Duration = Duration::from_millis(50);
/// How long a full combination is held.
pub const COMBO_HOLD: Duration = Duration::from_millis(200);
/// Press-to-release time of a joystick button.
pub const BUTTON_PULSE: Duration = Duration::from_millis(100);

/// Virtual key codes in press order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySequence(Vec<u32>);

/// One step of a key sequence's execution plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStep {
    Press(u32),
    Release(u32),
    Wait(Duration),
}

fn parse_key_code(token: &str) -> Option<u32> {
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

/// Parse `0x41,0x42` or `[17, 0x43]`. Bad tokens are skipped with a warning.
pub fn parse_key_sequence(payload: &str) -> Result<KeySequence, BridgeError> {
    let body = payload.trim().trim_start_matches('[').trim_end_matches(']');
    let mut codes = Vec::new();
    for token in body.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match parse_key_code(token) {
            Some(code) => codes.push(code),
            None => warn!(token, "skipping unparseable key code"),
        }
    }
    if codes.is_empty() {
        return Err(BridgeError::invalid(format!("no valid key codes in {payload:?}")));
    }
    Ok(KeySequence(codes))
}

impl KeySequence {
    pub fn codes(&self) -> &[u32] {
        &self.0
    }

    /// Single key: press, hold, release. Combination: press in order,
    /// hold, release in reverse so modifiers wrap the key.
    pub fn steps(&self) -> Vec<KeyStep> {
        if let [code] = self.0.as_slice() {
            return vec![
                KeyStep::Press(*code),
                KeyStep::Wait(SINGLE_KEY_HOLD),
                KeyStep::Release(*code),
            ];
        }

        let mut steps = Vec::with_capacity(self.0.len() * 4 + 1);
        for code in &self.0 {
            steps.push(KeyStep::Press(*code));
            steps.push(KeyStep::Wait(KEY_STAGGER));
        }
        steps.push(KeyStep::Wait(COMBO_HOLD));
        for code in self.0.iter().rev() {
            steps.push(KeyStep::Release(*code));
            steps.push(KeyStep::Wait(KEY_STAGGER));
        }
        steps
    }

    /// Play the sequence on `driver`. If a press fails, keys already held
    /// are released in reverse before the error is returned.
    pub async fn execute(&self, driver: &dyn KeyboardDriver) -> Result<(), BridgeError> {
        let mut held: Vec<u32> = Vec::new();
        for step in self.steps() {
            let result = match step {
                KeyStep::Press(code) => driver.press_key(code).map(|()| held.push(code)),
                KeyStep::Release(code) => driver.release_key(code).map(|()| held.retain(|c| *c != code)),
                KeyStep::Wait(d) => {
                    tokio::time::sleep(d).await;
                    Ok(())
                }
            };
            if let Err(e) = result {
                for code in held.iter().rev() {
                    let _ = driver.release_key(*code);
                }
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// Parse `button:<n>` and check `n` against `1..=button_count`.
pub fn parse_button(payload: &str, button_count: u32) -> Result<u32, BridgeError> {
    let payload = payload.trim();
    let number = strip_prefix_ci(payload, "button:")
        .map(str::trim)
        .ok_or_else(|| BridgeError::invalid(format!("expected button:<n>, got {payload:?}")))?;
    let value: u64 = number
        .parse()
        .map_err(|_| BridgeError::invalid(format!("invalid button number: {number:?}")))?;
    if value < 1 || value > u64::from(button_count) {
        return Err(BridgeError::OutOfRange {
            value,
            max: button_count,
        });
    }
    Ok(value as u32)
}

/// A sound-effect command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioCommand {
    /// Start the first preset whose file name begins with the prefix.
    Play(String),
    Stop(String),
    Fade(String),
}

impl AudioCommand {
    pub fn prefix(&self) -> &str {
        match self {
            Self::Play(p) | Self::Stop(p) | Self::Fade(p) => p,
        }
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &s[prefix.len()..])
}

pub fn parse_audio_command(payload: &str) -> Result<AudioCommand, BridgeError> {
    let payload = payload.trim();
    let command = if let Some(rest) = strip_prefix_ci(payload, "stop:") {
        AudioCommand::Stop(rest.trim().to_string())
    } else if let Some(rest) = strip_prefix_ci(payload, "fade:") {
        AudioCommand::Fade(rest.trim().to_string())
    } else if payload.starts_with("p_") {
        AudioCommand::Play(payload.to_string())
    } else {
        return Err(BridgeError::invalid(format!("unrecognized audio command: {payload:?}")));
    };
    if command.prefix().is_empty() {
        return Err(BridgeError::invalid("audio command needs a prefix"));
    }
    Ok(command)
}

/// Something to open on the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppCommand {
    OpenUrl(Url),
    Launch(PathBuf),
}

#[derive(Deserialize)]
struct RawAppCommand {
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<String>,
}

/// Parse `{"type": "web"|"app", "value": "..."}`.
///
/// Whether an app path exists is checked when it is launched, not here.
pub fn parse_app_command(payload: &str) -> Result<AppCommand, BridgeError> {
    let raw: RawAppCommand = from_json_ci(payload)?;
    let value = raw
        .value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BridgeError::invalid("application value is required"))?;

    match raw.kind.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("web") => Url::parse(&value)
            .map(AppCommand::OpenUrl)
            .map_err(|e| BridgeError::invalid(format!("invalid url {value:?}: {e}"))),
        Some("app") => Ok(AppCommand::Launch(PathBuf::from(value))),
        Some(other) => Err(BridgeError::invalid(format!("unknown application type: {other}"))),
        None => Err(BridgeError::invalid("application type is required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noxy_core::devices::DeviceError;
    use noxy_core::testing::{DeviceOp, RecordingDevices};

    #[test]
    fn hex_and_decimal_codes() {
        assert_eq!(parse_key_sequence("0x41,0x42").unwrap().codes(), &[65, 66]);
        assert_eq!(parse_key_sequence("[17, 0X43]").unwrap().codes(), &[17, 67]);
    }

    #[test]
    fn bad_tokens_are_skipped() {
        assert_eq!(parse_key_sequence("0x41,zz,,66").unwrap().codes(), &[65, 66]);
        assert!(matches!(
            parse_key_sequence("zz,0xq"),
            Err(BridgeError::InvalidPayload(_))
        ));
        assert!(parse_key_sequence("[]").is_err());
    }

    #[test]
    fn single_key_plan() {
        let seq = parse_key_sequence("13").unwrap();
        assert_eq!(
            seq.steps(),
            vec![
                KeyStep::Press(13),
                KeyStep::Wait(SINGLE_KEY_HOLD),
                KeyStep::Release(13)
            ]
        );
    }

    #[test]
    fn combination_releases_in_reverse() {
        let seq = parse_key_sequence("0x41,0x42").unwrap();
        let keys: Vec<KeyStep> = seq
            .steps()
            .into_iter()
            .filter(|s| !matches!(s, KeyStep::Wait(_)))
            .collect();
        assert_eq!(
            keys,
            vec![
                KeyStep::Press(65),
                KeyStep::Press(66),
                KeyStep::Release(66),
                KeyStep::Release(65)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn execute_drives_keyboard() {
        let devices = RecordingDevices::new();
        let start = tokio::time::Instant::now();
        parse_key_sequence("0x41,0x42")
            .unwrap()
            .execute(&devices)
            .await
            .unwrap();
        assert_eq!(
            devices.ops(),
            vec![
                DeviceOp::KeyDown(65),
                DeviceOp::KeyDown(66),
                DeviceOp::KeyUp(66),
                DeviceOp::KeyUp(65)
            ]
        );
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    struct StuckKeyboard {
        inner: RecordingDevices,
    }

    impl KeyboardDriver for StuckKeyboard {
        fn press_key(&self, code: u32) -> Result<(), DeviceError> {
            if code == 66 {
                return Err(DeviceError("key jammed".into()));
            }
            self.inner.press_key(code)
        }

        fn release_key(&self, code: u32) -> Result<(), DeviceError> {
            self.inner.release_key(code)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_press_releases_held_keys() {
        let keyboard = StuckKeyboard {
            inner: RecordingDevices::new(),
        };
        let err = parse_key_sequence("65,66,67")
            .unwrap()
            .execute(&keyboard)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Device(_)));
        assert_eq!(
            keyboard.inner.ops(),
            vec![DeviceOp::KeyDown(65), DeviceOp::KeyUp(65)]
        );
    }

    #[test]
    fn button_range() {
        assert_eq!(parse_button("button:3", 4).unwrap(), 3);
        assert_eq!(parse_button("BUTTON: 4", 4).unwrap(), 4);
        assert!(matches!(
            parse_button("button:5", 4),
            Err(BridgeError::OutOfRange { value: 5, max: 4 })
        ));
        assert!(matches!(
            parse_button("button:0", 4),
            Err(BridgeError::OutOfRange { value: 0, .. })
        ));
        assert!(matches!(
            parse_button("button:-1", 4),
            Err(BridgeError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_button("axis:1", 4),
            Err(BridgeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn audio_grammar() {
        assert_eq!(
            parse_audio_command("p_rain").unwrap(),
            AudioCommand::Play("p_rain".into())
        );
        assert_eq!(
            parse_audio_command("stop:p_rain").unwrap(),
            AudioCommand::Stop("p_rain".into())
        );
        assert_eq!(
            parse_audio_command("FADE: p_rain").unwrap(),
            AudioCommand::Fade("p_rain".into())
        );
        assert!(parse_audio_command("stop:").is_err());
        assert!(parse_audio_command("rain").is_err());
    }

    #[test]
    fn app_grammar() {
        assert_eq!(
            parse_app_command(r#"{"Type":"web","Value":"https://example.com/x"}"#).unwrap(),
            AppCommand::OpenUrl(Url::parse("https://example.com/x").unwrap())
        );
        assert_eq!(
            parse_app_command(r#"{"type":"APP","value":"/usr/bin/true"}"#).unwrap(),
            AppCommand::Launch(PathBuf::from("/usr/bin/true"))
        );
        assert!(parse_app_command(r#"{"type":"web","value":"not a url"}"#).is_err());
        assert!(parse_app_command(r#"{"type":"fax","value":"x"}"#).is_err());
        assert!(parse_app_command(r#"{"type":"app"}"#).is_err());
    }
}
