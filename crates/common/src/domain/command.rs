//! Closed catalog of remote device commands.
//!
//! Every command an operator can send is a [`DeviceCommand`] variant. The
//! catalog owns parameter validation, the push payload shape, and the local
//! account mirror applied after a successful send, so request validation and
//! dispatch read from the same definition.

use crate::domain::account::DeviceStateChange;
use crate::domain::result::{DomainError, DomainResult};
use garde::Validate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// JSON object used for command parameters and acknowledgement metadata
pub type JsonMap = serde_json::Map<String, Value>;

pub const LOCK_DEVICE: &str = "LOCK_DEVICE";
pub const DISABLE_CAMERA: &str = "DISABLE_CAMERA";
pub const DISABLE_BLUETOOTH: &str = "DISABLE_BLUETOOTH";
pub const HIDE_APP: &str = "HIDE_APP";
pub const RESET_PASSWORD: &str = "RESET_PASSWORD";
pub const REMOVE_PASSWORD: &str = "REMOVE_PASSWORD";
pub const SET_WALLPAPER: &str = "SET_WALLPAPER";
pub const REMOVE_WALLPAPER: &str = "REMOVE_WALLPAPER";
pub const REQUEST_LOCATION: &str = "REQUEST_LOCATION";
pub const SHOW_MESSAGE: &str = "SHOW_MESSAGE";
pub const REBOOT_DEVICE: &str = "REBOOT_DEVICE";
pub const WIPE_DEVICE: &str = "WIPE_DEVICE";

/// Operator-facing action names accepted by [`DeviceCommand::parse`]
pub const COMMAND_ACTIONS: &[&str] = &[
    "lock",
    "unlock",
    "disable-camera",
    "enable-camera",
    "disable-bluetooth",
    "enable-bluetooth",
    "hide-app",
    "unhide-app",
    "reset-password",
    "remove-password",
    "set-wallpaper",
    "remove-wallpaper",
    "request-location",
    "show-message",
    "reboot-device",
    "wipe-device",
];

const REDACTED: &str = "********";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    LockDevice { state: bool },
    DisableCamera { state: bool },
    DisableBluetooth { state: bool },
    HideApp { state: bool },
    ResetPassword { password: String },
    RemovePassword,
    SetWallpaper { image_url: String },
    RemoveWallpaper,
    RequestLocation,
    ShowMessage { title: String, message: String },
    RebootDevice,
    WipeDevice,
}

#[derive(Debug, Deserialize, Validate)]
struct ResetPasswordParams {
    #[garde(length(min = 4, max = 32))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
struct SetWallpaperParams {
    #[garde(url, prefix("http"))]
    image_url: String,
}

#[derive(Debug, Deserialize, Validate)]
struct ShowMessageParams {
    #[garde(length(min = 1, max = 100))]
    title: String,
    #[garde(length(min = 1, max = 500))]
    message: String,
}

impl DeviceCommand {
    /// Resolve a command from an operator action (`lock`, `set-wallpaper`, ...)
    /// or a wire command name (`LOCK_DEVICE`, ...) and validate its parameters.
    ///
    /// Toggle commands addressed by wire name read their end state from the
    /// `state` parameter; action names imply it.
    pub fn parse(name: &str, params: &JsonMap) -> DomainResult<Self> {
        let command = match name {
            "lock" => DeviceCommand::LockDevice { state: true },
            "unlock" => DeviceCommand::LockDevice { state: false },
            "disable-camera" => DeviceCommand::DisableCamera { state: true },
            "enable-camera" => DeviceCommand::DisableCamera { state: false },
            "disable-bluetooth" => DeviceCommand::DisableBluetooth { state: true },
            "enable-bluetooth" => DeviceCommand::DisableBluetooth { state: false },
            "hide-app" => DeviceCommand::HideApp { state: true },
            "unhide-app" => DeviceCommand::HideApp { state: false },
            LOCK_DEVICE => DeviceCommand::LockDevice {
                state: required_state(params)?,
            },
            DISABLE_CAMERA => DeviceCommand::DisableCamera {
                state: required_state(params)?,
            },
            DISABLE_BLUETOOTH => DeviceCommand::DisableBluetooth {
                state: required_state(params)?,
            },
            HIDE_APP => DeviceCommand::HideApp {
                state: required_state(params)?,
            },
            "reset-password" | RESET_PASSWORD => {
                let p: ResetPasswordParams = parse_params(params)?;
                DeviceCommand::ResetPassword {
                    password: p.password,
                }
            }
            "remove-password" | REMOVE_PASSWORD => DeviceCommand::RemovePassword,
            "set-wallpaper" | SET_WALLPAPER => {
                let p: SetWallpaperParams = parse_params(params)?;
                DeviceCommand::SetWallpaper {
                    image_url: p.image_url,
                }
            }
            "remove-wallpaper" | REMOVE_WALLPAPER => DeviceCommand::RemoveWallpaper,
            "request-location" | REQUEST_LOCATION => DeviceCommand::RequestLocation,
            "show-message" | SHOW_MESSAGE => {
                let p: ShowMessageParams = parse_params(params)?;
                DeviceCommand::ShowMessage {
                    title: p.title,
                    message: p.message,
                }
            }
            "reboot-device" | REBOOT_DEVICE => DeviceCommand::RebootDevice,
            "wipe-device" | WIPE_DEVICE => DeviceCommand::WipeDevice,
            other => return Err(DomainError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    /// Wire command name carried in the push payload and the command log
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::LockDevice { .. } => LOCK_DEVICE,
            DeviceCommand::DisableCamera { .. } => DISABLE_CAMERA,
            DeviceCommand::DisableBluetooth { .. } => DISABLE_BLUETOOTH,
            DeviceCommand::HideApp { .. } => HIDE_APP,
            DeviceCommand::ResetPassword { .. } => RESET_PASSWORD,
            DeviceCommand::RemovePassword => REMOVE_PASSWORD,
            DeviceCommand::SetWallpaper { .. } => SET_WALLPAPER,
            DeviceCommand::RemoveWallpaper => REMOVE_WALLPAPER,
            DeviceCommand::RequestLocation => REQUEST_LOCATION,
            DeviceCommand::ShowMessage { .. } => SHOW_MESSAGE,
            DeviceCommand::RebootDevice => REBOOT_DEVICE,
            DeviceCommand::WipeDevice => WIPE_DEVICE,
        }
    }

    /// Human-readable label used in operator messages
    pub fn label(&self) -> &'static str {
        match self {
            DeviceCommand::LockDevice { state: true } => "Device lock",
            DeviceCommand::LockDevice { state: false } => "Device unlock",
            DeviceCommand::DisableCamera { state: true } => "Camera disable",
            DeviceCommand::DisableCamera { state: false } => "Camera enable",
            DeviceCommand::DisableBluetooth { state: true } => "Bluetooth disable",
            DeviceCommand::DisableBluetooth { state: false } => "Bluetooth enable",
            DeviceCommand::HideApp { state: true } => "Hide app",
            DeviceCommand::HideApp { state: false } => "Unhide app",
            DeviceCommand::ResetPassword { .. } => "Reset password",
            DeviceCommand::RemovePassword => "Remove password",
            DeviceCommand::SetWallpaper { .. } => "Set wallpaper",
            DeviceCommand::RemoveWallpaper => "Remove wallpaper",
            DeviceCommand::RequestLocation => "Location request",
            DeviceCommand::ShowMessage { .. } => "Show message",
            DeviceCommand::RebootDevice => "Reboot",
            DeviceCommand::WipeDevice => "Wipe device",
        }
    }

    /// Command-specific push data; every value is a string.
    fn data(&self, redact: bool) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        match self {
            DeviceCommand::LockDevice { state }
            | DeviceCommand::DisableCamera { state }
            | DeviceCommand::DisableBluetooth { state }
            | DeviceCommand::HideApp { state } => {
                data.insert("state".to_string(), state.to_string());
            }
            DeviceCommand::ResetPassword { password } => {
                let value = if redact { REDACTED } else { password.as_str() };
                data.insert("password".to_string(), value.to_string());
            }
            DeviceCommand::SetWallpaper { image_url } => {
                data.insert("image_url".to_string(), image_url.clone());
            }
            DeviceCommand::ShowMessage { title, message } => {
                data.insert("title".to_string(), title.clone());
                data.insert("message".to_string(), message.clone());
            }
            DeviceCommand::RemovePassword
            | DeviceCommand::RemoveWallpaper
            | DeviceCommand::RequestLocation
            | DeviceCommand::RebootDevice
            | DeviceCommand::WipeDevice => {}
        }
        data
    }

    /// Normalized push payload `{command, ...params}`
    pub fn payload(&self) -> CommandPayload {
        CommandPayload {
            command: self.name().to_string(),
            data: self.data(false),
        }
    }

    /// Parameters persisted on the command log. Secrets are redacted.
    pub fn log_params(&self) -> JsonMap {
        self.data(true)
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect()
    }

    /// Account mirror to apply once the push send succeeded
    pub fn state_change(&self) -> Option<DeviceStateChange> {
        match self {
            DeviceCommand::LockDevice { state } => Some(DeviceStateChange::DeviceLocked(*state)),
            DeviceCommand::DisableCamera { state } => {
                Some(DeviceStateChange::CameraDisabled(*state))
            }
            DeviceCommand::DisableBluetooth { state } => {
                Some(DeviceStateChange::BluetoothDisabled(*state))
            }
            DeviceCommand::HideApp { state } => Some(DeviceStateChange::AppHidden(*state)),
            DeviceCommand::ResetPassword { .. } => Some(DeviceStateChange::HasPassword(true)),
            DeviceCommand::RemovePassword => Some(DeviceStateChange::HasPassword(false)),
            DeviceCommand::SetWallpaper { image_url } => {
                Some(DeviceStateChange::CustomWallpaper(Some(image_url.clone())))
            }
            DeviceCommand::RemoveWallpaper => Some(DeviceStateChange::CustomWallpaper(None)),
            DeviceCommand::RequestLocation
            | DeviceCommand::ShowMessage { .. }
            | DeviceCommand::RebootDevice
            | DeviceCommand::WipeDevice => None,
        }
    }
}

/// Payload handed to the push sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPayload {
    pub command: String,
    pub data: BTreeMap<String, String>,
}

impl CommandPayload {
    /// Flatten into a single string map with the `command` key merged in
    pub fn to_data_map(&self) -> BTreeMap<String, String> {
        let mut map = self.data.clone();
        map.insert("command".to_string(), self.command.clone());
        map
    }
}

fn parse_params<T>(params: &JsonMap) -> DomainResult<T>
where
    T: serde::de::DeserializeOwned + Validate,
    T::Context: Default,
{
    let parsed: T = serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| DomainError::ValidationError(e.to_string()))?;
    crate::garde::validate_struct(&parsed)?;
    Ok(parsed)
}

fn required_state(params: &JsonMap) -> DomainResult<bool> {
    match params.get("state") {
        Some(Value::Bool(state)) => Ok(*state),
        Some(Value::String(s)) if s == "true" => Ok(true),
        Some(Value::String(s)) if s == "false" => Ok(false),
        Some(other) => Err(DomainError::ValidationError(format!(
            "state: expected boolean, got {}",
            other
        ))),
        None => Err(DomainError::ValidationError(
            "state: missing field".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> JsonMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_every_action_parses_with_valid_params() {
        let valid = params(json!({
            "password": "1234",
            "image_url": "https://cdn.example.com/wall.png",
            "title": "Hi",
            "message": "Pay now",
        }));

        for action in COMMAND_ACTIONS {
            let command = DeviceCommand::parse(action, &valid);
            assert!(command.is_ok(), "{action} failed: {:?}", command.err());
        }
    }

    #[test]
    fn test_unknown_command() {
        let result = DeviceCommand::parse("format-disk", &JsonMap::new());
        assert!(matches!(result, Err(DomainError::UnknownCommand(name)) if name == "format-disk"));
    }

    #[test]
    fn test_lock_payload_carries_state() {
        let command = DeviceCommand::parse("lock", &JsonMap::new()).unwrap();
        let payload = command.payload().to_data_map();

        assert_eq!(payload.get("command").map(String::as_str), Some(LOCK_DEVICE));
        assert_eq!(payload.get("state").map(String::as_str), Some("true"));
        assert_eq!(
            command.state_change(),
            Some(DeviceStateChange::DeviceLocked(true))
        );
    }

    #[test]
    fn test_unlock_shares_wire_name_with_lock() {
        let unlock = DeviceCommand::parse("unlock", &JsonMap::new()).unwrap();
        assert_eq!(unlock.name(), LOCK_DEVICE);
        assert_eq!(unlock.payload().data.get("state").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_wire_name_toggle_requires_state() {
        let missing = DeviceCommand::parse(LOCK_DEVICE, &JsonMap::new());
        assert!(matches!(missing, Err(DomainError::ValidationError(_))));

        let as_string =
            DeviceCommand::parse(DISABLE_CAMERA, &params(json!({"state": "false"}))).unwrap();
        assert_eq!(as_string, DeviceCommand::DisableCamera { state: false });

        let as_bool = DeviceCommand::parse(HIDE_APP, &params(json!({"state": true}))).unwrap();
        assert_eq!(as_bool, DeviceCommand::HideApp { state: true });
    }

    #[test]
    fn test_reset_password_requires_password() {
        let result = DeviceCommand::parse("reset-password", &JsonMap::new());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));

        let short = DeviceCommand::parse("reset-password", &params(json!({"password": "12"})));
        assert!(matches!(short, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_reset_password_is_redacted_in_log_params() {
        let command =
            DeviceCommand::parse("reset-password", &params(json!({"password": "4321"}))).unwrap();

        assert_eq!(
            command.payload().data.get("password").map(String::as_str),
            Some("4321")
        );
        assert_eq!(command.log_params().get("password"), Some(&json!(REDACTED)));
    }

    #[test]
    fn test_set_wallpaper_validates_url() {
        let bad = DeviceCommand::parse("set-wallpaper", &params(json!({"image_url": "not a url"})));
        assert!(matches!(bad, Err(DomainError::ValidationError(_))));

        let ok = DeviceCommand::parse(
            "set-wallpaper",
            &params(json!({"image_url": "https://cdn.example.com/wall.png"})),
        )
        .unwrap();
        assert_eq!(
            ok.state_change(),
            Some(DeviceStateChange::CustomWallpaper(Some(
                "https://cdn.example.com/wall.png".to_string()
            )))
        );
    }

    #[test]
    fn test_show_message_params() {
        let command = DeviceCommand::parse(
            "show-message",
            &params(json!({"title": "Hi", "message": "Pay now", "account_id": "acc-1"})),
        )
        .unwrap();

        assert_eq!(
            command,
            DeviceCommand::ShowMessage {
                title: "Hi".to_string(),
                message: "Pay now".to_string()
            }
        );
        assert!(command.state_change().is_none());

        let empty_title = DeviceCommand::parse(
            "show-message",
            &params(json!({"title": "", "message": "Pay now"})),
        );
        assert!(matches!(empty_title, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_commands_without_local_mirror() {
        for action in ["request-location", "reboot-device", "wipe-device"] {
            let command = DeviceCommand::parse(action, &JsonMap::new()).unwrap();
            assert!(command.state_change().is_none(), "{action}");
            assert!(command.log_params().is_empty(), "{action}");
        }
    }
}
