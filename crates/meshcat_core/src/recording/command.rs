//! Typed scene commands.

use std::fmt;

use thiserror::Error;

use crate::msgpack::{DecodeError, Value};

/// Errors that can occur while turning a payload into a [`Command`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("payload is not a map")]
    NotAMap,

    #[error("payload has no \"type\" string")]
    MissingType,

    #[error("unknown command type: {0}")]
    UnknownCommandType(String),
}

/// Result type for command parsing.
pub type CommandResult<T> = Result<T, CommandError>;

/// The closed set of commands in a meshcat stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SetObject,
    SetTransform,
    Delete,
    SetProperty,
    SetAnimation,
    CaptureImage,
    SetRenderCallback,
}

impl CommandKind {
    /// Parse the wire name of a command type.
    pub fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "set_object" => CommandKind::SetObject,
            "set_transform" => CommandKind::SetTransform,
            "delete" => CommandKind::Delete,
            "set_property" => CommandKind::SetProperty,
            "set_animation" => CommandKind::SetAnimation,
            "capture_image" => CommandKind::CaptureImage,
            "set_render_callback" => CommandKind::SetRenderCallback,
            _ => return None,
        })
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            CommandKind::SetObject => "set_object",
            CommandKind::SetTransform => "set_transform",
            CommandKind::Delete => "delete",
            CommandKind::SetProperty => "set_property",
            CommandKind::SetAnimation => "set_animation",
            CommandKind::CaptureImage => "capture_image",
            CommandKind::SetRenderCallback => "set_render_callback",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One decoded command. The payload is the whole decoded map, including
/// the `type` and `path` entries.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub path: String,
    pub payload: Value,
}

impl Command {
    /// Validate a decoded value and tag it with its command kind.
    pub fn from_value(value: Value) -> CommandResult<Self> {
        if !value.is_map() {
            return Err(CommandError::NotAMap);
        }
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CommandError::MissingType)?;
        let kind = CommandKind::from_wire(type_name)
            .ok_or_else(|| CommandError::UnknownCommandType(type_name.to_string()))?;
        let path = value
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            kind,
            path,
            payload: value,
        })
    }

    /// Decode raw payload bytes straight into a command.
    pub fn from_bytes(bytes: &[u8]) -> CommandResult<Self> {
        Self::from_value(crate::msgpack::decode(bytes)?)
    }

    /// Shorthand for `self.payload.get(key)`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgpack::testing::{encode, map};

    #[test]
    fn test_from_value() {
        let cmd = Command::from_value(map(vec![
            ("type", "set_transform".into()),
            ("path", "/a/b".into()),
        ]))
        .unwrap();
        assert_eq!(cmd.kind, CommandKind::SetTransform);
        assert_eq!(cmd.path, "/a/b");
    }

    #[test]
    fn test_path_defaults_to_empty() {
        let cmd = Command::from_value(map(vec![("type", "set_animation".into())])).unwrap();
        assert_eq!(cmd.kind, CommandKind::SetAnimation);
        assert_eq!(cmd.path, "");
    }

    #[test]
    fn test_rejects_bad_payloads() {
        assert_eq!(
            Command::from_value(Value::UInt(3)),
            Err(CommandError::NotAMap)
        );
        assert_eq!(
            Command::from_value(map(vec![("path", "/x".into())])),
            Err(CommandError::MissingType)
        );
        assert_eq!(
            Command::from_value(map(vec![("type", "explode".into())])),
            Err(CommandError::UnknownCommandType("explode".into()))
        );
    }

    #[test]
    fn test_from_bytes() {
        let bytes = encode(&map(vec![("type", "delete".into()), ("path", "/gone".into())]));
        let cmd = Command::from_bytes(&bytes).unwrap();
        assert_eq!(cmd.kind, CommandKind::Delete);
        assert_eq!(cmd.field("path").and_then(Value::as_str), Some("/gone"));

        assert!(matches!(
            Command::from_bytes(&[0xc1]),
            Err(CommandError::Decode(DecodeError::UnknownFormatByte { .. }))
        ));
    }

    #[test]
    fn test_wire_names_round_trip() {
        for kind in [
            CommandKind::SetObject,
            CommandKind::SetTransform,
            CommandKind::Delete,
            CommandKind::SetProperty,
            CommandKind::SetAnimation,
            CommandKind::CaptureImage,
            CommandKind::SetRenderCallback,
        ] {
            assert_eq!(CommandKind::from_wire(kind.as_wire()), Some(kind));
        }
    }
}
