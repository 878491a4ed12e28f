//! Payload and asset discovery inside an HTML recording.
//!
//! A recording is a self-contained HTML page. Each command is embedded as
//! `fetch("data:application/octet-binary;base64,<msgpack>")` and assets
//! live in a `casAssets` table, written either as one object literal or
//! as individual assignments.

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::command::{Command, CommandError, CommandKind};
use crate::animation::{payload_fps, DEFAULT_RECORDING_FPS};

static FETCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"fetch\s*\(\s*["']data:application/octet-binary;base64,([A-Za-z0-9+/=]+)["']\s*\)"#,
    )
    .expect("fetch pattern is valid")
});

static CAS_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)var\s+casAssets\s*=\s*(\{.*?\})\s*;").expect("casAssets pattern is valid")
});

static CAS_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"\s*:\s*"([^"]*)""#).expect("entry pattern is valid"));

static CAS_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"casAssets\["([^"]+)"\]\s*=\s*"([^"]*)""#).expect("assignment pattern is valid")
});

/// Errors that can occur while loading a whole recording.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no embedded command payloads found")]
    NoPayloads,
}

/// Result type for recording loads.
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Counts of what was found and what was skipped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub payloads_found: usize,
    /// Payloads whose base64 text did not decode
    pub payload_failures: usize,
    /// Payloads that were not valid msgpack, or not a command map
    pub decode_failures: usize,
    pub unknown_commands: usize,
    pub commands: usize,
}

/// Find and base64-decode every embedded command payload, in document order.
pub fn extract_payloads(document: &str) -> Vec<Vec<u8>> {
    extract_payloads_counted(document, &mut ExtractionStats::default())
}

fn extract_payloads_counted(document: &str, stats: &mut ExtractionStats) -> Vec<Vec<u8>> {
    let mut payloads = Vec::new();
    for (i, caps) in FETCH.captures_iter(document).enumerate() {
        stats.payloads_found += 1;
        match STANDARD.decode(&caps[1]) {
            Ok(bytes) => payloads.push(bytes),
            Err(e) => {
                stats.payload_failures += 1;
                log::warn!("skipping payload #{}: bad base64: {}", i, e);
            }
        }
    }
    payloads
}

/// Collect the `casAssets` key to data-URI table.
///
/// Both the object-literal form and individual assignments are read; on a
/// key collision the assignment that appears later wins.
pub fn extract_asset_table(document: &str) -> HashMap<String, String> {
    let mut assets = HashMap::new();

    if let Some(caps) = CAS_OBJECT.captures(document) {
        let body = caps.get(1).map_or("", |m| m.as_str());
        for entry in CAS_ENTRY.captures_iter(body) {
            assets.insert(entry[1].to_string(), entry[2].to_string());
        }
    }
    for entry in CAS_ASSIGNMENT.captures_iter(document) {
        assets.insert(entry[1].to_string(), entry[2].to_string());
    }

    assets
}

/// Decode payloads into commands, skipping any that fail.
pub fn parse_commands(payloads: &[Vec<u8>]) -> Vec<Command> {
    parse_commands_counted(payloads, &mut ExtractionStats::default())
}

fn parse_commands_counted(payloads: &[Vec<u8>], stats: &mut ExtractionStats) -> Vec<Command> {
    let mut commands = Vec::with_capacity(payloads.len());
    for (i, payload) in payloads.iter().enumerate() {
        match Command::from_bytes(payload) {
            Ok(cmd) => commands.push(cmd),
            Err(CommandError::UnknownCommandType(name)) => {
                stats.unknown_commands += 1;
                log::warn!("skipping payload #{}: unknown command type {:?}", i, name);
            }
            Err(e) => {
                stats.decode_failures += 1;
                log::warn!("skipping payload #{}: {}", i, e);
            }
        }
    }
    stats.commands = commands.len();
    commands
}

/// A parsed recording: ordered commands plus the asset table.
#[derive(Clone, Debug)]
pub struct Recording {
    pub commands: Vec<Command>,
    pub assets: HashMap<String, String>,
    /// Frame rate of the first animation in the stream
    pub animation_fps: f64,
    pub stats: ExtractionStats,
}

impl Recording {
    /// Extract everything from an HTML document.
    pub fn from_html(document: &str) -> RecordingResult<Self> {
        let mut stats = ExtractionStats::default();
        let payloads = extract_payloads_counted(document, &mut stats);
        if stats.payloads_found == 0 {
            return Err(RecordingError::NoPayloads);
        }

        let commands = parse_commands_counted(&payloads, &mut stats);
        let assets = extract_asset_table(document);

        let animation_fps = commands
            .iter()
            .filter(|cmd| cmd.kind == CommandKind::SetAnimation)
            .find_map(|cmd| payload_fps(&cmd.payload))
            .unwrap_or(DEFAULT_RECORDING_FPS);

        log::info!(
            "recording: {} payload(s), {} command(s), {} asset(s), {} fps",
            stats.payloads_found,
            stats.commands,
            assets.len(),
            animation_fps
        );

        Ok(Self {
            commands,
            assets,
            animation_fps,
            stats,
        })
    }

    /// Read and extract a recording from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> RecordingResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_html(&text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::msgpack::testing::{encode, map};
    use crate::msgpack::Value;

    /// Wrap msgpack payloads in the page layout a recording uses.
    pub(crate) fn html_with(payloads: &[Vec<u8>], assets: &str) -> String {
        let mut doc = String::from("<html><script>\n");
        doc.push_str(assets);
        for p in payloads {
            doc.push_str(&format!(
                "fetch(\"data:application/octet-binary;base64,{}\")\n",
                STANDARD.encode(p)
            ));
        }
        doc.push_str("</script></html>");
        doc
    }

    fn cmd(kind: &str, path: &str) -> Vec<u8> {
        encode(&map(vec![("type", kind.into()), ("path", path.into())]))
    }

    #[test]
    fn test_extract_payloads_in_order() {
        let doc = html_with(&[cmd("delete", "/a"), cmd("delete", "/b")], "");
        let payloads = extract_payloads(&doc);
        assert_eq!(payloads.len(), 2);
        let cmds = parse_commands(&payloads);
        assert_eq!(cmds[0].path, "/a");
        assert_eq!(cmds[1].path, "/b");
    }

    #[test]
    fn test_single_quotes_and_spacing() {
        let doc = "fetch( 'data:application/octet-binary;base64,wA==' )";
        assert_eq!(extract_payloads(doc), vec![vec![0xc0]]);
    }

    #[test]
    fn test_asset_table_both_forms_later_wins() {
        let doc = r#"
            var casAssets = {"cas-v1/a": "data:text/plain,one", "cas-v1/b": "data:text/plain,two"};
            casAssets["cas-v1/b"] = "data:text/plain,three";
            casAssets["cas-v1/c"] = "data:text/plain,four";
        "#;
        let table = extract_asset_table(doc);
        assert_eq!(table.len(), 3);
        assert_eq!(table["cas-v1/a"], "data:text/plain,one");
        assert_eq!(table["cas-v1/b"], "data:text/plain,three");
        assert_eq!(table["cas-v1/c"], "data:text/plain,four");
    }

    #[test]
    fn test_bad_payloads_are_skipped_and_counted() {
        let payloads = vec![
            cmd("set_transform", "/ok"),
            vec![0xc1],
            encode(&Value::UInt(1)),
            cmd("teleport", "/x"),
            cmd("delete", "/ok2"),
        ];
        let doc = html_with(&payloads, "");
        let rec = Recording::from_html(&doc).unwrap();
        assert_eq!(rec.commands.len(), 2);
        assert_eq!(
            rec.stats,
            ExtractionStats {
                payloads_found: 5,
                payload_failures: 0,
                decode_failures: 2,
                unknown_commands: 1,
                commands: 2,
            }
        );
    }

    #[test]
    fn test_bad_base64_is_counted_and_skipped() {
        let good = STANDARD.encode(cmd("delete", "/after"));
        let doc = format!(
            "fetch(\"data:application/octet-binary;base64,A=\")\n\
             fetch(\"data:application/octet-binary;base64,{}\")",
            good
        );
        let rec = Recording::from_html(&doc).unwrap();
        assert_eq!(rec.stats.payloads_found, 2);
        assert_eq!(rec.stats.payload_failures, 1);
        assert_eq!(rec.stats.decode_failures, 0);
        assert_eq!(rec.commands.len(), 1);
        assert_eq!(rec.commands[0].path, "/after");
    }

    #[test]
    fn test_no_payloads() {
        assert!(matches!(
            Recording::from_html("<html>nothing here</html>"),
            Err(RecordingError::NoPayloads)
        ));
    }

    #[test]
    fn test_recording_fps_from_first_animation() {
        let anim = |opts: Value| {
            encode(&map(vec![
                ("type", "set_animation".into()),
                ("animations", Value::Array(vec![])),
                ("options", opts),
            ]))
        };
        let doc = html_with(
            &[
                cmd("delete", "/a"),
                anim(map(vec![])),
                anim(map(vec![("play_fps", Value::UInt(25))])),
                anim(map(vec![("fps", Value::UInt(50))])),
            ],
            "",
        );
        let rec = Recording::from_html(&doc).unwrap();
        assert_eq!(rec.animation_fps, 25.0);

        let doc = html_with(&[cmd("delete", "/a")], "");
        assert_eq!(Recording::from_html(&doc).unwrap().animation_fps, 64.0);
    }
}
