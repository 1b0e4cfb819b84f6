//! Operator-supplied messages embedded in mined blocks.
//!
//! The messages file holds one base64 message per line. Each found block
//! moves to the next message; the position survives restarts in
//! `miner_conf.json`, stored next to the messages file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tracing::prelude::*;

pub const MINER_CONF_FILE: &str = "miner_conf.json";

#[derive(Debug, Error)]
pub enum ExtraMessagesError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line} of the extra messages file is not valid base64")]
    Decode {
        line: usize,
        #[source]
        source: base64::DecodeError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode miner configuration: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted rotation record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct MinerConf {
    current_extra_message_index: u64,
}

/// Rotation through the extra messages.
///
/// The index may run past the end of the list; from then on blocks carry no
/// message.
#[derive(Debug, Default)]
pub struct ExtraNonceRotation {
    messages: Vec<Vec<u8>>,
    index: u64,
    /// `None` when rotation is off: no messages file, or a rotation record
    /// that could not be read.
    conf_path: Option<PathBuf>,
}

impl ExtraNonceRotation {
    /// Rotation without messages. Every block carries an empty extra nonce.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Load `messages_file` and the rotation record beside it.
    ///
    /// A missing record starts at index zero. An unreadable or malformed
    /// record disables rotation rather than failing.
    pub fn load(messages_file: &Path) -> Result<Self, ExtraMessagesError> {
        let text = fs::read_to_string(messages_file).map_err(|e| ExtraMessagesError::Read {
            path: messages_file.to_path_buf(),
            source: e,
        })?;
        let messages = parse_messages(&text)?;

        let conf_path = messages_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(MINER_CONF_FILE);

        let rotation = match load_conf(&conf_path) {
            Ok(conf) => Self {
                messages,
                index: conf.current_extra_message_index,
                conf_path: Some(conf_path),
            },
            Err(e) => {
                warn!(error = %e, "Extra message rotation disabled");
                Self {
                    messages,
                    index: 0,
                    conf_path: None,
                }
            }
        };

        info!(
            messages = rotation.messages.len(),
            index = rotation.index,
            "Loaded extra messages"
        );
        Ok(rotation)
    }

    pub fn is_enabled(&self) -> bool {
        self.conf_path.is_some()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Message for the next template, empty if none applies.
    pub fn current(&self) -> &[u8] {
        if !self.is_enabled() {
            return &[];
        }
        usize::try_from(self.index)
            .ok()
            .and_then(|i| self.messages.get(i))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Move to the next message ahead of submitting a block.
    pub fn advance(&mut self) {
        if self.is_enabled() {
            self.index = self.index.saturating_add(1);
        }
    }

    /// Undo [`advance`](Self::advance) after the node rejected the block.
    pub fn rollback(&mut self) {
        if self.is_enabled() {
            self.index = self.index.saturating_sub(1);
        }
    }

    /// Write the current index to the rotation record.
    pub fn persist(&self) -> Result<(), ExtraMessagesError> {
        let Some(path) = &self.conf_path else {
            return Ok(());
        };
        let conf = MinerConf {
            current_extra_message_index: self.index,
        };
        let json = serde_json::to_string_pretty(&conf)?;
        fs::write(path, json).map_err(|e| ExtraMessagesError::Write {
            path: path.clone(),
            source: e,
        })
    }
}

/// One base64 message per line. Blank lines and messages decoding to `"0"`
/// are "no message" slots that still take an index.
pub fn parse_messages(text: &str) -> Result<Vec<Vec<u8>>, ExtraMessagesError> {
    text.lines()
        .enumerate()
        .map(|(n, line)| {
            let line = line.trim();
            if line.is_empty() {
                return Ok(Vec::new());
            }
            let decoded = STANDARD
                .decode(line)
                .map_err(|e| ExtraMessagesError::Decode {
                    line: n + 1,
                    source: e,
                })?;
            Ok(if decoded == b"0" { Vec::new() } else { decoded })
        })
        .collect()
}

fn load_conf(path: &Path) -> Result<MinerConf, String> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(MinerConf::default()),
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Fresh scratch directory under the system temp dir.
    fn scratch_dir() -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "adaptive-miner-extra-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_messages(dir: &Path, messages: &[&str]) -> PathBuf {
        let path = dir.join("messages.txt");
        let body: Vec<String> = messages.iter().map(|m| STANDARD.encode(m)).collect();
        fs::write(&path, body.join("\n")).unwrap();
        path
    }

    #[test]
    fn parse_keeps_blank_and_zero_slots() {
        let text = format!(
            "{}\n\n   \n  {}  \n{}\n",
            STANDARD.encode("hello"),
            STANDARD.encode("0"),
            STANDARD.encode("world")
        );
        let messages = parse_messages(&text).unwrap();
        assert_eq!(
            messages,
            vec![
                b"hello".to_vec(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                b"world".to_vec()
            ]
        );
    }

    #[test]
    fn parse_reports_bad_line() {
        let text = format!("{}\nnot base64!\n", STANDARD.encode("ok"));
        match parse_messages(&text) {
            Err(ExtraMessagesError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn blank_line_keeps_later_indices() {
        let dir = scratch_dir();
        let path = dir.join("messages.txt");
        fs::write(
            &path,
            format!("{}\n\n{}\n", STANDARD.encode("first"), STANDARD.encode("third")),
        )
        .unwrap();
        fs::write(
            dir.join(MINER_CONF_FILE),
            r#"{"current_extra_message_index": 2}"#,
        )
        .unwrap();

        let mut rotation = ExtraNonceRotation::load(&path).unwrap();
        assert_eq!(rotation.len(), 3);
        assert_eq!(rotation.current(), b"third");
        rotation.rollback();
        assert!(rotation.current().is_empty());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn disabled_rotation_is_inert() {
        let mut rotation = ExtraNonceRotation::disabled();
        assert!(!rotation.is_enabled());
        rotation.advance();
        assert_eq!(rotation.index(), 0);
        assert!(rotation.current().is_empty());
        rotation.persist().unwrap();
    }

    #[test]
    fn index_round_trips_through_conf_file() {
        let dir = scratch_dir();
        let path = write_messages(&dir, &["first", "second", "third"]);

        let mut rotation = ExtraNonceRotation::load(&path).unwrap();
        assert!(rotation.is_enabled());
        assert_eq!(rotation.len(), 3);
        assert_eq!(rotation.current(), b"first");

        rotation.advance();
        rotation.advance();
        rotation.persist().unwrap();

        let reloaded = ExtraNonceRotation::load(&path).unwrap();
        assert_eq!(reloaded.index(), 2);
        assert_eq!(reloaded.current(), b"third");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn rollback_undoes_advance() {
        let dir = scratch_dir();
        let path = write_messages(&dir, &["a", "b"]);

        let mut rotation = ExtraNonceRotation::load(&path).unwrap();
        rotation.advance();
        assert_eq!(rotation.current(), b"b");
        rotation.rollback();
        assert_eq!(rotation.current(), b"a");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn exhausted_rotation_carries_no_message() {
        let dir = scratch_dir();
        let path = write_messages(&dir, &["only"]);

        let mut rotation = ExtraNonceRotation::load(&path).unwrap();
        rotation.advance();
        assert_eq!(rotation.index(), 1);
        assert!(rotation.current().is_empty());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn corrupt_conf_disables_rotation() {
        let dir = scratch_dir();
        let path = write_messages(&dir, &["msg"]);
        fs::write(dir.join(MINER_CONF_FILE), "{ not json").unwrap();

        let mut rotation = ExtraNonceRotation::load(&path).unwrap();
        assert!(!rotation.is_enabled());
        assert!(rotation.current().is_empty());

        // Persisting must not clobber the operator's file.
        rotation.advance();
        rotation.persist().unwrap();
        assert_eq!(
            fs::read_to_string(dir.join(MINER_CONF_FILE)).unwrap(),
            "{ not json"
        );

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_messages_file_is_an_error() {
        let dir = scratch_dir();
        let result = ExtraNonceRotation::load(&dir.join("absent.txt"));
        assert!(matches!(result, Err(ExtraMessagesError::Read { .. })));
        fs::remove_dir_all(dir).unwrap();
    }
}
