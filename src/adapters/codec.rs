//! Asset codec backed by external commands.
//!
//! Only `.BMP` and `.MBAC` entries are handed to the tools; everything else
//! passes through untouched.
//!
//! ```text
//! <normalizer...> --kind .BMP <input> <output>   exit 0: <output> holds plain bytes
//! <detector...> --kind .BMP <input>              exit 0: obfuscated, 1: plain
//! ```
//!
//! Any other detector exit status means the tool could not tell. A failing
//! normalizer leaves the bytes unchanged.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tracing::{debug, warn};

use super::AssetCodec;
use crate::domain::ResourceKind;

/// Codec running a normalizer and a detector as subprocesses
#[derive(Debug, Clone, Default)]
pub struct CommandCodec {
    /// Normalizer program followed by leading arguments
    normalizer: Vec<String>,

    /// Detector program followed by leading arguments
    detector: Vec<String>,
}

impl CommandCodec {
    pub fn new(normalizer: Vec<String>, detector: Vec<String>) -> Self {
        Self {
            normalizer,
            detector,
        }
    }

    fn handles(kind: &ResourceKind) -> bool {
        matches!(kind, ResourceKind::Bmp | ResourceKind::Mbac)
    }

    fn run(command: &[String], kind: &ResourceKind, paths: &[&Path]) -> Option<std::io::Result<Output>> {
        let (program, args) = command.split_first()?;
        let mut extra: Vec<OsString> = vec!["--kind".into(), kind.to_string().into()];
        extra.extend(paths.iter().map(|p| p.as_os_str().to_os_string()));

        debug!(program = %program, ?extra, "Spawning codec tool");

        Some(
            Command::new(program)
                .args(args)
                .args(extra)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
    }

    fn try_normalize(&self, data: &[u8], kind: &ResourceKind) -> std::io::Result<Option<Vec<u8>>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        std::fs::write(&input, data)?;

        let Some(result) = Self::run(&self.normalizer, kind, &[&input, &output]) else {
            return Ok(None);
        };
        let result = result?;
        if !result.status.success() {
            warn!(
                exit_code = result.status.code().unwrap_or(-1),
                stderr = %String::from_utf8_lossy(&result.stderr).trim(),
                "Normalizer failed, keeping original bytes"
            );
            return Ok(None);
        }

        Ok(Some(std::fs::read(&output)?))
    }
}

impl AssetCodec for CommandCodec {
    fn normalize(&self, data: &[u8], kind: &ResourceKind) -> Vec<u8> {
        if !Self::handles(kind) || self.normalizer.is_empty() {
            return data.to_vec();
        }
        match self.try_normalize(data, kind) {
            Ok(Some(normalized)) => normalized,
            Ok(None) => data.to_vec(),
            Err(e) => {
                warn!("Normalizer could not run, keeping original bytes: {}", e);
                data.to_vec()
            }
        }
    }

    fn is_obfuscated(&self, kind: &ResourceKind, data: &[u8]) -> Option<bool> {
        if !Self::handles(kind) || self.detector.is_empty() {
            return None;
        }

        let dir = tempfile::tempdir().ok()?;
        let input = dir.path().join("input");
        std::fs::write(&input, data).ok()?;

        match Self::run(&self.detector, kind, &[&input])? {
            Ok(output) => match output.status.code() {
                Some(0) => Some(true),
                Some(1) => Some(false),
                _ => None,
            },
            Err(e) => {
                warn!("Detector could not run: {}", e);
                None
            }
        }
    }
}
