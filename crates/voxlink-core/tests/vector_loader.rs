//! Loads the JSON vectors under `tests/vectors/`.
//!
//! A vector holds raw inbound bytes plus either an `expect` block or the
//! error code the bytes must produce.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::path::Path;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Vector {
    pub description: String,
    #[serde(rename = "frame")]
    input: Input,
    /// `handshake` when the record arrives before the handshake response.
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub expect: Value,
    #[serde(default, rename = "expect_error")]
    failure: Option<Failure>,
}

#[derive(Debug, Deserialize)]
struct Failure {
    code: String,
}

/// Wire bytes, written in whichever encoding keeps the file readable.
#[derive(Debug, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
enum Input {
    Utf8(String),
    Base64(String),
    Hex(String),
}

impl Vector {
    pub fn bytes(&self) -> Vec<u8> {
        match &self.input {
            Input::Utf8(s) => s.as_bytes().to_vec(),
            Input::Base64(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .unwrap_or_else(|e| panic!("{}: bad base64: {e}", self.description)),
            Input::Hex(s) => hex::decode(s)
                .unwrap_or_else(|e| panic!("{}: bad hex: {e}", self.description)),
        }
    }

    /// Expected error code, when the vector describes a failure.
    pub fn error_code(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.code.as_str())
    }
}

pub fn load(name: &str) -> Vector {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/vectors")
        .join(name);
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("parse {name}: {e}"))
}
