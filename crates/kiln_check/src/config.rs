//! Project configuration loading.
//!
//! The checker reads the project's `tsconfig.json` and treats the
//! compiler options as opaque except for the handful of fields that
//! affect parsing and module resolution (`jsx`, `baseUrl`, `paths`).
//! Comments are tolerated the way TypeScript's own config reader
//! tolerates them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_source::ParseSettings;
use serde::Deserialize;

/// Compiler options as found under `compilerOptions`.
///
/// Unrecognized fields are carried in `rest` so a caller handing the
/// options onward loses nothing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    pub target: Option<String>,
    pub module: Option<String>,
    pub module_resolution: Option<String>,
    pub strict: Option<bool>,
    pub jsx: Option<String>,
    pub base_url: Option<String>,
    pub paths: Option<BTreeMap<String, Vec<String>>>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl CompilerOptions {
    /// The fixed language-level configuration handed to the store.
    pub fn parse_settings(&self) -> ParseSettings {
        ParseSettings { jsx: self.jsx.is_some() }
    }
}

/// A parsed `tsconfig.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub compiler_options: CompilerOptions,
    pub files: Vec<String>,
    pub include: Vec<String>,
}

impl ProjectConfig {
    /// Ambient declaration files listed explicitly in the config.
    pub fn declaration_files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str).filter(|f| f.ends_with(".d.ts"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load a project config file.
pub fn load_project_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let stripped = strip_json_comments(&raw);
    serde_json::from_str(&stripped)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Blank out `//` and `/* */` comments, preserving byte offsets so parse
/// errors still point at the right place.
fn strip_json_comments(input: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        InString,
        LineComment,
        BlockComment,
    }

    let bytes = input.as_bytes();
    let mut output = bytes.to_vec();
    let mut state = State::Code;
    let mut idx = 0;

    while idx < bytes.len() {
        match state {
            State::Code => match bytes[idx] {
                b'"' => state = State::InString,
                b'/' if bytes.get(idx + 1) == Some(&b'/') => {
                    state = State::LineComment;
                    output[idx] = b' ';
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment;
                    output[idx] = b' ';
                }
                _ => {}
            },
            State::InString => match bytes[idx] {
                b'\\' => idx += 1,
                b'"' => state = State::Code,
                _ => {}
            },
            State::LineComment => {
                if bytes[idx] == b'\n' {
                    state = State::Code;
                } else {
                    output[idx] = b' ';
                }
            }
            State::BlockComment => {
                if bytes[idx] == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    output[idx] = b' ';
                    output[idx + 1] = b' ';
                    idx += 1;
                    state = State::Code;
                } else if bytes[idx] != b'\n' {
                    output[idx] = b' ';
                }
            }
        }
        idx += 1;
    }

    // Only ASCII bytes were replaced, so the result stays valid UTF-8.
    String::from_utf8(output).unwrap_or_else(|_| input.to_string())
}
