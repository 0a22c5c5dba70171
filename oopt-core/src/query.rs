//! Path-addressed reads over a configuration tree.
//!
//! Paths are slash-separated and use the persisted (hyphenated) field names:
//! `/ports/Port1/breakout-mode/channel-speed`. A keyed element may also be
//! written `ports[name=Port1]`. The result is either a scalar or a JSON
//! subtree.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::types::ConfigTree;

pub const MODEL_NAME: &str = "packet-transport";
pub const MODEL_ORGANIZATION: &str = "Nippon Telegraph and Telephone Corporation";
pub const MODEL_VERSION: &str = "0.7.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    /// RFC 7951 style: top-level member names carry the model prefix.
    JsonIetf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelData {
    pub name: &'static str,
    pub organization: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Capabilities {
    pub supported_models: Vec<ModelData>,
    pub supported_encodings: Vec<&'static str>,
}

pub fn capabilities() -> Capabilities {
    Capabilities {
        supported_models: vec![ModelData {
            name: MODEL_NAME,
            organization: MODEL_ORGANIZATION,
            version: MODEL_VERSION,
        }],
        supported_encodings: vec!["JSON", "JSON_IETF"],
    }
}

fn segments(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in path.split('/').filter(|s| !s.is_empty()) {
        match raw.split_once('[') {
            Some((elem, key)) => {
                out.push(elem.to_owned());
                let key = key.trim_end_matches(']');
                let value = key.split_once('=').map_or(key, |(_, v)| v);
                out.push(value.to_owned());
            }
            None => out.push(raw.to_owned()),
        }
    }
    out
}

/// Resolve `path` against `tree`. An empty path or `/` returns the root.
pub fn get(tree: &ConfigTree, path: &str, encoding: Encoding) -> Result<Value, ConfigError> {
    let mut node = serde_json::to_value(tree)?;
    for seg in segments(path) {
        node = match node {
            Value::Object(mut map) => map
                .remove(&seg)
                .ok_or_else(|| ConfigError::PathNotFound(path.to_owned()))?,
            _ => return Err(ConfigError::PathNotFound(path.to_owned())),
        };
    }
    Ok(match (encoding, node) {
        (Encoding::JsonIetf, Value::Object(map)) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (format!("{MODEL_NAME}:{k}"), v))
                .collect::<Map<_, _>>(),
        ),
        (_, node) => node,
    })
}
