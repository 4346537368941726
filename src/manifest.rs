//! Manifest documents normalized into a platform / layer tree.
//!
//! Backends answer with several shapes:
//!
//! - a single-platform manifest: `{ "mediaType": ..., "layers": [...] }`
//! - a platform list: `{ "platforms": [...] }` or a bare `[...]`
//! - a multi-method comparison: `{ "methods": [...], "results": { "<method>": [...] } }`
//! - an image index: `{ "manifests": [ { "digest", "platform" } ] }`
//!
//! [`ManifestInput::decode`] is the only place that looks at the shape; every
//! shape ends up as the same [`ManifestTree`].

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::listing::{FileEntry, LayerFileIndex};
use crate::utils;

/// Label used by [`ManifestTree::per_method`] for documents without methods.
pub const DEFAULT_METHOD: &str = "default";

#[derive(Debug, Clone, Deserialize)]
pub struct RawLayer {
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(rename = "mediaType", alias = "media_type", default)]
    pub media_type: Option<String>,

    #[serde(default)]
    pub size: Option<Value>,

    #[serde(default)]
    pub size_bytes: Option<Value>,

    /// Listing lines some backends embed directly in the manifest
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPlatform {
    #[serde(default)]
    pub os: Option<String>,

    #[serde(default)]
    pub architecture: Option<String>,

    #[serde(default)]
    pub variant: Option<String>,

    #[serde(default)]
    pub layers: Option<Vec<RawLayer>>,

    /// Set instead of `layers` when a backend method failed
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIndexEntry {
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub platform: Option<RawIndexPlatform>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIndexPlatform {
    #[serde(default)]
    pub os: Option<String>,

    #[serde(default)]
    pub architecture: Option<String>,

    #[serde(default)]
    pub variant: Option<String>,
}

/// A manifest document decoded by shape, before normalization.
#[derive(Debug, Clone)]
pub enum ManifestInput {
    SinglePlatform {
        digest: Option<String>,
        platform: RawPlatform,
    },
    MultiPlatform {
        digest: Option<String>,
        platforms: Vec<RawPlatform>,
    },
    MultiMethod {
        digest: Option<String>,
        /// Method name and its raw result, in `methods` order
        results: Vec<(String, Option<Value>)>,
    },
    Index {
        digest: Option<String>,
        manifests: Vec<RawIndexEntry>,
    },
}

impl ManifestInput {
    /// Inspect which keys are present and decode accordingly.
    pub fn decode(json: Value) -> Result<Self> {
        let obj = match json {
            Value::Array(items) => {
                let platforms: Vec<RawPlatform> = serde_json::from_value(Value::Array(items))?;
                return Ok(ManifestInput::MultiPlatform {
                    digest: None,
                    platforms,
                });
            }
            Value::Object(obj) => obj,
            other => {
                return Err(Error::MalformedManifest(format!(
                    "expected a JSON object or array, got {}",
                    type_name(&other)
                )))
            }
        };

        let digest = document_digest(&obj);

        if obj.contains_key("results") && obj.contains_key("methods") {
            let methods: Vec<String> = serde_json::from_value(obj["methods"].clone())?;
            let results = match &obj["results"] {
                Value::Object(results) => results,
                other => {
                    return Err(Error::MalformedManifest(format!(
                        "results must be an object, got {}",
                        type_name(other)
                    )))
                }
            };
            let results = methods
                .into_iter()
                .map(|m| {
                    let value = results.get(&m).cloned();
                    (m, value)
                })
                .collect();
            return Ok(ManifestInput::MultiMethod { digest, results });
        }

        if let Some(platforms) = obj.get("platforms") {
            let platforms: Vec<RawPlatform> = serde_json::from_value(platforms.clone())?;
            return Ok(ManifestInput::MultiPlatform { digest, platforms });
        }

        if obj.contains_key("layers") {
            let platform: RawPlatform = serde_json::from_value(Value::Object(obj))?;
            return Ok(ManifestInput::SinglePlatform { digest, platform });
        }

        if let Some(manifests) = obj.get("manifests") {
            let manifests: Vec<RawIndexEntry> = serde_json::from_value(manifests.clone())?;
            return Ok(ManifestInput::Index { digest, manifests });
        }

        Err(Error::MalformedManifest(
            "no layers, platforms, results or manifests key".to_string(),
        ))
    }
}

fn document_digest(obj: &Map<String, Value>) -> Option<String> {
    ["digest", "manifest"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A size counts when it is a non-negative integer, a string holding one,
/// or a human-readable string like `"1.5 KB"`.
fn size_value(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok().or_else(|| utils::parse_human_size(s)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub digest: String,
    pub media_type: String,
    pub size_bytes: u64,
    /// Empty until the layer's listing has been fetched
    pub files: Vec<FileEntry>,
}

impl Layer {
    fn from_raw(raw: RawLayer, position: usize) -> Result<Self> {
        let digest = raw
            .digest
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::MalformedManifest(format!("layer {} has no digest", position)))?;

        let size_bytes = size_value(raw.size.as_ref())
            .or_else(|| size_value(raw.size_bytes.as_ref()))
            .unwrap_or(0);

        let files = raw
            .files
            .map(|lines| LayerFileIndex::from_listing(lines).into_entries())
            .unwrap_or_default();

        Ok(Layer {
            digest,
            media_type: raw.media_type.unwrap_or_default(),
            size_bytes,
            files,
        })
    }

    /// Navigable index over the files embedded in this layer.
    pub fn file_index(&self) -> LayerFileIndex {
        LayerFileIndex::from_entries(self.files.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
    /// Per-platform manifest digest, known for image index entries
    pub manifest_digest: Option<String>,
    /// Manifest order, which is the overlay order of the filesystem
    pub layers: Vec<Layer>,
}

impl Platform {
    fn from_raw(raw: RawPlatform, position: usize) -> Result<Self> {
        let layers = match raw.layers {
            Some(layers) => layers,
            None => {
                return Err(Error::MalformedManifest(match raw.error {
                    Some(err) => format!("platform {} failed: {}", position, err),
                    None => format!("platform {} has no layers", position),
                }))
            }
        };

        let layers = layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| Layer::from_raw(layer, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Platform {
            os: raw.os.unwrap_or_default(),
            architecture: raw.architecture.unwrap_or_default(),
            variant: raw.variant,
            manifest_digest: None,
            layers,
        })
    }

    fn from_index_entry(entry: RawIndexEntry) -> Self {
        let platform = entry.platform.unwrap_or_default();
        Platform {
            os: platform.os.unwrap_or_default(),
            architecture: platform.architecture.unwrap_or_default(),
            variant: platform.variant,
            manifest_digest: entry.digest,
            layers: Vec::new(),
        }
    }

    /// `os/architecture[/variant]`, or `unknown` when neither is known.
    pub fn label(&self) -> String {
        if self.os.is_empty() && self.architecture.is_empty() {
            return "unknown".to_string();
        }
        let or_unknown = |s: &str| if s.is_empty() { "?".to_string() } else { s.to_string() };
        let mut label = format!("{}/{}", or_unknown(&self.os), or_unknown(&self.architecture));
        if let Some(variant) = &self.variant {
            label.push('/');
            label.push_str(variant);
        }
        label
    }

    pub fn total_size(&self) -> u64 {
        self.layers.iter().map(|l| l.size_bytes).sum()
    }
}

/// Platforms and layers of one fetched manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestTree {
    pub platforms: Vec<Platform>,
    pub manifest_digest: String,
}

impl ManifestTree {
    /// Normalize any supported manifest document.
    ///
    /// A multi-method document yields the tree of its first listed method;
    /// use [`ManifestTree::per_method`] to get all of them.
    pub fn from_raw_manifest(json: Value) -> Result<Self> {
        Self::from_input(ManifestInput::decode(json)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Self::from_raw_manifest(serde_json::from_slice(bytes)?)
    }

    pub fn from_input(input: ManifestInput) -> Result<Self> {
        match input {
            ManifestInput::SinglePlatform { digest, platform } => Ok(ManifestTree {
                platforms: vec![Platform::from_raw(platform, 0)?],
                manifest_digest: digest.unwrap_or_default(),
            }),
            ManifestInput::MultiPlatform { digest, platforms } => {
                Self::from_platforms(platforms, digest)
            }
            ManifestInput::MultiMethod { digest, results } => {
                let (method, value) = results.into_iter().next().ok_or_else(|| {
                    Error::MalformedManifest("methods list is empty".to_string())
                })?;
                Self::from_method_result(&method, value, digest)
            }
            ManifestInput::Index { digest, manifests } => Ok(ManifestTree {
                platforms: manifests.into_iter().map(Platform::from_index_entry).collect(),
                manifest_digest: digest.unwrap_or_default(),
            }),
        }
    }

    /// One tree per backend method, in `methods` order. A failed method
    /// does not hide the others.
    pub fn per_method(json: Value) -> Result<Vec<(String, Result<ManifestTree>)>> {
        match ManifestInput::decode(json)? {
            ManifestInput::MultiMethod { digest, results } => Ok(results
                .into_iter()
                .map(|(method, value)| {
                    let tree = Self::from_method_result(&method, value, digest.clone());
                    (method, tree)
                })
                .collect()),
            other => Ok(vec![(DEFAULT_METHOD.to_string(), Self::from_input(other))]),
        }
    }

    fn from_method_result(method: &str, value: Option<Value>, digest: Option<String>) -> Result<Self> {
        let value = value.ok_or_else(|| {
            Error::MalformedManifest(format!("method {} has no result", method))
        })?;
        let platforms: Vec<RawPlatform> = serde_json::from_value(value)?;
        Self::from_platforms(platforms, digest).map_err(|err| match err {
            Error::MalformedManifest(msg) => {
                Error::MalformedManifest(format!("method {}: {}", method, msg))
            }
            other => other,
        })
    }

    fn from_platforms(platforms: Vec<RawPlatform>, digest: Option<String>) -> Result<Self> {
        let platforms = platforms
            .into_iter()
            .enumerate()
            .map(|(i, p)| Platform::from_raw(p, i))
            .collect::<Result<Vec<_>>>()?;
        Ok(ManifestTree {
            platforms,
            manifest_digest: digest.unwrap_or_default(),
        })
    }

    /// First layer with `digest` across all platforms, in platform order.
    pub fn layer_by_digest(&self, digest: &str) -> Option<&Layer> {
        self.platforms
            .iter()
            .flat_map(|p| p.layers.iter())
            .find(|l| l.digest == digest)
    }

    /// Every distinct layer once, first occurrence wins.
    pub fn unique_layers(&self) -> Vec<&Layer> {
        let mut seen = HashSet::new();
        self.platforms
            .iter()
            .flat_map(|p| p.layers.iter())
            .filter(|l| seen.insert(l.digest.as_str()))
            .collect()
    }

    pub fn layer_count(&self) -> usize {
        self.platforms.iter().map(|p| p.layers.len()).sum()
    }
}
