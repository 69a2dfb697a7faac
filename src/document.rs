//! Corpus document I/O.
//!
//! Each document is one plain-text file with an optional leading YAML
//! metadata block. Metadata values are heterogeneous (string | list | nested
//! map), so they are modeled as the tagged [`MetaValue`] union with explicit
//! typed accessors rather than dynamic lookups.
//!
//! Documents are addressed by a URI derived from their path: relative to the
//! storage root, extension stripped, separators normalized, `memory://`
//! prefixed.

use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

pub const URI_SCHEME: &str = "memory://";

/// A single heterogeneous metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Str(String),
    List(Vec<MetaValue>),
    Map(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten a list value into its string items, skipping non-strings.
    pub fn as_str_list(&self) -> Vec<&str> {
        match self {
            Self::List(items) => items.iter().filter_map(|v| v.as_str()).collect(),
            Self::Str(s) => vec![s.as_str()],
            Self::Map(_) => Vec::new(),
        }
    }

    fn from_yaml(value: serde_yaml::Value) -> Option<Self> {
        match value {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::Bool(b) => Some(Self::Str(b.to_string())),
            serde_yaml::Value::Number(n) => Some(Self::Str(n.to_string())),
            serde_yaml::Value::String(s) => Some(Self::Str(s)),
            serde_yaml::Value::Sequence(seq) => Some(Self::List(
                seq.into_iter().filter_map(Self::from_yaml).collect(),
            )),
            serde_yaml::Value::Mapping(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    if let (serde_yaml::Value::String(key), Some(val)) =
                        (k, Self::from_yaml_opt(v))
                    {
                        out.insert(key, val);
                    }
                }
                Some(Self::Map(out))
            }
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(tagged.value),
        }
    }

    fn from_yaml_opt(value: serde_yaml::Value) -> Option<Self> {
        Self::from_yaml(value)
    }
}

/// Parsed metadata block with typed accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter(BTreeMap<String, MetaValue>);

impl Frontmatter {
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_str)
    }

    pub fn get_str_list(&self, key: &str) -> Vec<&str> {
        self.get(key).map(MetaValue::as_str_list).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A document split into metadata and body.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub frontmatter: Option<Frontmatter>,
    pub body: String,
}

/// Read and parse a document from disk.
pub fn read_document(path: &Path) -> Result<ParsedDocument> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_document(&text))
}

/// Split an optional leading `---` YAML block from the body.
///
/// A malformed YAML block is ignored (the document still indexes with its
/// body intact); a missing closing delimiter means the whole text is body.
pub fn parse_document(text: &str) -> ParsedDocument {
    let Some(rest) = strip_open_delimiter(text) else {
        return ParsedDocument {
            frontmatter: None,
            body: text.to_string(),
        };
    };

    let mut yaml_end = None;
    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            yaml_end = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }

    let Some((yaml_len, body_start)) = yaml_end else {
        return ParsedDocument {
            frontmatter: None,
            body: text.to_string(),
        };
    };

    let yaml_text = &rest[..yaml_len];
    let body = rest[body_start..].trim_start_matches(['\r', '\n']).to_string();

    let frontmatter = serde_yaml::from_str::<serde_yaml::Value>(yaml_text)
        .ok()
        .and_then(MetaValue::from_yaml)
        .and_then(|value| match value {
            MetaValue::Map(map) => Some(Frontmatter(map)),
            _ => None,
        });

    ParsedDocument { frontmatter, body }
}

fn strip_open_delimiter(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("---")?;
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    rest.strip_prefix('\n')
}

/// Derive the `memory://` URI for a corpus file path.
pub fn path_to_uri(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(last) = segments.last_mut() {
        if let Some(stem) = last.strip_suffix(".md") {
            *last = stem.to_string();
        }
    }

    format!("{URI_SCHEME}{}", segments.join("/"))
}

/// Map a `memory://` URI back to its on-disk path under `root`.
///
/// Rejects URIs whose segments would escape the storage root.
pub fn uri_to_path(uri: &str, root: &Path) -> Result<PathBuf> {
    let relative = uri.strip_prefix(URI_SCHEME).unwrap_or(uri);

    let mut path = root.to_path_buf();
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(EngineError::invalid(
                "uri",
                format!("URI attempts to escape the storage root: {uri}"),
            ));
        }
        path.push(segment);
    }

    // Stems may contain dots ("notes.v2"), so the suffix is appended, never substituted
    if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
        if !name.ends_with(".md") {
            path.set_file_name(format!("{name}.md"));
        }
    }
    Ok(path)
}

/// Resolve a document title: frontmatter `title`, else the file stem.
pub fn title_for(path: &Path, frontmatter: Option<&Frontmatter>) -> String {
    if let Some(title) = frontmatter.and_then(|fm| fm.get_str("title")) {
        if !title.trim().is_empty() {
            return title.to_string();
        }
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}
