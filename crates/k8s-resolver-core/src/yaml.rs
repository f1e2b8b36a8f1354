//! YAML template walking
//!
//! [`YamlResolver`] decodes a stream of YAML documents and rebuilds every
//! document with each string scalar passed through a resolution callback.
//! Sequences keep their length and order, mappings keep their entry count;
//! only string leaves are ever replaced.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_yaml_ng::value::TaggedValue;
use serde_yaml_ng::{Mapping, Value};
use tracing::trace;

/// Documents produced by a resolution pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedStream {
    pub documents: Vec<Value>,
}

impl ResolvedStream {
    /// Number of top-level documents processed
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Serialize the documents back into one `---` separated stream
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for (index, document) in self.documents.iter().enumerate() {
            if index > 0 {
                out.push_str("---\n");
            }
            let text = serde_yaml_ng::to_string(document)
                .map_err(|e| Error::decode(index, e).in_document(index))?;
            out.push_str(&text);
        }
        Ok(out)
    }
}

/// Decode a YAML stream into its documents without resolving anything.
///
/// Input with no content (empty, blank or only comments) is a single null
/// document.
pub fn decode_stream(input: &[u8]) -> Result<Vec<Value>> {
    let text = std::str::from_utf8(input).map_err(|e| Error::decode(0, e))?;
    if !has_content(text) {
        return Ok(vec![Value::Null]);
    }
    let mut documents = Vec::new();
    for (index, document) in serde_yaml_ng::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(document).map_err(|e| Error::decode(index, e))?;
        documents.push(value);
    }
    Ok(documents)
}

fn has_content(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    })
}

/// Walks YAML values, substituting string scalars through `resolve_str`
pub struct YamlResolver<F> {
    resolve_str: F,
}

impl<F> YamlResolver<F>
where
    F: FnMut(&str) -> Result<String>,
{
    /// Create a resolver around a string-resolution callback
    pub fn new(resolve_str: F) -> Self {
        Self { resolve_str }
    }

    /// Decode `input` as a YAML stream and resolve every document.
    pub fn resolve(&mut self, input: &[u8]) -> Result<ResolvedStream> {
        let documents = decode_stream(input)?;
        self.resolve_documents(documents)
    }

    /// Resolve already-decoded documents, in order.
    pub fn resolve_documents(&mut self, documents: Vec<Value>) -> Result<ResolvedStream> {
        let mut resolved = Vec::with_capacity(documents.len());
        for (index, document) in documents.into_iter().enumerate() {
            trace!("Resolving YAML document {}", index);
            let value = self
                .resolve_value(document)
                .map_err(|e| e.in_document(index))?;
            resolved.push(value);
        }
        Ok(ResolvedStream {
            documents: resolved,
        })
    }

    /// Resolve a single value tree.
    pub fn resolve_value(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::String(s) => (self.resolve_str)(&s).map(Value::String),
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value),
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Value::Mapping(mapping) => self.resolve_mapping(mapping).map(Value::Mapping),
            Value::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                let value = self.resolve_value(value)?;
                Ok(Value::Tagged(Box::new(TaggedValue { tag, value })))
            }
        }
    }

    fn resolve_mapping(&mut self, mapping: Mapping) -> Result<Mapping> {
        let mut result = Mapping::with_capacity(mapping.len());
        for (key, value) in mapping {
            let key = self.resolve_value(key)?;
            let value = self.resolve_value(value)?;
            if result.contains_key(&key) {
                return Err(Error::DuplicateKey {
                    key: render_key(&key),
                });
            }
            result.insert(key, value);
        }
        Ok(result)
    }
}

/// Every string scalar in `documents`, keys included, in visit order.
pub fn collect_strings(documents: &[Value]) -> Vec<String> {
    let mut strings = Vec::new();
    for document in documents {
        push_strings(document, &mut strings);
    }
    strings
}

fn push_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
        Value::Sequence(items) => items.iter().for_each(|item| push_strings(item, out)),
        Value::Mapping(mapping) => {
            for (key, value) in mapping {
                push_strings(key, out);
                push_strings(value, out);
            }
        }
        Value::Tagged(tagged) => push_strings(&tagged.value, out),
    }
}

fn render_key(key: &Value) -> String {
    match key {
        Value::String(s) => format!("{:?}", s),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}
