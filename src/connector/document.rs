//! JSON document exchanged when reading and saving a post
//!
//! Reading a post yields one descriptor per editable field. Saving accepts
//! the same shape and only looks at each field's `value`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PostFsError, Result};

/// One editable field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl FieldDescriptor {
    fn new(label: &str, kind: &str, value: Option<String>) -> Self {
        Self {
            label: Some(label.to_string()),
            kind: Some(kind.to_string()),
            value: Some(value.unwrap_or_default()),
        }
    }
}

#[derive(Debug, Serialize)]
struct PostDocument {
    title: FieldDescriptor,
    description: FieldDescriptor,
    content: FieldDescriptor,
}

/// The text columns of a post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}

impl PostFields {
    /// Render as a field-descriptor document. NULL columns become empty values.
    pub fn to_document(&self) -> Result<Vec<u8>> {
        let doc = PostDocument {
            title: FieldDescriptor::new("Title", "text", self.title.clone()),
            description: FieldDescriptor::new(
                "Description",
                "textarea",
                self.description.clone(),
            ),
            content: FieldDescriptor::new("Content", "long_text", self.content.clone()),
        };
        let mut bytes = serde_json::to_vec_pretty(&doc)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Decode a saved document. Missing fields are NULL, unknown keys are ignored.
    pub fn from_document(data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(PostFsError::Decode("empty document".to_string()));
        }

        let mut fields: HashMap<String, serde_json::Value> = serde_json::from_slice(data)?;
        let mut take = |name: &str| -> Result<Option<String>> {
            match fields.remove(name) {
                Some(field) => Ok(serde_json::from_value::<FieldDescriptor>(field)?.value),
                None => Ok(None),
            }
        };

        Ok(Self {
            title: take("title")?,
            description: take("description")?,
            content: take("content")?,
        })
    }
}
