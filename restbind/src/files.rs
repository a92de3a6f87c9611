// Copyright 2025 Oxide Computer Company

//! Uploaded files
//!
//! A property bound with `Bindings::file` is filled from the multipart part
//! of the same name.  Two shapes are supported: [`FileHeader`] when only the
//! metadata matters, and [`UploadedFile`] when the content is needed too.
//! Either can be wrapped in `Option` or `Vec` (for a repeated part).
//!
//! Between the decoder and the typed value, a file travels as a small JSON
//! object (name, content type, size and base64 content) so that files go
//! through the same deserialization as every other field.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// One part of a multipart body, as read off the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct FilePart {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl FilePart {
    pub(crate) fn to_value(&self) -> Value {
        serde_json::to_value(FileRepr {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            size: self.content.len() as u64,
            content: Some(STANDARD.encode(&self.content)),
        })
        .unwrap_or(Value::Null)
    }
}

/// Wire form of a file between the decoder and the typed value.
#[doc(hidden)]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FileRepr {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// Metadata of an uploaded file.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "FileRepr", into = "FileRepr")]
pub struct FileHeader {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
}

impl TryFrom<FileRepr> for FileHeader {
    type Error = String;

    fn try_from(repr: FileRepr) -> Result<Self, Self::Error> {
        Ok(FileHeader {
            filename: repr.filename,
            content_type: repr.content_type,
            size: repr.size,
        })
    }
}

impl From<FileHeader> for FileRepr {
    fn from(header: FileHeader) -> Self {
        FileRepr {
            filename: header.filename,
            content_type: header.content_type,
            size: header.size,
            content: None,
        }
    }
}

/// An uploaded file with its content.  The content belongs to the value once
/// decoded.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "FileRepr", into = "FileRepr")]
pub struct UploadedFile {
    header: FileHeader,
    content: Bytes,
}

impl UploadedFile {
    pub fn new(
        filename: Option<String>,
        content_type: Option<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        let content = content.into();
        UploadedFile {
            header: FileHeader {
                filename,
                content_type,
                size: content.len() as u64,
            },
            content,
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn filename(&self) -> Option<&str> {
        self.header.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.header.size
    }

    pub fn bytes(&self) -> &Bytes {
        &self.content
    }

    /// Opens the content for reading.
    pub fn reader(&self) -> impl std::io::Read + '_ {
        std::io::Cursor::new(self.content.as_ref())
    }

    pub fn into_bytes(self) -> Bytes {
        self.content
    }
}

impl TryFrom<FileRepr> for UploadedFile {
    type Error = String;

    fn try_from(repr: FileRepr) -> Result<Self, Self::Error> {
        let encoded = repr
            .content
            .ok_or_else(|| "uploaded file has no content".to_string())?;
        let content = STANDARD
            .decode(encoded)
            .map_err(|e| format!("uploaded file content is corrupt: {}", e))?;
        Ok(UploadedFile {
            header: FileHeader {
                filename: repr.filename,
                content_type: repr.content_type,
                size: repr.size,
            },
            content: Bytes::from(content),
        })
    }
}

impl From<UploadedFile> for FileRepr {
    fn from(file: UploadedFile) -> Self {
        FileRepr {
            filename: file.header.filename,
            content_type: file.header.content_type,
            size: file.header.size,
            content: Some(STANDARD.encode(&file.content)),
        }
    }
}

fn binary_schema() -> schemars::schema::Schema {
    schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::String.into()),
        format: Some("binary".to_string()),
        ..Default::default()
    }
    .into()
}

impl JsonSchema for FileHeader {
    fn schema_name() -> String {
        "FileHeader".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(
        _: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        binary_schema()
    }
}

impl JsonSchema for UploadedFile {
    fn schema_name() -> String {
        "UploadedFile".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(
        _: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        binary_schema()
    }
}
