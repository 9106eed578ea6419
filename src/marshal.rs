// ---------------------------------------------------------------------------
// marshal.rs - wire values <-> native handler values
// ---------------------------------------------------------------------------
//
// Scalars and structured values pass through untouched. Binary tags travel as
// standard padded base64: images decode to a buffer, video/file decode to a
// temporary file under the configured temp dir.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::plugins::{NativeValue, TypeTag};

#[derive(Debug, Clone)]
pub struct Marshaler {
    temp_dir: PathBuf,
}

/// Temporary files created while decoding one call's arguments.
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("marshal: failed to remove temp file {}: {}", path.display(), e);
                }
            }
        }
    }
}

impl Marshaler {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Wire value → native value for one input field.
    pub fn decode(
        &self,
        field: &str,
        tag: TypeTag,
        value: Value,
        temp: &mut TempFiles,
    ) -> Result<NativeValue, GatewayError> {
        let temp_ext = match tag {
            TypeTag::Image => None,
            TypeTag::Video => Some("mp4"),
            TypeTag::File => Some("bin"),
            _ => return Ok(NativeValue::Json(value)),
        };
        let Value::String(encoded) = value else {
            return Err(GatewayError::Marshal(format!(
                "Field {} must be a base64 encoded {}",
                field, tag
            )));
        };
        let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
            GatewayError::Marshal(format!("Invalid base64 data for field {}: {}", field, e))
        })?;

        match temp_ext {
            None => Ok(NativeValue::Bytes(bytes)),
            Some(ext) => {
                let path = self.write_temp(&bytes, ext)?;
                temp.paths.push(path.clone());
                Ok(NativeValue::Path(path))
            }
        }
    }

    /// Native value → wire value for one output field. `tag` is the declared
    /// slot type when the field matches a declared output slot.
    pub fn encode(&self, field: &str, tag: Option<TypeTag>, value: NativeValue) -> Result<Value, GatewayError> {
        match value {
            NativeValue::Bytes(bytes) => Ok(Value::String(STANDARD.encode(bytes))),
            NativeValue::Path(path) => self.encode_file(field, &path),
            // A binary slot holding a string is a path to the produced file.
            NativeValue::Json(Value::String(s)) if tag.is_some_and(TypeTag::is_binary) => {
                self.encode_file(field, Path::new(&s))
            }
            NativeValue::Json(v) => Ok(v),
        }
    }

    fn encode_file(&self, field: &str, path: &Path) -> Result<Value, GatewayError> {
        let bytes = std::fs::read(path).map_err(|e| {
            GatewayError::Marshal(format!(
                "Failed to read output file for {} ({}): {}",
                field,
                path.display(),
                e
            ))
        })?;
        Ok(Value::String(STANDARD.encode(bytes)))
    }

    fn write_temp(&self, bytes: &[u8], ext: &str) -> Result<PathBuf, GatewayError> {
        std::fs::create_dir_all(&self.temp_dir).map_err(|e| {
            GatewayError::Marshal(format!("Failed to create temp dir {}: {}", self.temp_dir.display(), e))
        })?;
        let path = self.temp_dir.join(format!("temp_{}.{}", Uuid::new_v4(), ext));
        std::fs::write(&path, bytes)
            .map_err(|e| GatewayError::Marshal(format!("Failed to write temp file: {}", e)))?;
        Ok(path)
    }
}

/// Remove everything inside `dir` and recreate it empty.
pub fn clear_temp_dir(dir: &Path) {
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            tracing::warn!("marshal: failed to clear temp dir {}: {}", dir.display(), e);
        }
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!("marshal: failed to create temp dir {}: {}", dir.display(), e);
    } else {
        tracing::info!("marshal: temp dir {} cleared", dir.display());
    }
}
