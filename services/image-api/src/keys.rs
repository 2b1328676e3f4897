//! Storage key layout: `<namespace>/<uuid>/<filename>`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("Key is outside the {0} namespace")]
    OutsideNamespace(String),

    #[error("Invalid upload id: {0}")]
    InvalidId(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),
}

/// Components recovered from a managed key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub uuid: Uuid,
    pub filename: String,
}

/// Derives and parses keys under one fixed namespace
#[derive(Debug, Clone)]
pub struct KeyCodec {
    /// Namespace including its trailing slash
    prefix: String,
}

impl KeyCodec {
    pub fn new(namespace: &str) -> Self {
        Self {
            prefix: format!("{}/", namespace.trim_matches('/')),
        }
    }

    /// Listing prefix, with trailing slash
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fresh key for `filename` under a random v4 id
    pub fn generate_key(&self, filename: &str) -> Result<String, KeyError> {
        validate_filename(filename)?;
        Ok(self.key_for(Uuid::new_v4(), filename))
    }

    /// Split a managed key back into id and filename
    pub fn parse_key(&self, key: &str) -> Result<ParsedKey, KeyError> {
        let rest = key
            .strip_prefix(&self.prefix)
            .ok_or_else(|| KeyError::OutsideNamespace(self.prefix.clone()))?;
        let (id, filename) = rest
            .split_once('/')
            .ok_or_else(|| KeyError::InvalidFilename(String::new()))?;

        let uuid = parse_id(id)?;
        validate_filename(filename)?;

        Ok(ParsedKey {
            uuid,
            filename: filename.to_string(),
        })
    }

    /// Rebuild a key from proxy path segments
    pub fn compose(&self, id: &str, filename: &str) -> Result<String, KeyError> {
        let uuid = parse_id(id)?;
        validate_filename(filename)?;
        Ok(self.key_for(uuid, filename))
    }

    pub fn is_within_namespace(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }

    fn key_for(&self, uuid: Uuid, filename: &str) -> String {
        format!("{}{}/{}", self.prefix, uuid.hyphenated(), filename)
    }
}

fn parse_id(id: &str) -> Result<Uuid, KeyError> {
    // Only the canonical hyphenated form, as produced by generate_key
    if id.len() != 36 {
        return Err(KeyError::InvalidId(id.to_string()));
    }
    Uuid::parse_str(id).map_err(|_| KeyError::InvalidId(id.to_string()))
}

fn validate_filename(filename: &str) -> Result<(), KeyError> {
    if filename.is_empty() || filename == "." || filename == ".." || filename.contains('/') {
        return Err(KeyError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Final path segment of a key
pub fn filename_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Whether `key` ends in a gallery image extension (case-insensitive)
pub fn is_image_key(key: &str) -> bool {
    key.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> KeyCodec {
        KeyCodec::new("chavy/uploads")
    }

    #[test]
    fn test_generate_key_shape() {
        let key = codec().generate_key("cat.png").unwrap();
        let rest = key.strip_prefix("chavy/uploads/").unwrap();
        let (id, filename) = rest.split_once('/').unwrap();

        assert_eq!(id.len(), 36);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
        assert!(id.chars().all(|c| !c.is_ascii_uppercase()));
        assert_eq!(filename, "cat.png");
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let codec = codec();
        assert_ne!(
            codec.generate_key("cat.png").unwrap(),
            codec.generate_key("cat.png").unwrap()
        );
    }

    #[test]
    fn test_parse_key_roundtrip() {
        let codec = codec();
        let key = codec.generate_key("my photo.JPG").unwrap();
        let parsed = codec.parse_key(&key).unwrap();

        assert_eq!(parsed.filename, "my photo.JPG");
        assert_eq!(codec.compose(&parsed.uuid.to_string(), &parsed.filename).unwrap(), key);
    }

    #[test]
    fn test_parse_key_rejects_malformed() {
        let codec = codec();
        let id = "550e8400-e29b-41d4-a716-446655440000";

        assert!(matches!(
            codec.parse_key(&format!("other/uploads/{id}/a.png")),
            Err(KeyError::OutsideNamespace(_))
        ));
        assert!(matches!(
            codec.parse_key("chavy/uploads/not-a-uuid/a.png"),
            Err(KeyError::InvalidId(_))
        ));
        assert!(matches!(
            codec.parse_key(&format!("chavy/uploads/{id}")),
            Err(KeyError::InvalidFilename(_))
        ));
        assert!(matches!(
            codec.parse_key(&format!("chavy/uploads/{id}/nested/a.png")),
            Err(KeyError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_generate_key_rejects_path_filenames() {
        let codec = codec();
        assert!(codec.generate_key("../escape.png").is_err());
        assert!(codec.generate_key("..").is_err());
        assert!(codec.generate_key("").is_err());
    }

    #[test]
    fn test_namespace_boundary() {
        let codec = KeyCodec::new("/chavy/uploads/");
        assert_eq!(codec.prefix(), "chavy/uploads/");
        assert!(codec.is_within_namespace("chavy/uploads/x/y.png"));
        assert!(!codec.is_within_namespace("chavy/uploads-evil/x/y.png"));
        assert!(!codec.is_within_namespace("other/uploads/x/y.png"));
    }

    #[test]
    fn test_is_image_key() {
        assert!(is_image_key("chavy/uploads/x/a.jpg"));
        assert!(is_image_key("chavy/uploads/x/a.JPEG"));
        assert!(is_image_key("chavy/uploads/x/a.WebP"));
        assert!(!is_image_key("chavy/uploads/x/a.pdf"));
        assert!(!is_image_key("chavy/uploads/x/png"));
        assert!(!is_image_key("chavy/uploads/x/a.png.txt"));
    }

    #[test]
    fn test_filename_of() {
        assert_eq!(filename_of("chavy/uploads/x/a.png"), "a.png");
        assert_eq!(filename_of("a.png"), "a.png");
    }
}
