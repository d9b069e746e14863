//! Binary scene document codec via `bitcode` with a versioned header.

use crate::document::SceneDocument;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying an encoded scene document.
pub const DOCUMENT_MAGIC: u32 = 0x5CE7_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

/// Byte length of the header (magic + version, little-endian).
pub const HEADER_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("data too short for document header")]
    TooShort,
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", DOCUMENT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("document from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Header prepended to every encoded document. Checked before the payload
/// is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentHeader {
    pub magic: u32,
    pub version: u32,
}

impl DocumentHeader {
    pub fn current() -> Self {
        Self {
            magic: DOCUMENT_MAGIC,
            version: FORMAT_VERSION,
        }
    }

    /// Validate the header. Returns `Ok(())` if valid.
    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != DOCUMENT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..].copy_from_slice(&self.version.to_le_bytes());
        out
    }
}

/// Read the header without decoding the payload.
pub fn read_document_header(data: &[u8]) -> Result<DocumentHeader, DeserializeError> {
    if data.len() < HEADER_LEN {
        return Err(DeserializeError::TooShort);
    }
    let mut magic = [0u8; 4];
    let mut version = [0u8; 4];
    magic.copy_from_slice(&data[..4]);
    version.copy_from_slice(&data[4..HEADER_LEN]);
    Ok(DocumentHeader {
        magic: u32::from_le_bytes(magic),
        version: u32::from_le_bytes(version),
    })
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Encode a document as header + bitcode payload.
pub fn encode_document(doc: &SceneDocument) -> Result<Vec<u8>, SerializeError> {
    let payload = bitcode::serialize(doc).map_err(|e| SerializeError::Encode(e.to_string()))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&DocumentHeader::current().to_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a document produced by [`encode_document`].
pub fn decode_document(data: &[u8]) -> Result<SceneDocument, DeserializeError> {
    read_document_header(data)?.validate()?;
    bitcode::deserialize(&data[HEADER_LEN..]).map_err(|e| DeserializeError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{DataComponent, PropValue};
    use crate::document::{ComponentRecord, ManifestRecord, NodeRecord};
    use crate::processor::ProcessorSpec;

    fn sample() -> SceneDocument {
        let mut root = NodeRecord::new("Root");
        root.components.push(ComponentRecord::FragmentManifest(ManifestRecord {
            included: vec![Some(1), None],
            processors: vec![Some(
                ProcessorSpec::new("ExtractTagged")
                    .with_param("tags", PropValue::List(vec!["Glow".into()])),
            )],
        }));
        let mut child = NodeRecord::new("Lamp");
        child.parent = Some(0);
        child.active = false;
        child.components.push(ComponentRecord::Data(
            DataComponent::new("Light").with_prop("range", PropValue::Float(2.5)),
        ));
        SceneDocument {
            nodes: vec![root, child],
        }
    }

    #[test]
    fn encode_decode_preserves_document() {
        let doc = sample();
        let bytes = encode_document(&doc).unwrap();
        assert_eq!(decode_document(&bytes).unwrap(), doc);
    }

    #[test]
    fn header_is_written_first() {
        let bytes = encode_document(&SceneDocument::default()).unwrap();
        let header = read_document_header(&bytes).unwrap();
        assert_eq!(header, DocumentHeader::current());
    }

    #[test]
    fn too_short() {
        assert!(matches!(
            decode_document(&[1, 2, 3]),
            Err(DeserializeError::TooShort)
        ));
    }

    #[test]
    fn invalid_magic() {
        let mut bytes = encode_document(&sample()).unwrap();
        bytes[0] ^= 0xFF;
        match decode_document(&bytes) {
            Err(DeserializeError::InvalidMagic(_)) => {}
            other => panic!("expected InvalidMagic, got: {other:?}"),
        }
    }

    #[test]
    fn version_checks() {
        let mut bytes = encode_document(&sample()).unwrap();
        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            decode_document(&bytes),
            Err(DeserializeError::FutureVersion(v)) if v == FORMAT_VERSION + 1
        ));
        bytes[4..8].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            decode_document(&bytes),
            Err(DeserializeError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn corrupt_payload() {
        let mut bytes = encode_document(&sample()).unwrap();
        bytes.truncate(HEADER_LEN + 2);
        assert!(matches!(
            decode_document(&bytes),
            Err(DeserializeError::Decode(_))
        ));
    }

    #[test]
    fn error_messages() {
        let msg = DeserializeError::InvalidMagic(0xDEAD_BEEF).to_string();
        assert!(msg.contains("0x5CE70001"), "{msg}");
        assert!(msg.contains("0xDEADBEEF"), "{msg}");
    }
}
