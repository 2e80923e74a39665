//! Test fixtures for generating test data and reading S3 responses.

use bytes::Bytes;
use hoard_core::Fingerprint;

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Lowercase hex SHA-1 of data.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn fingerprint_hex(data: &[u8]) -> String {
    Fingerprint::compute(data).to_hex()
}

/// Text of every `<tag>...</tag>` element, in document order.
#[allow(dead_code)]
pub fn xml_values(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        values.push(after[..end].to_string());
        rest = &after[end + close.len()..];
    }
    values
}

/// Text of the first `<tag>...</tag>` element.
#[allow(dead_code)]
pub fn xml_value(xml: &str, tag: &str) -> Option<String> {
    xml_values(xml, tag).into_iter().next()
}

/// A CompleteMultipartUpload document listing the given part numbers.
#[allow(dead_code)]
pub fn complete_manifest(parts: &[u32]) -> String {
    let mut body = String::from("<CompleteMultipartUpload>");
    for part in parts {
        body.push_str(&format!("<Part><PartNumber>{part}</PartNumber></Part>"));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}
