//! Bucket name and object key rules.

/// Minimum bucket name length.
pub const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum object key length in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Validate a bucket name.
///
/// Names are 3 to 63 characters of lowercase letters, digits, `-` and `.`,
/// and must start and end with a letter or digit.
pub fn validate_bucket_name(name: &str) -> crate::Result<()> {
    let len = name.len();
    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(crate::Error::InvalidBucketName(format!(
            "{name}: length must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN}"
        )));
    }

    let allowed = |c: u8| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'-' || c == b'.';
    if !name.bytes().all(allowed) {
        return Err(crate::Error::InvalidBucketName(format!(
            "{name}: only lowercase letters, digits, '-' and '.' are allowed"
        )));
    }

    let bytes = name.as_bytes();
    let edge_ok = |c: u8| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[len - 1]) {
        return Err(crate::Error::InvalidBucketName(format!(
            "{name}: must start and end with a letter or digit"
        )));
    }

    if name.contains("..") {
        return Err(crate::Error::InvalidBucketName(format!(
            "{name}: must not contain consecutive dots"
        )));
    }

    Ok(())
}

/// Validate an object key. Keys are any UTF-8 of at most 1024 bytes.
pub fn validate_object_key(key: &str) -> crate::Result<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(crate::Error::KeyTooLong(key.len()));
    }
    Ok(())
}
