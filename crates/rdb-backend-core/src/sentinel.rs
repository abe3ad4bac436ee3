//! The none-sentinel: a backend-internal magic byte prefix distinguishing
//! "stored null" from ordinary stored bytes, so a primitive store that only
//! speaks `Option<Vec<u8>>` for presence/absence can still represent three
//! states (present-value, present-null, absent) once combined with the
//! storage engine's own missing-key signal.

use rdb_error::{ErrorKind, RdbError};

const TAG_NULL: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;

/// Wrap a logical value (`None` = stored null) into the bytes a backend's
/// primitive store actually writes.
pub fn wrap_raw(value: Option<&[u8]>) -> Vec<u8> {
    match value {
        None => vec![TAG_NULL],
        Some(bytes) => {
            let mut out = Vec::with_capacity(bytes.len() + 1);
            out.push(TAG_VALUE);
            out.extend_from_slice(bytes);
            out
        }
    }
}

/// Unwrap bytes previously produced by [`wrap_raw`] back into a logical
/// value. Fails with [`ErrorKind::BadWireFormat`] if the leading tag is
/// missing or unrecognised (a corrupt or foreign record).
pub fn unwrap_raw(stored: &[u8]) -> Result<Option<Vec<u8>>, RdbError> {
    match stored.split_first() {
        Some((&TAG_NULL, [])) => Ok(None),
        Some((&TAG_VALUE, rest)) => Ok(Some(rest.to_vec())),
        _ => Err(RdbError::new(
            ErrorKind::BadWireFormat,
            "corrupt backend record: missing or unrecognised sentinel tag",
        )),
    }
}
