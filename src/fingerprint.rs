//! Fingerprints for persisted queries.
//!
//! Clients hash the schema text themselves and send only the fingerprint on
//! repeat calls, so this must produce exactly what the browser client
//! produces: a 32-bit signed rolling hash (`h = h * 31 + c`, wrapping) over
//! the UTF-16 code units of the text, printed in decimal.
//!
//! Not collision resistant. A fingerprint is a cache key, not a proof.

/// Raw 32-bit hash of `text`.
pub fn hash(text: &str) -> i32 {
    text.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit))
    })
}

/// Fingerprint of `text` as sent on the wire.
pub fn fingerprint(text: &str) -> String {
    hash(text).to_string()
}
