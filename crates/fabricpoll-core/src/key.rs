//! Storage key construction
//!
//! Every record key is built by joining a namespace prefix, a device identity
//! and a resource path with `/`, then collapsing repeated separators. Upstream
//! code is free to concatenate segments that already carry leading or
//! trailing slashes; the normalized key shape is the same either way.

use crate::device::DeviceId;

/// Path separator used in storage keys
pub const SEPARATOR: char = '/';

/// Collapse every run of consecutive `/` characters into a single one
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut last_was_sep = false;
    for c in key.chars() {
        if c == SEPARATOR {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.push(c);
    }
    out
}

/// Key under which a resource path of a device is stored
pub fn record_key(prefix: &str, device: &DeviceId, path: &str) -> String {
    normalize_key(&format!("{}/{}/{}", prefix, device, path))
}

/// Top-level key of a device's namespace (`<prefix>/<id>`)
pub fn device_key(prefix: &str, device: &DeviceId) -> String {
    normalize_key(&format!("{}/{}", prefix, device))
}

/// Prefix shared by every record of a device (`<prefix>/<id>/`)
///
/// The trailing separator keeps `abc` from matching records of `abcd`.
pub fn device_prefix(prefix: &str, device: &DeviceId) -> String {
    normalize_key(&format!("{}/{}/", prefix, device))
}
