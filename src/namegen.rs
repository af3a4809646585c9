//! Deterministic shortening of resource names
//!
//! Kubernetes object names are length-limited, and several dependents
//! derive their names from user-chosen names plus suffixes added by other
//! operators. Shortening must be stable: the same input always yields the
//! same output, so repeated reconciles target the same objects.

use sha2::{Digest, Sha256};

/// Characters of the hash suffix, plus one for the separator
const SUFFIX_LENGTH: usize = 8;

/// Shorten a name to at most `max_len` characters
///
/// Names that fit are returned unchanged. Longer names keep a prefix and
/// gain a sha256-derived suffix so distinct long names stay distinct.
pub fn short_name(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    let hash = hash_suffix(name);
    let keep = max_len.saturating_sub(SUFFIX_LENGTH + 1);
    let prefix = name[..keep].trim_end_matches('-');
    format!("{prefix}-{hash}")
}

/// Shorten `name` so that `<name>-<suffix>` fits within `max_len`
pub fn suffixed_short_name(name: &str, suffix: &str, max_len: usize) -> String {
    let base = short_name(name, max_len.saturating_sub(suffix.len() + 1));
    format!("{base}-{suffix}")
}

fn hash_suffix(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let hex: String = digest
        .iter()
        .take(SUFFIX_LENGTH / 2)
        .map(|b| format!("{b:02x}"))
        .collect();
    hex
}
