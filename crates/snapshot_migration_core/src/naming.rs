use sha2::{Digest, Sha256};

/// Upper bound the RDS naming grammar places on snapshot identifiers.
pub const MAX_IDENTIFIER_LEN: usize = 255;
const DIGEST_SUFFIX_LEN: usize = 8;
const QUALIFIER_SEPARATOR: char = ':';

/// Returns the bare identifier behind an ARN or account-qualified id, i.e.
/// everything after the last `:`. `None` when nothing follows the separator.
pub fn normalize_identifier(raw: &str) -> Option<&str> {
    let bare = match raw.rfind(QUALIFIER_SEPARATOR) {
        Some(index) => &raw[index + 1..],
        None => raw,
    };
    let bare = bare.trim();
    if bare.is_empty() {
        None
    } else {
        Some(bare)
    }
}

/// Deterministically derives the encrypted copy's identifier from a source id.
///
/// Characters outside `[A-Za-z0-9-]` become hyphens, hyphen runs collapse, the
/// id must start with a letter, and overlong ids are truncated and tagged
/// with a digest of the source id.
pub fn derive_target_id(source_id: &str, suffix: &str) -> String {
    let raw = format!("{source_id}-{suffix}");
    let mut sanitized = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = if ch.is_ascii_alphanumeric() { ch } else { '-' };
        if ch == '-' && (sanitized.is_empty() || sanitized.ends_with('-')) {
            continue;
        }
        sanitized.push(ch);
    }
    let sanitized = sanitized.trim_end_matches('-');

    let mut target = if sanitized.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        sanitized.to_string()
    } else {
        format!("s-{sanitized}")
    };

    if target.len() > MAX_IDENTIFIER_LEN {
        target.truncate(MAX_IDENTIFIER_LEN - DIGEST_SUFFIX_LEN - 1);
        let head = target.trim_end_matches('-');
        target = format!("{head}-{}", short_digest(source_id));
    }
    target
}

/// Recovers the source id from an encrypted copy id that follows the
/// `<source>-<suffix>` convention.
pub fn source_from_target(target_id: &str, suffix: &str) -> Option<String> {
    let source = target_id.strip_suffix(&format!("-{suffix}"))?;
    if source.is_empty() {
        None
    } else {
        Some(source.to_string())
    }
}

pub fn is_migration_target(id: &str, suffix: &str) -> bool {
    id.ends_with(&format!("-{suffix}"))
}

/// Whether `suffix` survives target derivation unchanged.
pub fn is_valid_suffix(suffix: &str) -> bool {
    !suffix.is_empty()
        && !suffix.starts_with('-')
        && !suffix.ends_with('-')
        && !suffix.contains("--")
        && suffix.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

fn short_digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..DIGEST_SUFFIX_LEN].to_string()
}
