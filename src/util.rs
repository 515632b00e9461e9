use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use unicode_normalization::UnicodeNormalization;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut h = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(format!("{:x}", h.finalize()))
}

/// File name stem for a project or component label.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`; the result is never empty
/// and never starts with a dot.
pub fn safe_file_stem(label: &str) -> String {
    let mut out: String = label
        .trim()
        .nfkc()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    while out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Hands out distinct file stems within one directory.
///
/// Labels that sanitize to the same stem get `-2`, `-3`, ... appended.
/// Comparison ignores ASCII case so the names also stay apart on
/// case-insensitive filesystems.
#[derive(Debug, Default)]
pub struct UniqueStems {
    used: HashSet<String>,
}

impl UniqueStems {
    pub fn claim(&mut self, stem: String) -> String {
        if self.used.insert(stem.to_ascii_lowercase()) {
            return stem;
        }
        (2..)
            .map(|n| format!("{stem}-{n}"))
            .find(|candidate| self.used.insert(candidate.to_ascii_lowercase()))
            .unwrap_or(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_characters_replaced() {
        assert_eq!(safe_file_stem("UI / Login"), "UI___Login");
        assert_eq!(safe_file_stem("../etc"), "_._etc");
        assert_eq!(safe_file_stem(""), "_");
    }

    #[test]
    fn colliding_stems_get_suffixes() {
        let mut stems = UniqueStems::default();
        assert_eq!(stems.claim(safe_file_stem("UI/Login")), "UI_Login");
        assert_eq!(stems.claim(safe_file_stem("UI Login")), "UI_Login-2");
        assert_eq!(stems.claim("ui_login".into()), "ui_login-3");
        assert_eq!(stems.claim("UI_Login-2".into()), "UI_Login-2-2");
    }
}
