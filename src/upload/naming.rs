//! Remote object key naming
//!
//! Keys look like `uploads/<base>-<16 hex chars><.ext>`. The random suffix
//! keeps two uploads of the same file name from colliding.

use rand::rngs::OsRng;
use rand::RngCore;
use unicode_normalization::UnicodeNormalization;

use super::types::OBJECT_KEY_PREFIX;

const SUFFIX_BYTES: usize = 8;
const FALLBACK_NAME: &str = "file";

/// Reduce a client-supplied file name to a safe, flat ASCII name.
///
/// The name is NFKD-folded first so accented letters keep their base
/// letter. Path separators and whitespace become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped, and leading or trailing `.`/`_` are trimmed,
/// so `../../etc/passwd` becomes `etc_passwd`.
pub fn sanitize_filename(file_name: &str) -> String {
    let spaced: String = file_name
        .nfkd()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Split `name.ext` into `("name", ".ext")`; names without a dot, or whose
/// only dot is leading, have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && name[..idx].chars().any(|c| c != '.') => name.split_at(idx),
        _ => (name, ""),
    }
}

fn random_suffix() -> String {
    let mut bytes = [0u8; SUFFIX_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build a fresh object key for `file_name`
pub fn object_key(file_name: &str) -> String {
    let safe = sanitize_filename(file_name);
    let (base, extension) = split_extension(&safe);
    format!("{}{}-{}{}", OBJECT_KEY_PREFIX, base, random_suffix(), extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(sanitize_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("C:\\Users\\bob\\report.pdf"), "C_Users_bob_report.pdf");
        assert_eq!(sanitize_filename("résumé (final).docx"), "resume_final.docx");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
    }

    #[test]
    fn test_sanitize_folds_compatibility_forms() {
        assert_eq!(sanitize_filename("Crème Brûlée.txt"), "Creme_Brulee.txt");
        assert_eq!(sanitize_filename("ﬁle.pdf"), "file.pdf");
        // Fullwidth solidus folds to '/' and is treated as a separator
        assert_eq!(sanitize_filename("a／b.txt"), "a_b.txt");
    }

    #[test]
    fn test_sanitize_falls_back_when_nothing_is_left() {
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("../.."), "file");
        assert_eq!(sanitize_filename("日本語"), "file");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }

    #[test]
    fn test_object_key_with_extension() {
        let key = object_key("Quarterly Report.pdf");
        let rest = key.strip_prefix("uploads/Quarterly_Report-").unwrap();
        let (suffix, extension) = rest.split_at(SUFFIX_BYTES * 2);

        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(extension, ".pdf");
    }

    #[test]
    fn test_object_key_without_extension() {
        let key = object_key("Makefile");
        let suffix = key.strip_prefix("uploads/Makefile-").unwrap();
        assert_eq!(suffix.len(), SUFFIX_BYTES * 2);
    }

    #[test]
    fn test_object_keys_are_unique() {
        assert_ne!(object_key("same.txt"), object_key("same.txt"));
    }
}
