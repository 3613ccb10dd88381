//! Raw artifact validation

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Smallest plausible PDF
pub const MIN_PDF_BYTES: u64 = 1024;

/// Trailing window searched for the `%%EOF` marker
pub const EOF_WINDOW: u64 = 4096;

const PDF_MAGIC: &[u8] = b"%PDF";
const PDF_HEADER: &[u8] = b"%PDF-";
const PDF_EOF: &[u8] = b"%%EOF";

/// Declared type or magic number says PDF
pub fn sniff(content_type: Option<&str>, body: &[u8]) -> bool {
    let declared = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/pdf"))
        .unwrap_or(false);
    declared || body.starts_with(PDF_MAGIC)
}

/// Strict format check on an in-memory payload
pub fn check_pdf_bytes(bytes: &[u8]) -> Result<(), String> {
    let tail_start = bytes.len().saturating_sub(EOF_WINDOW as usize);
    check_parts(bytes.len() as u64, bytes, &bytes[tail_start..])
}

/// Strict format check on a file
///
/// The outer `Err` is an I/O failure; the inner one is a validation failure.
pub fn check_pdf_file(path: &Path) -> io::Result<Result<(), String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut head = [0u8; 5];
    let read = file.read(&mut head)?;

    let tail_len = len.min(EOF_WINDOW);
    file.seek(SeekFrom::Start(len - tail_len))?;
    let mut tail = Vec::with_capacity(tail_len as usize);
    file.take(tail_len).read_to_end(&mut tail)?;

    Ok(check_parts(len, &head[..read], &tail))
}

/// Whether a file exists and passes [`check_pdf_file`]
///
/// Reads only the header and the trailing window; unreadable files fail.
pub fn passes_strict_check(path: &Path) -> bool {
    matches!(check_pdf_file(path), Ok(Ok(())))
}

/// Cheap existence check used for skip decisions
pub fn exists_nonempty(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

fn check_parts(len: u64, head: &[u8], tail: &[u8]) -> Result<(), String> {
    if len < MIN_PDF_BYTES {
        return Err(format!("too small ({} bytes)", len));
    }
    if !head.starts_with(PDF_HEADER) {
        return Err("missing %PDF- header".to_string());
    }
    if !tail.windows(PDF_EOF.len()).any(|w| w == PDF_EOF) {
        return Err("missing %%EOF marker".to_string());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend(std::iter::repeat(b'x').take(2000));
    bytes.extend_from_slice(b"\ntrailer\n%%EOF\n");
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff() {
        assert!(sniff(Some("application/pdf; charset=binary"), b""));
        assert!(sniff(Some("Application/PDF"), b""));
        assert!(sniff(None, b"%PDF-1.4"));
        assert!(!sniff(Some("text/html"), b"<html>"));
    }

    #[test]
    fn test_strict_bytes() {
        assert!(check_pdf_bytes(&sample_pdf()).is_ok());
        assert!(check_pdf_bytes(b"%PDF-1.4 %%EOF").unwrap_err().contains("too small"));

        let mut truncated = sample_pdf();
        truncated.truncate(1500);
        assert!(check_pdf_bytes(&truncated).unwrap_err().contains("%%EOF"));

        let mut html = sample_pdf();
        html[..5].copy_from_slice(b"<html");
        assert!(check_pdf_bytes(&html).unwrap_err().contains("header"));
    }

    #[test]
    fn test_eof_outside_window_rejected() {
        let mut bytes = sample_pdf();
        bytes.extend(std::iter::repeat(b' ').take(5000));
        assert!(check_pdf_bytes(&bytes).is_err());
    }

    #[test]
    fn test_file_check_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, sample_pdf()).unwrap();
        assert!(check_pdf_file(&path).unwrap().is_ok());
        assert!(exists_nonempty(&path));

        std::fs::write(&path, b"").unwrap();
        assert!(check_pdf_file(&path).unwrap().is_err());
        assert!(!exists_nonempty(&path));

        assert!(check_pdf_file(&dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn test_strict_check_rejects_html_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, sample_pdf()).unwrap();
        assert!(passes_strict_check(&path));

        std::fs::write(&path, "<html>captcha page</html>".repeat(100)).unwrap();
        assert!(exists_nonempty(&path));
        assert!(!passes_strict_check(&path));

        assert!(!passes_strict_check(&dir.path().join("missing.pdf")));
    }
}
