//! Reduce stored bytes to model-consumable content.
//!
//! Text files decode as UTF-8. PDFs get a best-effort scan for literal
//! text runs inside content streams; anything else is reported as
//! unsupported so the caller can degrade gracefully.

use px_proto::rpc::FileContent;

pub fn reduce(filename: &str, mimetype: &str, bytes: &[u8], image_url: String) -> FileContent {
    if mimetype.starts_with("image/") {
        return FileContent::ImageUrl { url: image_url };
    }
    if mimetype.starts_with("text/")
        || mimetype == "application/json"
        || mimetype == "application/xml"
    {
        return match String::from_utf8(bytes.to_vec()) {
            Ok(content) => FileContent::Text { content },
            Err(_) => FileContent::Unsupported {
                content: format!("file '{filename}' is not valid UTF-8"),
            },
        };
    }
    if mimetype == "application/pdf" {
        return match extract_pdf_text(bytes) {
            Some(content) if !content.trim().is_empty() => FileContent::Text { content },
            _ => FileContent::Unsupported {
                content: format!("no extractable text in PDF '{filename}'"),
            },
        };
    }
    FileContent::Unsupported {
        content: format!("unsupported mimetype '{mimetype}' for file '{filename}'"),
    }
}

/// Collect parenthesised string literals from PDF content streams.
/// Handles `\(`, `\)`, and `\\` escapes; ignores binary sections.
pub fn extract_pdf_text(bytes: &[u8]) -> Option<String> {
    if !bytes.starts_with(b"%PDF") {
        return None;
    }

    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_literal = false;
    let mut escape = false;

    for &b in bytes {
        if !in_literal {
            if b == b'(' {
                in_literal = true;
                current.clear();
            }
            continue;
        }
        if escape {
            match b {
                b'(' | b')' | b'\\' => current.push(b as char),
                b'n' => current.push('\n'),
                _ => {}
            }
            escape = false;
            continue;
        }
        match b {
            b'\\' => escape = true,
            b')' => {
                in_literal = false;
                if current.chars().any(|c| c.is_alphanumeric()) {
                    runs.push(std::mem::take(&mut current));
                }
            }
            0x20..=0x7e => current.push(b as char),
            b'\n' | b'\r' | b'\t' => current.push(' '),
            _ => {
                // Binary run inside a "literal": not text, bail out of it.
                in_literal = false;
                current.clear();
            }
        }
    }

    if runs.is_empty() {
        None
    } else {
        Some(runs.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_files_decode() {
        let content = reduce("notes.txt", "text/plain", b"hello world", String::new());
        assert!(matches!(
            content,
            FileContent::Text { content } if content == "hello world"
        ));
    }

    #[test]
    fn images_pass_through_as_urls() {
        let content = reduce(
            "cat.png",
            "image/png",
            b"\x89PNG",
            "http://files.test/raw/1".into(),
        );
        assert!(matches!(
            content,
            FileContent::ImageUrl { url } if url == "http://files.test/raw/1"
        ));
    }

    #[test]
    fn pdf_literals_are_extracted() {
        let pdf = b"%PDF-1.4\nBT (Hello) Tj (World\\)!) Tj ET";
        let text = extract_pdf_text(pdf).unwrap();
        assert_eq!(text, "Hello World)!");
    }

    #[test]
    fn pdf_without_text_is_unsupported() {
        let content = reduce("scan.pdf", "application/pdf", b"%PDF-1.4\n\xff\xfe", String::new());
        assert!(matches!(content, FileContent::Unsupported { .. }));
    }

    #[test]
    fn binary_blob_is_unsupported() {
        let content = reduce("a.bin", "application/octet-stream", b"\x00\x01", String::new());
        assert!(matches!(content, FileContent::Unsupported { .. }));
    }

    #[test]
    fn non_pdf_bytes_yield_none() {
        assert!(extract_pdf_text(b"(not a pdf)").is_none());
    }
}
