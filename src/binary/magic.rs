//! Content-based file type identification.

use std::path::Path;

pub const DOS_EXECUTABLE: &str = "application/x-dosexec";

/// MIME type and human readable description of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileType {
    pub mime: String,
    pub description: String,
}

impl FileType {
    fn new(mime: &str, description: &str) -> Self {
        Self {
            mime: mime.to_string(),
            description: description.to_string(),
        }
    }
}

fn signature(data: &[u8]) -> Option<(&'static str, &'static str)> {
    match data {
        [0x4D, 0x5A, ..] => Some((DOS_EXECUTABLE, "MS-DOS executable")),
        [0x7F, 0x45, 0x4C, 0x46, ..] => Some(("application/x-executable", "ELF executable")),
        [0xFF, 0xD8, 0xFF, ..] => Some(("image/jpeg", "JPEG image data")),
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(("image/png", "PNG image data")),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(("image/gif", "GIF image data")),
        [b'I', b'I', 0x2A, 0x00, ..] => Some(("image/tiff", "TIFF image data, little-endian")),
        [b'M', b'M', 0x00, 0x2A, ..] => Some(("image/tiff", "TIFF image data, big-endian")),
        [b'B', b'M', ..] => Some(("image/bmp", "PC bitmap")),
        [0x00, 0x00, 0x01, 0x00, ..] => Some(("image/vnd.microsoft.icon", "MS Windows icon resource")),
        [0x25, 0x50, 0x44, 0x46, ..] => Some(("application/pdf", "PDF document")),
        [0x1F, 0x8B, 0x08, ..] => Some(("application/gzip", "gzip compressed data")),
        [0x42, 0x5A, 0x68, ..] => Some(("application/x-bzip2", "bzip2 compressed data")),
        [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, ..] => Some(("application/x-xz", "XZ compressed data")),
        [b'R', b'a', b'r', b'!', 0x1A, 0x07, ..] => Some(("application/x-rar", "RAR archive data")),
        [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, ..] => Some(("application/x-7z-compressed", "7-zip archive data")),
        [0xCA, 0xFE, 0xBA, 0xBE, ..] => Some(("application/x-mach-binary", "Mach-O universal binary")),
        [0xFE, 0xED, 0xFA, 0xCE | 0xCF, ..] | [0xCE | 0xCF, 0xFA, 0xED, 0xFE, ..] => {
            Some(("application/x-mach-binary", "Mach-O executable"))
        }
        [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, ..] => {
            Some(("application/CDFV2", "Composite Document File V2 Document"))
        }
        [0x50, 0x4B, 0x03, 0x04, ..] => Some(zip_flavour(data)),
        [0x50, 0x4B, 0x05 | 0x07, 0x06 | 0x08, ..] => Some(("application/zip", "Zip archive data")),
        [b'{', b'\\', b'r', b't', b'f', ..] => Some(("text/rtf", "Rich Text Format data")),
        data if data.starts_with(b"SQLite format 3\0") => Some(("application/x-sqlite3", "SQLite 3.x database")),
        _ => None,
    }
}

/// Office Open XML packages are zip files whose first entry names the
/// application part.
fn zip_flavour(data: &[u8]) -> (&'static str, &'static str) {
    let head = String::from_utf8_lossy(&data[..data.len().min(2048)]);
    if head.contains("word/") {
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "Microsoft Word 2007+",
        )
    } else if head.contains("xl/") {
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "Microsoft Excel 2007+",
        )
    } else if head.contains("ppt/") {
        (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "Microsoft PowerPoint 2007+",
        )
    } else {
        ("application/zip", "Zip archive data")
    }
}

/// Heuristic: few control characters in the first KiB.
pub fn is_likely_text(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    let sample = &data[..data.len().min(1024)];
    let control = sample
        .iter()
        .filter(|&&b| b < 32 && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0C))
        .count();
    (control as f64) / (sample.len() as f64) < 0.05
}

/// Identify `data`. `file_name` only refines the MIME type of text content
/// (`.csv`, `.html`...); unrecognised binary content is
/// `application/octet-stream` whatever it is called.
pub fn identify(data: &[u8], file_name: &str) -> FileType {
    if data.is_empty() {
        return FileType::new("application/x-empty", "empty");
    }
    if let Some((mime, description)) = signature(data) {
        return FileType::new(mime, description);
    }
    if !is_likely_text(data) {
        return FileType::new("application/octet-stream", "data");
    }

    let description = if data.is_ascii() {
        "ASCII text"
    } else if std::str::from_utf8(data).is_ok() {
        "UTF-8 Unicode text"
    } else {
        "ISO-8859 text"
    };
    let mime = mime_guess::from_path(Path::new(file_name))
        .iter()
        .find(|guess| guess.type_() == mime_guess::mime::TEXT)
        .map(|guess| guess.essence_str().to_string())
        .unwrap_or_else(|| "text/plain".to_string());
    FileType {
        mime,
        description: description.to_string(),
    }
}
