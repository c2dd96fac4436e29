//! Embedded document metadata.
//!
//! EXIF fields come from kamadak-exif, which understands TIFF, JPEG, HEIF,
//! PNG and WebP containers. PDF files expose their version and the literal
//! strings of their document information dictionary.

use std::collections::BTreeMap;
use std::io::Cursor;

use exif::{In, Reader};
use regex::bytes::Regex;

const PDF_INFO_KEYS: [&str; 8] = [
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Creator",
    "Producer",
    "CreationDate",
    "ModDate",
];
const MAX_PDF_VALUE: usize = 256;

/// Metadata of `data` keyed by field name; empty when none is found.
pub fn extract(data: &[u8]) -> BTreeMap<String, String> {
    if data.starts_with(b"%PDF-") {
        pdf_info(data)
    } else {
        exif_fields(data)
    }
}

/// Every EXIF field. Fields of the thumbnail IFD are prefixed `Thumbnail`.
pub fn exif_fields(data: &[u8]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let exif = match Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif) => exif,
        Err(e) => {
            log::debug!("No EXIF data: {}", e);
            return out;
        }
    };

    for field in exif.fields() {
        let name = if field.ifd_num == In::PRIMARY {
            field.tag.to_string()
        } else {
            format!("Thumbnail{}", field.tag)
        };
        out.insert(name, field.display_value().with_unit(&exif).to_string());
    }
    out
}

fn pdf_info(data: &[u8]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();

    let header_end = data
        .iter()
        .take(16)
        .position(|&b| b == b'\n' || b == b'\r')
        .unwrap_or(data.len().min(16));
    let version = String::from_utf8_lossy(&data[5..header_end]).trim().to_string();
    if !version.is_empty() {
        out.insert("PDFVersion".to_string(), version);
    }

    let pattern = format!(r"/({})\s*\(([^)]*)\)", PDF_INFO_KEYS.join("|"));
    let Ok(pattern) = Regex::new(&pattern) else {
        return out;
    };
    // first occurrence wins
    for captures in pattern.captures_iter(data) {
        let key = String::from_utf8_lossy(&captures[1]).to_string();
        let value = &captures[2];
        if value.is_empty() || value.len() >= MAX_PDF_VALUE {
            continue;
        }
        out.entry(key)
            .or_insert_with(|| String::from_utf8_lossy(value).to_string());
    }
    out
}
