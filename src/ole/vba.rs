//! VBA project streams: the compressed container format and the `dir`
//! stream that lists a project's modules.

use std::io;

use encoding_rs::WINDOWS_1252;

const CHUNK_SIZE: usize = 4096;
const SIGNATURE: u8 = 0x01;

const PROJECTCODEPAGE: u16 = 0x0003;
const PROJECTVERSION: u16 = 0x0009;
const PROJECTEND: u16 = 0x0010;
const MODULENAME: u16 = 0x0019;
const MODULESTREAMNAME: u16 = 0x001A;
const MODULETYPE_PROCEDURAL: u16 = 0x0021;
const MODULETYPE_DOCUMENT: u16 = 0x0022;
const MODULETERMINATOR: u16 = 0x002B;
const MODULEOFFSET: u16 = 0x0031;
const MODULESTREAMNAME_UNICODE: u16 = 0x0032;

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Number of offset bits in a copy token at `position` bytes into the
/// decompressed chunk.
fn offset_bits(position: usize) -> u32 {
    let mut bits = 4;
    while (1usize << bits) < position && bits < 12 {
        bits += 1;
    }
    bits
}

/// Expand a compressed container.
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    match data.first() {
        Some(&SIGNATURE) => {}
        Some(other) => return Err(invalid(format!("bad container signature {:#04x}", other))),
        None => return Err(invalid("empty compressed container")),
    }

    let mut out = Vec::with_capacity(data.len() * 2);
    let mut pos = 1;
    while pos + 2 <= data.len() {
        let header = u16::from_le_bytes([data[pos], data[pos + 1]]);
        let chunk_len = (header & 0x0FFF) as usize + 3;
        let compressed = header & 0x8000 != 0;
        let end = (pos + chunk_len).min(data.len());
        pos += 2;

        let chunk_start = out.len();
        if !compressed {
            let raw_end = (pos + CHUNK_SIZE).min(data.len());
            out.extend_from_slice(&data[pos..raw_end]);
            pos = raw_end;
            continue;
        }

        while pos < end {
            let flags = data[pos];
            pos += 1;
            for bit in 0..8 {
                if pos >= end {
                    break;
                }
                if flags & (1 << bit) == 0 {
                    out.push(data[pos]);
                    pos += 1;
                    continue;
                }

                if pos + 2 > end {
                    return Err(invalid("truncated copy token"));
                }
                let token = u16::from_le_bytes([data[pos], data[pos + 1]]);
                pos += 2;

                let bits = offset_bits(out.len() - chunk_start);
                let length_mask = 0xFFFFu16 >> bits;
                let length = (token & length_mask) as usize + 3;
                let offset = (token >> (16 - bits)) as usize + 1;
                if offset > out.len() - chunk_start {
                    return Err(invalid("copy token points before chunk start"));
                }
                let from = out.len() - offset;
                for i in 0..length {
                    let byte = out[from + i];
                    out.push(byte);
                }
            }
        }
        pos = end;
    }
    Ok(out)
}

/// Module entry of a VBA project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub stream_name: String,
    pub offset: usize,
    /// Document and class modules export as `.cls`, the rest as `.bas`
    pub is_class: bool,
}

impl Module {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, if self.is_class { "cls" } else { "bas" })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    pub codepage: u16,
    pub modules: Vec<Module>,
}

fn utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Decode text stored in a Windows codepage; unknown codepages read as
/// windows-1252.
pub fn decode_mbcs(bytes: &[u8], codepage: u16) -> String {
    let encoding = codepage::to_encoding(codepage).unwrap_or(WINDOWS_1252);
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}

/// Parse a decompressed `dir` stream.
pub fn parse_dir(dir: &[u8]) -> io::Result<Project> {
    let mut project = Project::default();
    let mut current: Option<Module> = None;
    let mut pos = 0;

    while pos + 6 <= dir.len() {
        let id = u16::from_le_bytes([dir[pos], dir[pos + 1]]);
        let size = u32::from_le_bytes([dir[pos + 2], dir[pos + 3], dir[pos + 4], dir[pos + 5]]) as usize;
        pos += 6;

        // the size field of PROJECTVERSION is reserved; six bytes follow
        let size = if id == PROJECTVERSION { 6 } else { size };
        let Some(body) = dir.get(pos..pos + size) else {
            return Err(invalid(format!("dir record {:#06x} overruns the stream", id)));
        };
        pos += size;

        match id {
            PROJECTCODEPAGE if size >= 2 => {
                project.codepage = u16::from_le_bytes([body[0], body[1]]);
            }
            MODULENAME => {
                current = Some(Module {
                    name: decode_mbcs(body, project.codepage),
                    ..Default::default()
                });
            }
            MODULESTREAMNAME => {
                if let Some(module) = current.as_mut() {
                    module.stream_name = decode_mbcs(body, project.codepage);
                }
            }
            MODULESTREAMNAME_UNICODE => {
                if let Some(module) = current.as_mut() {
                    module.stream_name = utf16le(body);
                }
            }
            MODULEOFFSET if size >= 4 => {
                if let Some(module) = current.as_mut() {
                    module.offset = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
                }
            }
            MODULETYPE_DOCUMENT => {
                if let Some(module) = current.as_mut() {
                    module.is_class = true;
                }
            }
            MODULETYPE_PROCEDURAL => {
                if let Some(module) = current.as_mut() {
                    module.is_class = false;
                }
            }
            MODULETERMINATOR => {
                if let Some(module) = current.take() {
                    project.modules.push(module);
                }
            }
            PROJECTEND => break,
            _ => {}
        }
    }
    Ok(project)
}
