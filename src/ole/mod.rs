//! OLE compound documents and the VBA projects stored inside them.
//!
//! `OleFile` wraps a `cfb` compound file held in memory. Office Open XML
//! packages are zip archives that carry their VBA project as an embedded
//! compound file (`vbaProject.bin`); `extract_macros` handles both.

pub mod scanner;
pub mod vba;

use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use cfb::CompoundFile;

pub const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const VBA_PROJECT_PART: &str = "vbaproject.bin";

fn invalid(error: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

/// Display form of a stream path: relative, `/`-separated.
fn display_path(path: &Path) -> String {
    path.to_string_lossy().trim_start_matches('/').to_string()
}

/// An in-memory compound file.
pub struct OleFile {
    inner: CompoundFile<Cursor<Vec<u8>>>,
}

impl OleFile {
    pub fn open(data: Vec<u8>) -> io::Result<Self> {
        Ok(Self {
            inner: CompoundFile::open(Cursor::new(data))?,
        })
    }

    /// Contents of the stream at `path`, `None` if there is no such stream.
    pub fn read_stream(&mut self, path: impl AsRef<Path>) -> io::Result<Option<Vec<u8>>> {
        let path = path.as_ref();
        if !self.inner.is_stream(path) {
            return Ok(None);
        }
        let mut stream = self.inner.open_stream(path)?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    /// A MAPI string property of `storage`. The UTF-16 (`001F`) variant is
    /// preferred over the 8-bit one (`001E`), whose non-ASCII bytes are dropped.
    pub fn string_property(&mut self, storage: &str, tag: &str) -> io::Result<Option<String>> {
        let stream = |kind: &str| Path::new(storage).join(format!("__substg1.0_{}{}", tag, kind));
        if let Some(bytes) = self.read_stream(stream("001F"))? {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            return Ok(Some(String::from_utf16_lossy(&units)));
        }
        let ascii = self.read_stream(stream("001E"))?;
        Ok(ascii.map(|bytes| bytes.iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect()))
    }

    /// Paths of the storages directly under `storage` whose name starts with `prefix`.
    pub fn storages(&self, storage: &str, prefix: &str) -> io::Result<Vec<String>> {
        let mut found: Vec<String> = self
            .inner
            .read_storage(storage)?
            .filter(|entry| entry.is_storage() && entry.name().starts_with(prefix))
            .map(|entry| entry.path().to_string_lossy().to_string())
            .collect();
        found.sort();
        Ok(found)
    }

    /// Storages that hold a VBA project, i.e. a `VBA/dir` stream.
    pub fn vba_roots(&self) -> Vec<PathBuf> {
        self.inner
            .walk()
            .filter(|entry| entry.is_stream() && entry.name().eq_ignore_ascii_case("dir"))
            .filter_map(|entry| {
                let vba = entry.path().parent()?;
                let is_vba = vba
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case("VBA"));
                is_vba.then(|| vba.parent().map(Path::to_path_buf)).flatten()
            })
            .collect()
    }

    /// Decompressed source of every module of every VBA project.
    pub fn macros(&mut self, container: &str) -> io::Result<Vec<MacroSource>> {
        let mut sources = Vec::new();
        for root in self.vba_roots() {
            let vba = root.join("VBA");
            let Some(dir) = self.read_stream(vba.join("dir"))? else {
                continue;
            };
            let project = vba::parse_dir(&vba::decompress(&dir)?)?;
            log::debug!(
                "VBA project at {} declares {} modules (codepage {})",
                root.display(),
                project.modules.len(),
                project.codepage
            );

            let codepage = project.codepage;
            for module in project.modules {
                let stream_path = vba.join(&module.stream_name);
                let Some(stream) = self.read_stream(&stream_path)? else {
                    log::warn!("Module stream {} is missing", stream_path.display());
                    continue;
                };
                let compressed = stream.get(module.offset..).unwrap_or_default();
                let code = vba::decode_mbcs(&vba::decompress(compressed)?, codepage);
                sources.push(MacroSource {
                    container: container.to_string(),
                    stream_path: display_path(&stream_path),
                    vba_filename: module.file_name(),
                    code,
                });
            }
        }
        Ok(sources)
    }
}

/// Source code of one VBA module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSource {
    /// File (or package part) the project was read from
    pub container: String,
    pub stream_path: String,
    pub vba_filename: String,
    pub code: String,
}

/// VBA modules of an OLE file or an OOXML package. `Ok(None)` means the
/// data is neither.
pub fn extract_macros(data: Vec<u8>, file_name: &str) -> io::Result<Option<Vec<MacroSource>>> {
    if data.starts_with(&OLE_MAGIC) {
        let mut ole = OleFile::open(data)?;
        return ole.macros(file_name).map(Some);
    }
    if !data.starts_with(&ZIP_MAGIC) {
        return Ok(None);
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(invalid)?;
    let mut sources = Vec::new();
    for index in 0..archive.len() {
        let mut part = archive.by_index(index).map_err(invalid)?;
        let name = part.name().to_string();
        if !name.to_lowercase().ends_with(VBA_PROJECT_PART) {
            continue;
        }
        let mut bytes = Vec::new();
        part.read_to_end(&mut bytes)?;
        if !bytes.starts_with(&OLE_MAGIC) {
            log::warn!("{} is not a compound file", name);
            continue;
        }
        sources.extend(OleFile::open(bytes)?.macros(&name)?);
    }
    Ok(Some(sources))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::vba::tests::{compress, dir_stream};
    use super::*;
    use std::io::Write;

    /// Build a compound file from `(path, bytes)` streams.
    pub(crate) fn compound_file(streams: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut file = CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        for (path, bytes) in streams {
            let path = Path::new(path);
            let mut ancestors: Vec<&Path> = path.ancestors().skip(1).collect();
            ancestors.reverse();
            for storage in ancestors {
                if storage != Path::new("/") && !file.exists(storage) {
                    file.create_storage(storage).unwrap();
                }
            }
            let mut stream = file.create_stream(path).unwrap();
            stream.write_all(bytes).unwrap();
            stream.flush().unwrap();
        }
        file.flush().unwrap();
        file.into_inner().into_inner()
    }

    /// A document whose VBA project lives under `root`.
    pub(crate) fn vba_document(root: &str, modules: &[(&str, &str)]) -> Vec<u8> {
        let offset = 4u32;
        let declared: Vec<(&str, u32, bool)> = modules.iter().map(|(name, _)| (*name, offset, false)).collect();
        let mut streams = vec![(format!("{}/VBA/dir", root), compress(&dir_stream(&declared)))];
        for (name, code) in modules {
            let mut stream = vec![0xAA; offset as usize];
            stream.extend(compress(code.as_bytes()));
            streams.push((format!("{}/VBA/{}", root, name), stream));
        }
        let streams: Vec<(&str, Vec<u8>)> = streams.iter().map(|(p, b)| (p.as_str(), b.clone())).collect();
        compound_file(&streams)
    }

    #[test]
    fn test_string_property_prefers_unicode() {
        let unicode: Vec<u8> = "Héllo".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let data = compound_file(&[
            ("/__substg1.0_0037001F", unicode),
            ("/__substg1.0_0037001E", b"Hello".to_vec()),
            ("/__substg1.0_0042001E", b"Caf\xe9 Bob".to_vec()),
        ]);
        let mut ole = OleFile::open(data).unwrap();
        assert_eq!(ole.string_property("/", "0037").unwrap().as_deref(), Some("Héllo"));
        assert_eq!(ole.string_property("/", "0042").unwrap().as_deref(), Some("Caf Bob"));
        assert_eq!(ole.string_property("/", "1000").unwrap(), None);
    }

    #[test]
    fn test_storages_by_prefix() {
        let data = compound_file(&[
            ("/__attach_version1.0_#00000001/__substg1.0_3707001F", vec![]),
            ("/__attach_version1.0_#00000000/__substg1.0_3707001F", vec![]),
            ("/__recip_version1.0_#00000000/__substg1.0_3001001F", vec![]),
        ]);
        let ole = OleFile::open(data).unwrap();
        assert_eq!(
            ole.storages("/", "__attach").unwrap(),
            vec!["/__attach_version1.0_#00000000", "/__attach_version1.0_#00000001"]
        );
    }

    #[test]
    fn test_macros_from_ole() {
        let data = vba_document("/Macros", &[("Module1", "Sub AutoOpen()\r\nEnd Sub\r\n")]);
        let sources = extract_macros(data, "doc.doc").unwrap().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].container, "doc.doc");
        assert_eq!(sources[0].stream_path, "Macros/VBA/Module1");
        assert_eq!(sources[0].vba_filename, "Module1.bas");
        assert_eq!(sources[0].code, "Sub AutoOpen()\r\nEnd Sub\r\n");
    }

    #[test]
    fn test_macros_from_ooxml() {
        let project = vba_document("", &[("Module1", "Sub Hi()\r\nEnd Sub\r\n")]);
        let mut package = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        package.start_file("[Content_Types].xml", options).unwrap();
        package.write_all(b"<Types/>").unwrap();
        package.start_file("word/vbaProject.bin", options).unwrap();
        package.write_all(&project).unwrap();
        let data = package.finish().unwrap().into_inner();

        let sources = extract_macros(data, "doc.docm").unwrap().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].container, "word/vbaProject.bin");
        assert_eq!(sources[0].stream_path, "VBA/Module1");
    }

    #[test]
    fn test_no_project_and_unsupported() {
        let data = compound_file(&[("/WordDocument", vec![0u8; 16])]);
        assert_eq!(extract_macros(data, "x").unwrap(), Some(vec![]));
        assert_eq!(extract_macros(b"plain text".to_vec(), "x").unwrap(), None);
        assert!(extract_macros(OLE_MAGIC.to_vec(), "x").is_err());
    }
}
