//! PE (Windows) executable report.

use chrono::DateTime;
use goblin::pe::section_table::SectionTable;
use goblin::pe::PE;
use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::hashes::{entropy, Digests};
use super::pehash::pehashng;
use super::version::version_strings;

const IMAGE_FILE_EXECUTABLE_IMAGE: u16 = 0x0002;
const SUBSYSTEM_NATIVE: u16 = 1;
const SUBSYSTEM_NATIVE_WINDOWS: u16 = 8;

const DRIVER_IMPORTS: [&str; 5] = ["ntoskrnl.exe", "hal.dll", "ndis.sys", "bootvid.dll", "kdcom.dll"];
const DRIVER_SECTIONS: [&str; 2] = ["page", "paged"];

/// Raw bytes of a section, clamped to the file.
pub(crate) fn section_data<'a>(section: &SectionTable, data: &'a [u8]) -> &'a [u8] {
    let start = (section.pointer_to_raw_data as usize).min(data.len());
    let end = start
        .saturating_add(section.size_of_raw_data as usize)
        .min(data.len());
    &data[start..end]
}

fn section_name(section: &SectionTable) -> String {
    String::from_utf8_lossy(&section.name)
        .trim_end_matches('\0')
        .to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionEntry {
    #[serde(rename = "entryname")]
    pub name: String,
    #[serde(rename = "SizeOfRawData")]
    pub size_of_raw_data: String,
    #[serde(rename = "Entropy")]
    pub entropy: f64,
    #[serde(rename = "MD5")]
    pub md5: String,
    #[serde(rename = "SHA1")]
    pub sha1: String,
    #[serde(rename = "SHA256")]
    pub sha256: String,
    #[serde(rename = "SHA512")]
    pub sha512: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEntry {
    #[serde(rename = "entryname")]
    pub dll: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionEntry {
    #[serde(rename = "Info")]
    pub info: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BasicInformation {
    #[serde(rename = "FileInfo")]
    pub file_info: Vec<VersionEntry>,
    #[serde(rename = "FileSize")]
    pub file_size: usize,
    #[serde(rename = "TargetMachine")]
    pub target_machine: String,
    #[serde(rename = "CompilationTimestamp")]
    pub compilation_timestamp: String,
    #[serde(rename = "EntryPoint")]
    pub entry_point: String,
}

/// Everything the PE report exposes about one executable.
#[derive(Debug, Clone)]
pub struct PeReport {
    /// libmagic-style description, e.g. `PE32 executable (GUI) Intel 80386, for MS Windows`
    pub description: String,
    pub imphash: String,
    pub pehash: Option<String>,
    pub operating_system: Option<String>,
    pub kind: Option<&'static str>,
    pub basic: BasicInformation,
    pub sections: Vec<SectionEntry>,
    pub imports: Vec<ImportEntry>,
}

impl PeReport {
    pub fn parse(data: &[u8]) -> Result<Self, goblin::error::Error> {
        let pe = PE::parse(data)?;

        let imports = group_imports(&pe);
        let sections = pe
            .sections
            .iter()
            .map(|section| {
                let body = section_data(section, data);
                let digests = Digests::compute(body);
                SectionEntry {
                    name: section_name(section),
                    size_of_raw_data: format!("{:#x}", section.size_of_raw_data),
                    entropy: entropy(body),
                    md5: digests.md5,
                    sha1: digests.sha1,
                    sha256: digests.sha256,
                    sha512: digests.sha512,
                }
            })
            .collect();

        let pehash = pehashng(&pe, data).unwrap_or_else(|e| {
            log::warn!("peHashNG computation failed: {}", e);
            None
        });

        let file_info = version_strings(&pe, data)
            .into_iter()
            .map(|(info, value)| VersionEntry { info, value })
            .collect();

        let coff = &pe.header.coff_header;
        Ok(Self {
            description: describe(&pe),
            imphash: imphash(&imports, &pe),
            pehash,
            operating_system: pe.header.optional_header.map(|o| {
                format!(
                    "{}.{}",
                    o.windows_fields.major_operating_system_version,
                    o.windows_fields.minor_operating_system_version
                )
            }),
            kind: image_kind(&pe, &imports),
            basic: BasicInformation {
                file_info,
                file_size: data.len(),
                target_machine: target_machine(coff.machine),
                compilation_timestamp: compilation_timestamp(coff.time_date_stamp),
                entry_point: format!("{:#x}", pe.entry),
            },
            sections,
            imports,
        })
    }

    /// PE-specific members of the `Identification` block.
    pub fn identification(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("impash".to_string(), json!(self.imphash));
        out.insert("pehash".to_string(), json!(self.pehash));
        out.insert("OperatingSystem".to_string(), json!(self.operating_system));
        out.insert("Type".to_string(), json!(self.kind));
        out
    }

    /// `BasicInformation`, `Sections` and `ImportAdressTable` members.
    pub fn details(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("BasicInformation".to_string(), json!(self.basic));
        out.insert("Sections".to_string(), json!(self.sections));
        out.insert("ImportAdressTable".to_string(), json!(self.imports));
        out
    }
}

fn group_imports(pe: &PE) -> Vec<ImportEntry> {
    let mut grouped: Vec<ImportEntry> = Vec::new();
    for import in &pe.imports {
        let symbol = import.name.to_string();
        match grouped.iter_mut().find(|entry| entry.dll == import.dll) {
            Some(entry) => entry.symbols.push(symbol),
            None => grouped.push(ImportEntry {
                dll: import.dll.to_string(),
                symbols: vec![symbol],
            }),
        }
    }
    grouped
}

/// Import hash: MD5 of `lib.function` pairs in import order.
fn imphash(imports: &[ImportEntry], pe: &PE) -> String {
    if imports.is_empty() {
        return String::new();
    }

    let mut parts = Vec::new();
    for import in &pe.imports {
        let dll = import.dll.to_lowercase();
        let library = match dll.rsplit_once('.') {
            Some((stem, "ocx" | "sys" | "dll")) => stem.to_string(),
            _ => dll.clone(),
        };
        let function = if import.name.starts_with("ORDINAL ") {
            format!("ord{}", import.ordinal)
        } else {
            import.name.to_lowercase()
        };
        parts.push(format!("{}.{}", library, function));
    }

    hex::encode(Md5::digest(parts.join(",").as_bytes()))
}

fn image_kind(pe: &PE, imports: &[ImportEntry]) -> Option<&'static str> {
    if pe.is_lib {
        return Some("DLL");
    }

    let driver_import = imports
        .iter()
        .any(|entry| DRIVER_IMPORTS.contains(&entry.dll.to_lowercase().as_str()));
    let native = pe
        .header
        .optional_header
        .is_some_and(|o| matches!(o.windows_fields.subsystem, SUBSYSTEM_NATIVE | SUBSYSTEM_NATIVE_WINDOWS));
    let driver_section = pe
        .sections
        .iter()
        .any(|s| DRIVER_SECTIONS.contains(&section_name(s).to_lowercase().as_str()));
    if driver_import || (native && driver_section) {
        return Some("DRIVER");
    }

    if pe.header.coff_header.characteristics & IMAGE_FILE_EXECUTABLE_IMAGE != 0 {
        return Some("EXE");
    }
    None
}

pub fn target_machine(machine: u16) -> String {
    match machine {
        0x014c => "x86".to_string(),
        0x0200 => "Itanium".to_string(),
        0x8664 => "x64".to_string(),
        other => format!("{} => Not x86/64 or Itanium", other),
    }
}

/// `0x%08X [%a %b %d %H:%M:%S %Y UTC]`
pub fn compilation_timestamp(stamp: u32) -> String {
    match DateTime::from_timestamp(stamp as i64, 0) {
        Some(time) => format!("0x{:08X} [{} UTC]", stamp, time.format("%a %b %d %H:%M:%S %Y")),
        None => format!("0x{:08X}", stamp),
    }
}

fn describe(pe: &PE) -> String {
    let mut parts = vec![if pe.is_64 { "PE32+ executable" } else { "PE32 executable" }.to_string()];
    if pe.is_lib {
        parts.push("(DLL)".to_string());
    }
    if let Some(optional) = pe.header.optional_header {
        let subsystem = match optional.windows_fields.subsystem {
            1 => Some("(native)"),
            2 => Some("(GUI)"),
            3 => Some("(console)"),
            10..=13 => Some("(EFI application)"),
            _ => None,
        };
        parts.extend(subsystem.map(str::to_string));
    }
    let machine = match pe.header.coff_header.machine {
        0x014c => "Intel 80386",
        0x8664 => "x86-64",
        0x0200 => "Intel Itanium",
        0x01c0 | 0x01c4 => "ARM",
        0xaa64 => "Aarch64",
        _ => "unknown processor",
    };
    format!("{} {}, for MS Windows", parts.join(" "), machine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tiny_pe;

    #[test]
    fn test_tiny_pe_report() {
        let data = tiny_pe();
        let report = PeReport::parse(&data).unwrap();

        assert_eq!(report.description, "PE32 executable (GUI) Intel 80386, for MS Windows");
        assert_eq!(report.kind, Some("EXE"));
        assert_eq!(report.operating_system.as_deref(), Some("5.1"));
        assert_eq!(report.imphash, "");
        assert!(report.imports.is_empty());
        assert!(report.basic.file_info.is_empty());
        assert_eq!(report.basic.file_size, data.len());
        assert_eq!(report.basic.target_machine, "x86");
        assert_eq!(report.basic.entry_point, "0x1000");
        assert_eq!(
            report.basic.compilation_timestamp,
            "0x4A5BC60F [Mon Jul 13 23:41:03 2009 UTC]"
        );

        assert_eq!(report.sections.len(), 1);
        let text = &report.sections[0];
        assert_eq!(text.name, ".text");
        assert_eq!(text.size_of_raw_data, "0x200");
        assert_eq!(text.sha256, Digests::compute(&data[0x200..0x400]).sha256);
        assert_eq!(report.pehash.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_report_json_names() {
        let report = PeReport::parse(&tiny_pe()).unwrap();
        let details = report.details();
        assert_eq!(details["BasicInformation"]["TargetMachine"], "x86");
        assert_eq!(details["Sections"][0]["entryname"], ".text");
        assert!(details["Sections"][0].get("SHA512").is_some());
        assert_eq!(details["ImportAdressTable"], json!([]));

        let identification = report.identification();
        assert_eq!(identification["Type"], "EXE");
        assert_eq!(identification["OperatingSystem"], "5.1");
    }

    #[test]
    fn test_machine_names() {
        assert_eq!(target_machine(0x8664), "x64");
        assert_eq!(target_machine(0x0200), "Itanium");
        assert_eq!(target_machine(0x01c0), "448 => Not x86/64 or Itanium");
    }

    #[test]
    fn test_not_a_pe() {
        assert!(PeReport::parse(b"MZ but nothing else").is_err());
    }

    #[test]
    fn test_section_data_is_clamped() {
        let section = SectionTable {
            pointer_to_raw_data: 8,
            size_of_raw_data: 100,
            ..Default::default()
        };
        assert_eq!(section_data(&section, &[0u8; 10]).len(), 2);
        let beyond = SectionTable {
            pointer_to_raw_data: 50,
            size_of_raw_data: 100,
            ..Default::default()
        };
        assert!(section_data(&beyond, &[0u8; 10]).is_empty());
    }
}
