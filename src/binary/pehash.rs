//! peHashNG: SHA-256 over structural PE properties.
//!
//! Two builds of the same program usually share the same peHashNG even when
//! their byte-level hashes differ. Every field is packed big-endian, header
//! values first, then four values per section.

use std::io::{self, Write};

use bzip2::write::BzEncoder;
use bzip2::Compression;
use goblin::pe::PE;
use sha2::{Digest, Sha256};

use super::pe::section_data;

const CHARACTERISTICS_MASK: u16 = 0b0111_1111_0010_0011;
const DATA_DIRECTORY_MASK: u16 = 0b0111_1110_0111_1111;
const PAGE: u64 = 4096;
const SECTOR: u64 = 512;

/// Largest power of two not above `n` (0 stays 0).
pub fn align_down_p2(n: u32) -> u32 {
    if n == 0 {
        0
    } else {
        1 << (31 - n.leading_zeros())
    }
}

/// Round `n` up to a multiple of the power of two `boundary`; `None` when
/// the result does not fit.
pub fn align_up(n: u64, boundary: u64) -> Option<u64> {
    debug_assert!(boundary.is_power_of_two());
    let mask = boundary - 1;
    n.checked_add(mask).map(|sum| sum & !mask)
}

fn out_of_range(field: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{} out of range", field))
}

fn aligned_u64(n: u64, boundary: u64, field: &str) -> io::Result<u64> {
    align_up(n, boundary).ok_or_else(|| out_of_range(field))
}

/// Section values are packed as 32-bit words, so rounding past `u32::MAX`
/// is an error rather than a wrap.
fn aligned_u32(n: u32, boundary: u64, field: &str) -> io::Result<u32> {
    aligned_u64(n.into(), boundary, field).and_then(|v| u32::try_from(v).map_err(|_| out_of_range(field)))
}

/// bzip2 ratio of a section scaled to 0..=8.
pub fn complexity(data: &[u8], raw_size: u32) -> io::Result<u8> {
    if raw_size == 0 {
        return Ok(0);
    }
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?.len();

    let ratio = compressed as f64 * 7.0 / raw_size as f64;
    Ok(if ratio > 7.0 { 8 } else { ratio.round() as u8 })
}

/// Bitmap of populated data directories (index n -> bit n).
fn directory_bitmap(pe: &PE) -> u16 {
    let Some(optional) = pe.header.optional_header else {
        return 0;
    };
    let dirs = &optional.data_directories;
    let present = [
        dirs.get_export_table().clone(),
        dirs.get_import_table().clone(),
        dirs.get_resource_table().clone(),
        dirs.get_exception_table().clone(),
        dirs.get_certificate_table().clone(),
        dirs.get_base_relocation_table().clone(),
        dirs.get_debug_table().clone(),
        dirs.get_architecture().clone(),
        dirs.get_global_ptr().clone(),
        dirs.get_tls_table().clone(),
        dirs.get_load_config_table().clone(),
        dirs.get_bound_import_table().clone(),
        dirs.get_import_address_table().clone(),
        dirs.get_delay_import_descriptor().clone(),
        dirs.get_clr_runtime_header().clone(),
    ]
    .map(|dir| dir.is_some_and(|d| d.virtual_address != 0));

    let count = (optional.windows_fields.number_of_rva_and_sizes as usize).min(16);
    present
        .iter()
        .take(count)
        .enumerate()
        .filter(|(_, &set)| set)
        .fold(0u16, |bits, (idx, _)| bits | (1 << idx))
}

/// peHashNG of a parsed PE; `None` without an optional header.
pub fn pehashng(pe: &PE, data: &[u8]) -> io::Result<Option<String>> {
    let Some(optional) = pe.header.optional_header else {
        return Ok(None);
    };
    let windows = &optional.windows_fields;

    let mut packed = Vec::with_capacity(32 + pe.sections.len() * 10);
    packed.extend((pe.header.coff_header.characteristics & CHARACTERISTICS_MASK).to_be_bytes());
    packed.extend(windows.subsystem.to_be_bytes());
    packed.extend(align_down_p2(windows.section_alignment).to_be_bytes());
    packed.extend(align_down_p2(windows.file_alignment).to_be_bytes());
    packed.extend(aligned_u64(windows.size_of_stack_commit, PAGE, "SizeOfStackCommit")?.to_be_bytes());
    packed.extend(aligned_u64(windows.size_of_heap_commit, PAGE, "SizeOfHeapCommit")?.to_be_bytes());
    packed.extend((directory_bitmap(pe) & DATA_DIRECTORY_MASK).to_be_bytes());

    for section in &pe.sections {
        let body = section_data(section, data);
        packed.extend(aligned_u32(section.virtual_address, SECTOR, "VirtualAddress")?.to_be_bytes());
        packed.extend(aligned_u32(section.size_of_raw_data, SECTOR, "SizeOfRawData")?.to_be_bytes());
        packed.push((section.characteristics >> 24) as u8);
        packed.push(complexity(body, section.size_of_raw_data)?);
    }

    Ok(Some(hex::encode(Sha256::digest(&packed))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_down_p2(0), 0);
        assert_eq!(align_down_p2(1), 1);
        assert_eq!(align_down_p2(0x1000), 0x1000);
        assert_eq!(align_down_p2(0x1FFF), 0x1000);
        assert_eq!(align_up(0, 4096), Some(0));
        assert_eq!(align_up(1, 4096), Some(4096));
        assert_eq!(align_up(4096, 4096), Some(4096));
        assert_eq!(align_up(0x1001, 512), Some(0x1200));
    }

    #[test]
    fn test_alignment_overflow_is_error() {
        assert_eq!(align_up(u64::MAX, 4096), None);
        assert_eq!(align_up(u64::MAX - 4095, 4096), Some(u64::MAX - 4095));
        assert!(aligned_u64(u64::MAX - 1, PAGE, "SizeOfStackCommit").is_err());
        assert_eq!(aligned_u32(0xFFFF_FE00, SECTOR, "VirtualAddress").unwrap(), 0xFFFF_FE00);
        let err = aligned_u32(0xFFFF_FE01, SECTOR, "VirtualAddress").unwrap_err();
        assert_eq!(err.to_string(), "VirtualAddress out of range");
    }

    #[test]
    fn test_unalignable_section_fails_hash() {
        let mut data = crate::testing::tiny_pe();
        // VirtualAddress of the only section
        data[0x184..0x188].copy_from_slice(&0xFFFF_FF01u32.to_le_bytes());
        let pe = PE::parse(&data).unwrap();
        assert_eq!(pe.sections[0].virtual_address, 0xFFFF_FF01);
        assert!(pehashng(&pe, &data).is_err());
    }

    #[test]
    fn test_tiny_pe_hash() {
        let data = crate::testing::tiny_pe();
        let pe = PE::parse(&data).unwrap();
        assert_eq!(directory_bitmap(&pe), 0);
        assert_eq!(
            pehashng(&pe, &data).unwrap().as_deref(),
            Some("b4dd63472c73712927c1ecd4af65d31a4ff6b2ff77e1c63a3ede09d124de35a2")
        );
    }

    #[test]
    fn test_complexity_scale() {
        assert_eq!(complexity(&[], 0).unwrap(), 0);
        // runs of zeros compress far below a seventh of their size
        assert_eq!(complexity(&[0u8; 4096], 4096).unwrap(), 0);
        // tiny inputs inflate past the ratio cap
        assert_eq!(complexity(&[0x41], 1).unwrap(), 8);
    }
}
