//! `StringFileInfo` entries of a PE version resource.

use goblin::pe::section_table::SectionTable;
use goblin::pe::PE;

const RT_VERSION: u32 = 16;
const MAX_DEPTH: usize = 3;

fn u16_at(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// File offset of `rva`.
pub(crate) fn rva_to_offset(sections: &[SectionTable], rva: u32) -> Option<usize> {
    sections.iter().find_map(|section| {
        let span = section.virtual_size.max(section.size_of_raw_data);
        let start = section.virtual_address;
        (rva >= start && rva < start.saturating_add(span))
            .then(|| (rva - start) as usize + section.pointer_to_raw_data as usize)
    })
}

/// Locate the raw bytes of the first RT_VERSION resource.
fn version_resource<'a>(pe: &PE, data: &'a [u8]) -> Option<&'a [u8]> {
    let optional = pe.header.optional_header?;
    let directory = optional.data_directories.get_resource_table().clone()?;
    let base = rva_to_offset(&pe.sections, directory.virtual_address)?;
    let tree = data.get(base..)?;

    // type -> name -> language -> data entry
    let mut offset = 0usize;
    for depth in 0..MAX_DEPTH {
        let named = u16_at(tree, offset + 12)? as usize;
        let ids = u16_at(tree, offset + 14)? as usize;
        let entries = offset + 16;

        let pick = if depth == 0 {
            (named..named + ids).find(|i| u32_at(tree, entries + i * 8) == Some(RT_VERSION))?
        } else if named + ids > 0 {
            0
        } else {
            return None;
        };

        let target = u32_at(tree, entries + pick * 8 + 4)?;
        let is_directory = target & 0x8000_0000 != 0;
        offset = (target & 0x7FFF_FFFF) as usize;
        if depth + 1 < MAX_DEPTH && !is_directory {
            return None;
        }
    }

    let rva = u32_at(tree, offset)?;
    let size = u32_at(tree, offset + 4)? as usize;
    let start = rva_to_offset(&pe.sections, rva)?;
    data.get(start..start.checked_add(size)?)
}

/// One `VS_VERSIONINFO`-style node.
struct Block<'a> {
    key: String,
    value: &'a [u8],
    children: &'a [u8],
    length: usize,
}

fn read_utf16z(data: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut units = Vec::new();
    let mut pos = offset;
    loop {
        let unit = u16_at(data, pos)?;
        pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Some((String::from_utf16_lossy(&units), pos))
}

fn read_block(data: &[u8]) -> Option<Block<'_>> {
    let length = u16_at(data, 0)? as usize;
    let value_length = u16_at(data, 2)? as usize;
    let is_text = u16_at(data, 4)? == 1;
    if length < 6 || length > data.len() {
        return None;
    }
    let node = &data[..length];

    let (key, key_end) = read_utf16z(node, 6)?;
    let value_start = align4(key_end).min(length);
    let value_bytes = if is_text { value_length * 2 } else { value_length };
    let value_end = (value_start + value_bytes).min(length);
    let children_start = align4(value_end).min(length);

    Some(Block {
        key,
        value: &node[value_start..value_end],
        children: &node[children_start..],
        length,
    })
}

fn blocks(data: &[u8]) -> Vec<Block<'_>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let Some(block) = read_block(&data[offset..]) else {
            break;
        };
        offset += align4(block.length);
        out.push(block);
    }
    out
}

fn utf16_value(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units).trim_end_matches('\0').to_string()
}

/// `(name, value)` pairs of every string table in a `VS_VERSIONINFO` blob.
pub fn string_file_info(resource: &[u8]) -> Vec<(String, String)> {
    let Some(root) = read_block(resource) else {
        return Vec::new();
    };
    if root.key != "VS_VERSION_INFO" {
        return Vec::new();
    }

    let mut entries = Vec::new();
    for info in blocks(root.children).into_iter().filter(|b| b.key == "StringFileInfo") {
        for table in blocks(info.children) {
            for string in blocks(table.children) {
                entries.push((string.key, utf16_value(string.value)));
            }
        }
    }
    entries
}

/// Version strings of a parsed PE, empty when it carries none.
pub fn version_strings(pe: &PE, data: &[u8]) -> Vec<(String, String)> {
    version_resource(pe, data)
        .map(string_file_info)
        .unwrap_or_default()
}
