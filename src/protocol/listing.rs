//! Directory listing encoding
//!
//! A `ListDirectory` reply packs NUL-separated entries into its data field.
//! Each entry starts with a type marker: `F` (file, `name\tsize`), `D`
//! (directory) or `S` (skipped, still counts towards the listing offset).
//! A file record whose size cannot be read is treated like `S`.

use log::debug;
use std::fmt;

/// One child of a listed remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
    /// Only meaningful for files.
    pub size_bytes: u64,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size_bytes,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size_bytes: 0,
        }
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_directory {
            write!(f, "{}/", self.name)
        } else {
            write!(f, "{}\t{}", self.name, self.size_bytes)
        }
    }
}

/// A decoded listing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingItem {
    Entry(DirectoryEntry),
    Skip,
}

/// Splits a listing reply into records, preserving their order.
pub fn parse_listing(data: &[u8]) -> Vec<ListingItem> {
    data.split(|b| *b == 0)
        .filter(|raw| !raw.is_empty())
        .filter_map(parse_record)
        .collect()
}

fn parse_record(raw: &[u8]) -> Option<ListingItem> {
    let text = String::from_utf8_lossy(&raw[1..]);
    match raw[0] {
        b'F' => match text.split_once('\t') {
            Some((name, size)) => match size.trim().parse() {
                Ok(size) => Some(ListingItem::Entry(DirectoryEntry::file(name, size))),
                Err(_) => {
                    debug!("Skipping listing record {:?}: bad size {:?}", name, size);
                    Some(ListingItem::Skip)
                }
            },
            None => {
                debug!("Skipping listing record {:?}: no size", text);
                Some(ListingItem::Skip)
            }
        },
        b'D' => Some(ListingItem::Entry(DirectoryEntry::directory(text))),
        b'S' => Some(ListingItem::Skip),
        _ => None,
    }
}

/// Encodes one record as the device sends it, including the NUL terminator.
pub fn encode_entry(entry: &DirectoryEntry) -> Vec<u8> {
    let record = if entry.is_directory {
        format!("D{}", entry.name)
    } else {
        format!("F{}\t{}", entry.name, entry.size_bytes)
    };
    let mut bytes = record.into_bytes();
    bytes.push(0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_files_dirs_and_skips_in_order() {
        let data = b"Fa.lua\t120\0Db\0S\0Fz\t7\0\0\0";
        let items = parse_listing(data);
        assert_eq!(
            items,
            vec![
                ListingItem::Entry(DirectoryEntry::file("a.lua", 120)),
                ListingItem::Entry(DirectoryEntry::directory("b")),
                ListingItem::Skip,
                ListingItem::Entry(DirectoryEntry::file("z", 7)),
            ]
        );
    }

    #[test]
    fn file_record_with_unreadable_size_is_skipped() {
        let items = parse_listing(b"Fbroken\t12x\0Fnosize\0Fok\t3\0");
        assert_eq!(
            items,
            vec![
                ListingItem::Skip,
                ListingItem::Skip,
                ListingItem::Entry(DirectoryEntry::file("ok", 3)),
            ]
        );
    }

    #[test]
    fn empty_reply_has_no_records() {
        assert!(parse_listing(b"").is_empty());
        assert!(parse_listing(&[0, 0, 0]).is_empty());
    }

    #[test]
    fn encoded_entries_parse_back() {
        let mut data = encode_entry(&DirectoryEntry::file("main.lua", 4096));
        data.extend(encode_entry(&DirectoryEntry::directory("logs")));
        let items = parse_listing(&data);
        assert_eq!(
            items,
            vec![
                ListingItem::Entry(DirectoryEntry::file("main.lua", 4096)),
                ListingItem::Entry(DirectoryEntry::directory("logs")),
            ]
        );
    }
}
