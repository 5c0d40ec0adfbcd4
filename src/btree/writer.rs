//! Single-leaf container writer.
//!
//! The writer always emits the same three-block layout:
//!
//! | Block | Address           | Contents                    |
//! |-------|-------------------|-----------------------------|
//! | 0     | `0x800`, 2 KiB    | allocator root block        |
//! | 1     | `0x20`, 32 bytes  | directory superblock        |
//! | 2     | `0x2000`, 8 KiB   | the only (leaf) node        |
//!
//! Every record goes into block 2, sorted.  A record set that does not fit
//! fails with [`DsStoreError::CapacityExceeded`]; the writer never emits a
//! multi-level tree.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::block::{BlockAddress, BlockWriter};
use crate::buddy::{assemble, TocEntry};
use crate::error::{DsStoreError, Result};
use crate::record::{encode_record, sort_records, Record};
use super::{DirectorySuperblock, DEFAULT_PAGE_SIZE, DIRECTORY_NAME, NODE_HEADER_LEN};

pub const ROOT_BLOCK:       BlockAddress = BlockAddress { offset: 0x800, size: 0x800 };
pub const SUPERBLOCK_BLOCK: BlockAddress = BlockAddress { offset: 0x20, size: 0x20 };
pub const LEAF_BLOCK:       BlockAddress = BlockAddress { offset: 0x2000, size: 0x2000 };

/// Bytes available to the leaf node, header included.
pub const LEAF_CAPACITY: usize = LEAF_BLOCK.size as usize;

const LEAF_BLOCK_NUMBER: u32 = 2;

/// Serialize `records` into a complete container image.
pub fn build_container(records: &[Record]) -> Result<Vec<u8>> {
    let mut sorted = records.to_vec();
    sort_records(&mut sorted);

    let needed = NODE_HEADER_LEN + sorted.iter().map(Record::encoded_len).sum::<usize>();
    if needed > LEAF_CAPACITY {
        return Err(DsStoreError::CapacityExceeded { needed, capacity: LEAF_CAPACITY });
    }

    let mut leaf = BlockWriter::with_capacity(LEAF_CAPACITY);
    leaf.write_u32(0)?;
    leaf.write_u32(sorted.len() as u32)?;
    for record in &sorted {
        encode_record(record, &mut leaf)?;
    }
    leaf.pad_to(LEAF_CAPACITY)?;

    let mut sb = BlockWriter::with_capacity(DirectorySuperblock::LEN);
    DirectorySuperblock {
        root:      LEAF_BLOCK_NUMBER,
        levels:    1,
        records:   sorted.len() as u32,
        nodes:     1,
        page_size: DEFAULT_PAGE_SIZE,
    }
    .write(&mut sb)?;

    debug!(records = sorted.len(), leaf_bytes = needed, "laying out single-leaf container");
    let root: &[u8] = &[];
    assemble(
        &[
            (ROOT_BLOCK, root),
            (SUPERBLOCK_BLOCK, sb.as_slice()),
            (LEAF_BLOCK, leaf.as_slice()),
        ],
        vec![TocEntry { name: DIRECTORY_NAME.to_owned(), block: 1 }],
    )
}

/// Serialize `records` and replace `path` atomically.
///
/// The image is built fully in memory, written to a temporary file in the
/// same directory, synced, then renamed over `path`.  On any failure the
/// existing file is left as it was.  The replacement keeps the permissions
/// of the file it replaces; a new file gets `0644`.
pub fn write_file(path: &Path, records: &[Record]) -> Result<()> {
    let image = build_container(records)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    match fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => set_new_file_mode(tmp.as_file())?,
        Err(e) => return Err(e.into()),
    }
    tmp.write_all(&image)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| DsStoreError::Io(e.error))?;

    debug!(path = %path.display(), bytes = image.len(), "container written");
    Ok(())
}

#[cfg(unix)]
fn set_new_file_mode(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_new_file_mode(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::read_records;
    use crate::buddy::BuddyContainer;
    use crate::record::{FourCC, Value};

    #[test]
    fn layout_matches_fixed_addresses() {
        let img = build_container(&[]).unwrap();
        assert_eq!(img.len(), 0x4004);

        let c = BuddyContainer::parse(&img, true).unwrap();
        assert_eq!(c.root.offsets, vec![0x80B, 0x25, 0x200D]);
        assert_eq!(c.root.toc.len(), 1);
        assert_eq!(c.root.toc_lookup("DSDB"), Some(1));

        let mut r = c.block_at(1).unwrap();
        let sb = DirectorySuperblock::read(&mut r).unwrap();
        assert_eq!(sb, DirectorySuperblock { root: 2, levels: 1, records: 0, nodes: 1, page_size: 0x1000 });
    }

    #[test]
    fn records_come_back_sorted() {
        let recs = vec![
            Record::new("zeta", FourCC::new(b"cmmt"), Value::Ustr("z".into())),
            Record::new("Alpha", FourCC::new(b"Iloc"), Value::Blob(vec![0; 16])),
            Record::new(".", FourCC::new(b"vstl"), Value::Type(FourCC::new(b"icnv"))),
        ];
        let img = build_container(&recs).unwrap();
        let c = BuddyContainer::parse(&img, true).unwrap();
        let back = read_records(&c, 8).unwrap();
        let names: Vec<&str> = back.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, [".", "Alpha", "zeta"]);
    }

    #[test]
    fn leaf_capacity_is_enforced_exactly() {
        // each record: 4 + 2 (name "x") + 8 + 4 + blob
        let per_record_overhead = 4 + 2 + 8 + 4;
        let fill = LEAF_CAPACITY - NODE_HEADER_LEN - per_record_overhead;
        let exact = vec![Record::new("x", FourCC::new(b"blob"), Value::Blob(vec![7; fill]))];
        assert!(build_container(&exact).is_ok());

        let over = vec![Record::new("x", FourCC::new(b"blob"), Value::Blob(vec![7; fill + 1]))];
        match build_container(&over) {
            Err(DsStoreError::CapacityExceeded { needed, capacity }) => {
                assert_eq!(capacity, LEAF_CAPACITY);
                assert_eq!(needed, LEAF_CAPACITY + 1);
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".DS_Store");
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;

        write_file(&path, &[]).unwrap();
        assert_eq!(mode(&path), 0o644);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o664)).unwrap();
        let recs = vec![Record::new("a", FourCC::new(b"cmmt"), Value::Ustr("y".into()))];
        write_file(&path, &recs).unwrap();
        assert_eq!(mode(&path), 0o664);
    }
}
