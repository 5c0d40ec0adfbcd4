//! Tree walk: superblock → root node → records in tree order.
//!
//! # Root resolution
//! Two producer families disagree on what the superblock's root field
//! holds.  It is tried first as a block number through the offset table;
//! if that slot does not exist, it is read as a byte offset from the start
//! of the superblock's own data, spanning `page_size` bytes.  Child
//! pointers in internal nodes are resolved the same way.
//!
//! # Failure
//! Any error inside the walk aborts the whole read.  No partial record set
//! is ever returned.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::block::BlockReader;
use crate::buddy::BuddyContainer;
use crate::error::{DsStoreError, Result};
use crate::record::{decode_record, Record};
use super::{DirectorySuperblock, DIRECTORY_NAME};

/// Read every record of the metadata directory.  A container without a
/// directory, or with an empty one, yields no records.
pub fn read_records(container: &BuddyContainer<'_>, max_depth: u32) -> Result<Vec<Record>> {
    let Some(block) = container.root.toc_lookup(DIRECTORY_NAME) else {
        debug!("no {DIRECTORY_NAME} entry in table of contents");
        return Ok(Vec::new());
    };
    for other in container.root.toc.iter().filter(|e| e.name != DIRECTORY_NAME) {
        warn!(name = %other.name, block = other.block, "ignoring table of contents entry");
    }

    let mut r = container.block_at(block)?;
    let sb_base = r.base();
    let sb = DirectorySuperblock::read(&mut r)?;
    debug!(?sb, "directory superblock");
    if sb.records == 0 {
        return Ok(Vec::new());
    }

    let mut walker = Walker {
        container,
        sb_base,
        page_size: sb.page_size,
        levels: sb.levels,
        max_depth,
        visited: HashSet::new(),
        out: Vec::new(),
    };
    walker.walk(sb.root, 0)?;

    if walker.out.len() != sb.records as usize {
        warn!(declared = sb.records, found = walker.out.len(), "record count disagrees with superblock");
    }
    Ok(walker.out)
}

struct Walker<'c, 'a> {
    container: &'c BuddyContainer<'a>,
    sb_base:   u64,
    page_size: u32,
    levels:    u32,
    max_depth: u32,
    visited:   HashSet<u64>,
    out:       Vec<Record>,
}

impl<'c, 'a> Walker<'c, 'a> {
    fn resolve(&self, pointer: u32) -> Result<BlockReader<'a>> {
        let data = self.container.data();
        if let Some(addr) = self.container.root.address(pointer) {
            return BlockReader::for_block(data, addr);
        }
        if self.page_size == 0 {
            return Err(DsStoreError::format(
                self.sb_base,
                format!("node pointer {pointer:#x} is not a block number and page size is 0"),
            ));
        }
        warn!(pointer, page_size = self.page_size, "node pointer is not a block number, reading relative to superblock");
        BlockReader::new(data, self.sb_base + u64::from(pointer), u64::from(self.page_size))
    }

    fn walk(&mut self, pointer: u32, depth: u32) -> Result<()> {
        if depth >= self.max_depth {
            return Err(DsStoreError::format(self.sb_base, format!("tree deeper than {}", self.max_depth)));
        }
        let mut r = self.resolve(pointer)?;
        if !self.visited.insert(r.base()) {
            return Err(DsStoreError::format(r.base(), "node visited twice"));
        }

        let rightmost = r.read_u32()?;
        let count = r.read_u32()?;
        let leaf = rightmost == 0 || self.levels.saturating_sub(depth) <= 1;
        debug!(node = r.base(), depth, count, leaf, "visiting node");

        if leaf {
            for _ in 0..count {
                self.out.push(decode_record(&mut r)?);
            }
            return Ok(());
        }

        for _ in 0..count {
            let child = r.read_u32()?;
            self.walk(child, depth + 1)?;
            self.out.push(decode_record(&mut r)?);
        }
        self.walk(rightmost, depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockAddress, BlockWriter};
    use crate::buddy::{assemble, TocEntry};
    use crate::record::{encode_record, FourCC, Value};

    const ROOT: BlockAddress = BlockAddress { offset: 0x800, size: 0x800 };
    const SB:   BlockAddress = BlockAddress { offset: 0x20, size: 0x20 };

    fn rec(name: &str, n: u32) -> Record {
        Record::new(name, FourCC::new(b"long"), Value::Long(n))
    }

    fn node(rightmost: u32, entries: &[(Option<u32>, Record)]) -> Vec<u8> {
        let mut w = BlockWriter::new();
        w.write_u32(rightmost).unwrap();
        w.write_u32(entries.len() as u32).unwrap();
        for (child, r) in entries {
            if let Some(c) = child {
                w.write_u32(*c).unwrap();
            }
            encode_record(r, &mut w).unwrap();
        }
        w.into_inner()
    }

    fn superblock(root: u32, levels: u32, records: u32, nodes: u32, page: u32) -> Vec<u8> {
        let mut w = BlockWriter::new();
        DirectorySuperblock { root, levels, records, nodes, page_size: page }.write(&mut w).unwrap();
        w.into_inner()
    }

    fn image(blocks: &[(BlockAddress, Vec<u8>)], toc: &str) -> Vec<u8> {
        let refs: Vec<(BlockAddress, &[u8])> = blocks.iter().map(|(a, b)| (*a, b.as_slice())).collect();
        assemble(&refs, vec![TocEntry { name: toc.into(), block: 1 }]).unwrap()
    }

    fn read(img: &[u8]) -> Result<Vec<Record>> {
        let c = BuddyContainer::parse(img, false)?;
        read_records(&c, 8)
    }

    #[test]
    fn missing_directory_is_empty() {
        let img = image(&[(ROOT, vec![]), (SB, superblock(2, 1, 1, 1, 0x1000))], "XXXX");
        assert!(read(&img).unwrap().is_empty());
    }

    #[test]
    fn zero_records_is_empty() {
        let img = image(&[(ROOT, vec![]), (SB, superblock(0xFFFF, 0, 0, 0, 0x1000))], "DSDB");
        assert!(read(&img).unwrap().is_empty());
    }

    #[test]
    fn block_number_and_relative_roots_agree() {
        let records = vec![rec("a", 1), rec("b", 2)];
        let leaf = node(0, &[(None, records[0].clone()), (None, records[1].clone())]);

        let by_block = image(
            &[
                (ROOT, vec![]),
                (SB, superblock(2, 1, 2, 1, 0x1000)),
                (BlockAddress { offset: 0x1000, size: 0x1000 }, leaf.clone()),
            ],
            "DSDB",
        );

        let mut sb_block = superblock(0x40, 1, 2, 1, 0x100);
        sb_block.resize(0x40, 0);
        sb_block.extend_from_slice(&leaf);
        let by_offset = image(
            &[(ROOT, vec![]), (BlockAddress { offset: 0x1000, size: 0x1000 }, sb_block)],
            "DSDB",
        );

        assert_eq!(read(&by_block).unwrap(), records);
        assert_eq!(read(&by_offset).unwrap(), records);
    }

    #[test]
    fn internal_nodes_keep_separators_in_order() {
        let left  = node(0, &[(None, rec("a", 1))]);
        let mid   = node(0, &[(None, rec("c", 3))]);
        let right = node(0, &[(None, rec("e", 5))]);
        let top   = node(5, &[(Some(3), rec("b", 2)), (Some(4), rec("d", 4))]);
        let img = image(
            &[
                (ROOT, vec![]),
                (SB, superblock(2, 2, 5, 4, 0x1000)),
                (BlockAddress { offset: 0x1000, size: 0x1000 }, top),
                (BlockAddress { offset: 0x2000, size: 0x1000 }, left),
                (BlockAddress { offset: 0x3000, size: 0x1000 }, mid),
                (BlockAddress { offset: 0x4000, size: 0x1000 }, right),
            ],
            "DSDB",
        );
        let names: Vec<String> = read(&img).unwrap().into_iter().map(|r| r.filename).collect();
        assert_eq!(names, ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn cycles_are_rejected() {
        let top = node(2, &[(Some(2), rec("a", 1))]);
        let img = image(
            &[
                (ROOT, vec![]),
                (SB, superblock(2, 3, 1, 1, 0x1000)),
                (BlockAddress { offset: 0x1000, size: 0x1000 }, top),
            ],
            "DSDB",
        );
        assert!(read(&img).unwrap_err().is_format());
    }

    #[test]
    fn overcounted_leaf_aborts_the_read() {
        let mut leaf = node(0, &[(None, rec("a", 1)), (None, rec("b", 2))]);
        leaf[7] = 3;
        let img = image(
            &[
                (ROOT, vec![]),
                (SB, superblock(2, 1, 3, 1, 0x1000)),
                (BlockAddress { offset: 0x1000, size: 0x40 }, leaf),
            ],
            "DSDB",
        );
        assert!(read(&img).unwrap_err().is_format());
    }

    #[test]
    fn node_past_end_of_file_is_a_range_error() {
        let img = image(&[(ROOT, vec![]), (SB, superblock(0x4000, 1, 1, 1, 0x1000))], "DSDB");
        assert!(matches!(read(&img).unwrap_err(), DsStoreError::Range { .. }));
    }
}
