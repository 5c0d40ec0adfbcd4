//! The buddy-allocator container that hosts everything else.
//!
//! # File header (36 bytes)
//!
//! | Offset | Size | Field                                      |
//! |--------|------|--------------------------------------------|
//! | 0      | 4    | Version, always `0x00000001`               |
//! | 4      | 4    | Magic `"Bud1"` (`0x42756431`)              |
//! | 8      | 4    | Root block offset                          |
//! | 12     | 4    | Root block size                            |
//! | 16     | 4    | Root block offset again (must match)       |
//! | 20     | 16   | Reserved                                   |
//!
//! # Root block (at root offset + 4)
//!
//! ```text
//! u32 offset_count | u32 reserved | offset table (256·k slots of u32)
//! u32 toc_count    | toc_count × (u8 len, name, u32 block_number)
//! 32 free lists    | each: u32 count, count × u32 offset
//! ```
//!
//! Only the first `offset_count` slots of the offset table are live; the
//! remaining slots up to the next multiple of 256 are zero padding.

use tracing::{debug, warn};

use crate::block::{BlockAddress, BlockReader, BlockWriter, HEADER_SKEW};
use crate::error::{DsStoreError, Result};

pub const VERSION:     u32   = 0x0000_0001;
pub const MAGIC:       u32   = 0x4275_6431; // "Bud1"
pub const HEADER_SIZE: usize = 36;

/// Reserved header bytes as emitted by the reference producer.  Readers
/// ignore them; writers reproduce them for strict third-party readers.
pub const RESERVED_PAD: [u8; 16] = [
    0x00, 0x00, 0x10, 0x0C, 0x00, 0x00, 0x00, 0x87,
    0x00, 0x00, 0x20, 0x0B, 0x00, 0x00, 0x00, 0x00,
];

pub const OFFSET_TABLE_PAGE: usize = 256;
pub const FREE_LIST_COUNT:   usize = 32;

/// Allocator space is 2^31 bytes; the largest possible block is that size.
const SPACE_EXPONENT: u32 = 31;

// ── FileHeader ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub root_offset: u32,
    pub root_size:   u32,
    pub reserved:    [u8; 16],
}

impl FileHeader {
    /// Parse and validate the header against the full file contents.
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(DsStoreError::format(
                0,
                format!("file is {} bytes, header needs {HEADER_SIZE}", data.len()),
            ));
        }
        let mut r = BlockReader::new(data, 0, HEADER_SIZE as u64)?;

        let version = r.read_u32()?;
        if version != VERSION {
            return Err(DsStoreError::BadVersion { found: version });
        }
        let magic = r.read_u32()?;
        if magic != MAGIC {
            return Err(DsStoreError::BadMagic { expected: MAGIC, found: magic });
        }
        let root_offset = r.read_u32()?;
        let root_size   = r.read_u32()?;
        let root_offset2 = r.read_u32()?;
        if root_offset != root_offset2 {
            return Err(DsStoreError::format(
                16,
                format!("root offset copies disagree: {root_offset:#x} vs {root_offset2:#x}"),
            ));
        }
        let reserved = r.read_array::<16>()?;

        let end = u64::from(root_offset) + HEADER_SKEW + u64::from(root_size);
        if end > data.len() as u64 {
            return Err(DsStoreError::format(
                8,
                format!("root block {root_offset:#x}+{root_size:#x} runs past end of file ({:#x})", data.len()),
            ));
        }

        debug!(root_offset, root_size, "buddy header parsed");
        Ok(Self { root_offset, root_size, reserved })
    }

    pub fn write(&self, w: &mut BlockWriter) -> Result<()> {
        w.write_u32(VERSION)?;
        w.write_u32(MAGIC)?;
        w.write_u32(self.root_offset)?;
        w.write_u32(self.root_size)?;
        w.write_u32(self.root_offset)?;
        w.write_bytes(&self.reserved);
        Ok(())
    }
}

// ── RootBlock ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub name:  String,
    pub block: u32,
}

/// Allocator bookkeeping: offset table, table of contents and free lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBlock {
    /// Raw block addresses, indexed by block number.
    pub offsets:    Vec<u32>,
    pub reserved:   u32,
    pub toc:        Vec<TocEntry>,
    /// One list per size class 2^0..2^31, each holding free block offsets.
    pub free_lists: Vec<Vec<u32>>,
}

impl RootBlock {
    /// Parse the root block.  With `strict_padding`, non-zero offset-table
    /// padding is fatal instead of a warning.
    pub fn read(r: &mut BlockReader<'_>, strict_padding: bool) -> Result<Self> {
        let count_at = r.position();
        let count = r.read_u32()?;
        let reserved = r.read_u32()?;

        let slots = slot_count(count as usize);
        if slots as u64 * 4 > r.remaining() {
            return Err(DsStoreError::format(count_at, format!("offset count {count} exceeds root block")));
        }
        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(r.read_u32()?);
        }
        for slot in count as usize..slots {
            let at = r.position();
            let pad = r.read_u32()?;
            if pad != 0 {
                if strict_padding {
                    return Err(DsStoreError::format(at, format!("offset table padding slot {slot} is {pad:#x}")));
                }
                warn!(slot, value = pad, "non-zero offset table padding");
            }
        }

        let toc_count = r.read_u32()?;
        let mut toc = Vec::with_capacity(toc_count.min(64) as usize);
        for _ in 0..toc_count {
            let at = r.position();
            let len = r.read_u8()?;
            let name = std::str::from_utf8(r.read_bytes(len as usize)?)
                .map_err(|_| DsStoreError::format(at, "table of contents name is not ASCII"))?
                .to_owned();
            let block = r.read_u32()?;
            toc.push(TocEntry { name, block });
        }

        let free_lists = read_free_lists(r);

        debug!(offsets = offsets.len(), toc = toc.len(), "root block parsed");
        Ok(Self { offsets, reserved, toc, free_lists })
    }

    pub fn write(&self, w: &mut BlockWriter) -> Result<()> {
        w.write_u32(self.offsets.len() as u32)?;
        w.write_u32(self.reserved)?;
        let slots = slot_count(self.offsets.len());
        for &raw in &self.offsets {
            w.write_u32(raw)?;
        }
        for _ in self.offsets.len()..slots {
            w.write_u32(0)?;
        }

        w.write_u32(self.toc.len() as u32)?;
        for entry in &self.toc {
            let name = entry.name.as_bytes();
            if name.len() > u8::MAX as usize {
                return Err(DsStoreError::format(w.len() as u64, format!("toc name '{}' too long", entry.name)));
            }
            w.write_u8(name.len() as u8)?;
            w.write_bytes(name);
            w.write_u32(entry.block)?;
        }

        for i in 0..FREE_LIST_COUNT {
            let list = self.free_lists.get(i).map(Vec::as_slice).unwrap_or(&[]);
            w.write_u32(list.len() as u32)?;
            for &off in list {
                w.write_u32(off)?;
            }
        }
        Ok(())
    }

    /// Block number registered under `name` in the table of contents.
    pub fn toc_lookup(&self, name: &str) -> Option<u32> {
        self.toc.iter().find(|e| e.name == name).map(|e| e.block)
    }

    /// Resolve a block number.  `None` when the number is past the live
    /// entries or names an empty slot.
    pub fn address(&self, block: u32) -> Option<BlockAddress> {
        match self.offsets.get(block as usize) {
            Some(&raw) if raw != 0 => Some(BlockAddress::from_raw(raw)),
            _ => None,
        }
    }
}

fn slot_count(live: usize) -> usize {
    live.div_ceil(OFFSET_TABLE_PAGE).max(1) * OFFSET_TABLE_PAGE
}

/// Free lists are informational only.  A root block that ends early keeps
/// whatever lists were complete.
fn read_free_lists(r: &mut BlockReader<'_>) -> Vec<Vec<u32>> {
    let mut lists = Vec::with_capacity(FREE_LIST_COUNT);
    for i in 0..FREE_LIST_COUNT {
        let list = r.read_u32().and_then(|n| {
            (0..n).map(|_| r.read_u32()).collect::<Result<Vec<u32>>>()
        });
        match list {
            Ok(list) => lists.push(list),
            Err(e) => {
                warn!(list = i, error = %e, "free lists truncated");
                break;
            }
        }
    }
    lists
}

/// Buddy decomposition of the allocator space not covered by `allocated`.
///
/// Returns one list per size class; list `e` holds offsets of free blocks
/// of size 2^e.
pub fn free_lists_for(allocated: &[BlockAddress]) -> Vec<Vec<u32>> {
    let mut lists = vec![Vec::new(); FREE_LIST_COUNT];
    split_free(0, SPACE_EXPONENT, allocated, &mut lists);
    lists
}

fn split_free(offset: u64, exp: u32, allocated: &[BlockAddress], lists: &mut [Vec<u32>]) {
    let size = 1u64 << exp;
    let end = offset + size;
    if allocated.iter().any(|a| a.offset == offset && u64::from(a.size) == size) {
        return;
    }
    if !allocated.iter().any(|a| a.offset < end && a.end() > offset) {
        lists[exp as usize].push(offset as u32);
        return;
    }
    if exp == 0 {
        return;
    }
    let half = size / 2;
    split_free(offset, exp - 1, allocated, lists);
    split_free(offset + half, exp - 1, allocated, lists);
}

// ── BuddyContainer ───────────────────────────────────────────────────────────

/// A parsed container borrowing the file's bytes.
#[derive(Debug)]
pub struct BuddyContainer<'a> {
    data:       &'a [u8],
    pub header: FileHeader,
    pub root:   RootBlock,
}

impl<'a> BuddyContainer<'a> {
    pub fn parse(data: &'a [u8], strict_padding: bool) -> Result<Self> {
        let header = FileHeader::read(data)?;
        let mut r = BlockReader::new(
            data,
            u64::from(header.root_offset) + HEADER_SKEW,
            u64::from(header.root_size),
        )?;
        let root = RootBlock::read(&mut r, strict_padding)?;
        Ok(Self { data, header, root })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Open a reader over block `block`.  An unknown block number is a
    /// format error; an address past the end of file is a range error.
    pub fn block_at(&self, block: u32) -> Result<BlockReader<'a>> {
        let addr = self.root.address(block).ok_or_else(|| {
            DsStoreError::format(
                u64::from(self.header.root_offset),
                format!("block {block} not in offset table ({} entries)", self.root.offsets.len()),
            )
        })?;
        BlockReader::for_block(self.data, addr)
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

/// Lay out a complete container image.
///
/// `blocks[0]` must be the root block's address; its payload is generated
/// here.  Each later entry becomes block number `i` with the given payload.
pub fn assemble(blocks: &[(BlockAddress, &[u8])], toc: Vec<TocEntry>) -> Result<Vec<u8>> {
    let (root_addr, _) = *blocks
        .first()
        .ok_or_else(|| DsStoreError::format(0, "no root block address"))?;

    let mut allocated: Vec<BlockAddress> = blocks.iter().map(|(a, _)| *a).collect();
    allocated.push(BlockAddress { offset: 0, size: 32 }); // header
    let root = RootBlock {
        offsets:    blocks.iter().map(|(a, _)| a.to_raw()).collect(),
        reserved:   0,
        toc,
        free_lists: free_lists_for(&allocated),
    };
    let mut root_payload = BlockWriter::new();
    root.write(&mut root_payload)?;

    let end = allocated.iter().map(BlockAddress::end).max().unwrap_or(0);
    let mut image = vec![0u8; (end + HEADER_SKEW) as usize];

    let mut header = BlockWriter::with_capacity(HEADER_SIZE);
    FileHeader { root_offset: root_addr.offset as u32, root_size: root_addr.size, reserved: RESERVED_PAD }
        .write(&mut header)?;
    image[..HEADER_SIZE].copy_from_slice(header.as_slice());

    place(&mut image, root_addr, root_payload.as_slice())?;
    for (addr, payload) in &blocks[1..] {
        place(&mut image, *addr, payload)?;
    }
    debug!(len = image.len(), blocks = blocks.len(), "container assembled");
    Ok(image)
}

fn place(image: &mut [u8], addr: BlockAddress, payload: &[u8]) -> Result<()> {
    if payload.len() > addr.size as usize {
        return Err(DsStoreError::CapacityExceeded { needed: payload.len(), capacity: addr.size as usize });
    }
    let start = addr.file_offset() as usize;
    image[start..start + payload.len()].copy_from_slice(payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_image() -> Vec<u8> {
        let root: &[u8] = &[];
        let sb: &[u8] = &[1, 2, 3];
        assemble(
            &[
                (BlockAddress { offset: 0x800, size: 0x800 }, root),
                (BlockAddress { offset: 0x20, size: 0x20 }, sb),
            ],
            vec![TocEntry { name: "DSDB".into(), block: 1 }],
        )
        .unwrap()
    }

    #[test]
    fn assembled_header_is_bit_exact() {
        let img = minimal_image();
        assert_eq!(&img[0..4], &[0, 0, 0, 1]);
        assert_eq!(&img[4..8], b"Bud1");
        assert_eq!(&img[8..12], &[0, 0, 0x08, 0x00]);
        assert_eq!(&img[12..16], &[0, 0, 0x08, 0x00]);
        assert_eq!(&img[16..20], &[0, 0, 0x08, 0x00]);
        assert_eq!(&img[20..36], &RESERVED_PAD);
        assert_eq!(img.len(), 0x1004);
        assert_eq!(&img[0x24..0x27], &[1, 2, 3]);
    }

    #[test]
    fn parse_reads_back_assembled_root() {
        let img = minimal_image();
        let c = BuddyContainer::parse(&img, true).unwrap();
        assert_eq!(c.root.offsets, vec![0x80B, 0x25]);
        assert_eq!(c.root.toc_lookup("DSDB"), Some(1));
        assert_eq!(c.root.toc_lookup("DSDB2"), None);
        assert_eq!(c.root.free_lists.len(), FREE_LIST_COUNT);
        let mut r = c.block_at(1).unwrap();
        assert_eq!(r.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert!(c.block_at(2).is_err());
    }

    #[test]
    fn rejects_short_and_foreign_files() {
        assert!(FileHeader::read(&[0u8; 35]).unwrap_err().is_format());

        let mut img = minimal_image();
        img[3] = 2;
        assert!(matches!(FileHeader::read(&img), Err(DsStoreError::BadVersion { found: 2 })));

        let mut img = minimal_image();
        img[4..8].copy_from_slice(b"Bud2");
        assert!(matches!(
            FileHeader::read(&img),
            Err(DsStoreError::BadMagic { expected: MAGIC, found: 0x4275_6432 })
        ));

        let mut img = minimal_image();
        img[19] = 0x01;
        assert!(FileHeader::read(&img).unwrap_err().is_format());
    }

    #[test]
    fn rejects_root_past_end_of_file() {
        let img = minimal_image();
        let cut = &img[..img.len() - 1];
        assert!(FileHeader::read(cut).unwrap_err().is_format());
    }

    #[test]
    fn padding_is_soft_unless_strict() {
        let mut img = minimal_image();
        // slot 5 of the offset table: root payload starts at 0x804, table at +8
        let slot5 = 0x804 + 8 + 5 * 4;
        img[slot5 + 3] = 0x99;
        assert!(BuddyContainer::parse(&img, false).is_ok());
        assert!(BuddyContainer::parse(&img, true).unwrap_err().is_format());
    }

    #[test]
    fn free_lists_cover_the_rest_of_the_space() {
        let allocated = [
            BlockAddress { offset: 0, size: 32 },
            BlockAddress { offset: 0x20, size: 32 },
            BlockAddress { offset: 0x800, size: 0x800 },
            BlockAddress { offset: 0x2000, size: 0x2000 },
        ];
        let lists = free_lists_for(&allocated);
        assert_eq!(lists[6], vec![0x40]);
        assert_eq!(lists[10], vec![0x400]);
        assert_eq!(lists[11], Vec::<u32>::new());
        assert_eq!(lists[12], vec![0x1000]);
        assert_eq!(lists[14], vec![0x4000]);
        assert_eq!(lists[30], vec![0x4000_0000]);
        assert!(lists[31].is_empty());

        let used: u64 = allocated.iter().map(|a| u64::from(a.size)).sum();
        let free: u64 = lists
            .iter()
            .enumerate()
            .map(|(e, l)| l.len() as u64 * (1u64 << e))
            .sum();
        assert_eq!(used + free, 1u64 << 31);
    }
}
