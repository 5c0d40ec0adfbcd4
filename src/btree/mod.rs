//! The directory B-tree holding all records.
//!
//! The table of contents names the tree `"DSDB"`; its block holds a
//! 20-byte superblock:
//!
//! ```text
//! u32 root_node | u32 levels | u32 record_count | u32 node_count | u32 page_size
//! ```
//!
//! Each node starts with `u32 pointer, u32 count`.  A zero pointer marks a
//! leaf holding `count` records.  A non-zero pointer is the rightmost child
//! of an internal node whose `count` entries are `u32 child` + record.

pub mod reader;
pub mod writer;

use crate::block::{BlockReader, BlockWriter};
use crate::error::Result;

pub use reader::read_records;
pub use writer::{build_container, write_file};

/// Table-of-contents name of the metadata directory.
pub const DIRECTORY_NAME:    &str  = "DSDB";
pub const DEFAULT_PAGE_SIZE: u32   = 0x1000;
pub const NODE_HEADER_LEN:   usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectorySuperblock {
    /// Block number of the root node, or (legacy layout) a byte offset
    /// relative to this superblock's data.
    pub root:      u32,
    pub levels:    u32,
    pub records:   u32,
    pub nodes:     u32,
    pub page_size: u32,
}

impl DirectorySuperblock {
    pub const LEN: usize = 20;

    pub fn read(r: &mut BlockReader<'_>) -> Result<Self> {
        Ok(Self {
            root:      r.read_u32()?,
            levels:    r.read_u32()?,
            records:   r.read_u32()?,
            nodes:     r.read_u32()?,
            page_size: r.read_u32()?,
        })
    }

    pub fn write(&self, w: &mut BlockWriter) -> Result<()> {
        w.write_u32(self.root)?;
        w.write_u32(self.levels)?;
        w.write_u32(self.records)?;
        w.write_u32(self.nodes)?;
        w.write_u32(self.page_size)?;
        Ok(())
    }
}
