//! Reader and writer for the `Bud1` directory-metadata container.
//!
//! | Layer      | Module     | Concern                                        |
//! |------------|------------|------------------------------------------------|
//! | Block I/O  | [`block`]  | skewed addresses, bounded big-endian cursors   |
//! | Allocator  | [`buddy`]  | file header, root block, ToC, free lists       |
//! | B-tree     | [`btree`]  | `DSDB` superblock, node walk, single-leaf write|
//! | Records    | [`record`] | `(filename, code, value)` triples and codec    |
//! | Facade     | [`store`]  | load/save lifecycle and named accessors        |
//!
//! [`fields`] and [`geometry`] hold the domain values the accessors speak in.

pub mod error;
pub mod block;
pub mod buddy;
pub mod btree;
pub mod record;
pub mod fields;
pub mod geometry;
pub mod store;

pub use error::{DsStoreError, Result};
pub use record::{FourCC, Record, Value};
pub use store::{DsStore, StoreOptions};
