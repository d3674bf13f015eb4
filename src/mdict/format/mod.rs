//! File format parsing layer for MDict containers.
//!
//! Bridges raw file I/O and the [`MdictReader`](crate::mdict::reader::MdictReader).
//!
//! ```text
//! ┌──────────────────────┐
//! │  XML header          │ ← header::parse()
//! ├──────────────────────┤
//! │  Key block info      │
//! │  Key index           │ ← index::parse()
//! │  Key blocks          │
//! │  Record block info   │
//! │  Record index        │
//! ├──────────────────────┤
//! │  Record blocks       │ ← content::decode_block()
//! └──────────────────────┘
//! ```

pub mod content;
pub mod header;
pub mod index;
