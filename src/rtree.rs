/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::sync::OnceLock;

use futures_util::future::try_join_all;

use crate::block::Block;
use crate::codec;
use crate::decode::union_spans;
use crate::error::{Error, Result};
use crate::netfile::ByteRangeSource;

/* -------------------------------------------------------------------------- */

pub const CIRTREE_MAGIC       : u32   = 0x2468ACE0;
pub const CIRTREE_HEADER_SIZE : u64   = 48;

const LEAF_ITEM_SIZE          : usize = 32;
const INDEX_ITEM_SIZE         : usize = 24;
const MAX_DEPTH               : usize = 64;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RTreeHeader {
    pub block_size      : u32,
    pub item_count      : u64,
    pub start_chrom     : u32,
    pub start_base      : u32,
    pub end_chrom       : u32,
    pub end_base        : u32,
    pub end_file_offset : u64,
    pub items_per_slot  : u32,
}

/* -------------------------------------------------------------------------- */

impl RTreeHeader {

    fn read(buffer: &[u8]) -> Result<Self> {
        let magic = codec::read_u32(buffer, 0)?;
        if magic != CIRTREE_MAGIC {
            return Err(Error::InvalidFile(format!("invalid R tree magic `{:#x}`", magic)));
        }
        Ok(RTreeHeader {
            block_size     : codec::read_u32(buffer,  4)?,
            item_count     : codec::read_u64(buffer,  8)?,
            start_chrom    : codec::read_u32(buffer, 16)?,
            start_base     : codec::read_u32(buffer, 20)?,
            end_chrom      : codec::read_u32(buffer, 24)?,
            end_base       : codec::read_u32(buffer, 28)?,
            end_file_offset: codec::read_u64(buffer, 32)?,
            items_per_slot : codec::read_u32(buffer, 40)?,
        })
    }

    /// Upper bound on the size of a node, reached by a completely filled
    /// leaf.
    pub fn max_node_size(&self) -> u64 {
        4 + self.block_size as u64 * LEAF_ITEM_SIZE as u64
    }
}

/* -------------------------------------------------------------------------- */

/// An item of an R tree node. For leaves `size` is the size of the data
/// block at `offset`, for inner nodes `offset` points to the child node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RTreeEntry {
    pub start_chrom: u32,
    pub start_base : u32,
    pub end_chrom  : u32,
    pub end_base   : u32,
    pub offset     : u64,
    pub size       : Option<u64>,
}

/* -------------------------------------------------------------------------- */

impl RTreeEntry {

    pub fn overlaps(&self, chrom_id: u32, min: u32, max: u32) -> bool {
        (self.start_chrom < chrom_id || (self.start_chrom == chrom_id && self.start_base <= max)) &&
        (self.end_chrom   > chrom_id || (self.end_chrom   == chrom_id && self.end_base   >= min))
    }

    pub fn block(&self) -> Option<Block> {
        self.size.map(|size| Block::new(self.offset, size))
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq)]
pub struct RTreeNode {
    pub is_leaf: bool,
    pub entries: Vec<RTreeEntry>,
}

/* -------------------------------------------------------------------------- */

impl RTreeNode {

    pub fn read(buffer: &[u8], p: usize) -> Result<Self> {
        let is_leaf = codec::read_u8 (buffer, p    )? != 0;
        let count   = codec::read_u16(buffer, p + 2)? as usize;

        let item_size = if is_leaf { LEAF_ITEM_SIZE } else { INDEX_ITEM_SIZE };

        codec::slice(buffer, p + 4, count * item_size, "R tree node")?;

        let mut entries = Vec::with_capacity(count);

        for i in 0..count {
            let q = p + 4 + i * item_size;
            entries.push(RTreeEntry {
                start_chrom: codec::read_u32(buffer, q     )?,
                start_base : codec::read_u32(buffer, q +  4)?,
                end_chrom  : codec::read_u32(buffer, q +  8)?,
                end_base   : codec::read_u32(buffer, q + 12)?,
                offset     : codec::read_u64(buffer, q + 16)?,
                size       : if is_leaf { Some(codec::read_u64(buffer, q + 24)?) } else { None },
            });
        }
        Ok(RTreeNode { is_leaf, entries })
    }
}

/* -------------------------------------------------------------------------- */

/// Spatial index of the data blocks of one view. The header and the root
/// node are fetched once and shared by all queries.
#[derive(Debug)]
pub struct RTreeIndex {
    offset: u64,
    header: OnceLock<RTreeHeader>,
    root  : OnceLock<Vec<u8>>,
}

/* -------------------------------------------------------------------------- */

impl RTreeIndex {

    pub fn new(offset: u64) -> Self {
        RTreeIndex {
            offset,
            header: OnceLock::new(),
            root  : OnceLock::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn root_offset(&self) -> u64 {
        self.offset.saturating_add(CIRTREE_HEADER_SIZE)
    }

    pub async fn header<S: ByteRangeSource>(&self, source: &S) -> Result<RTreeHeader> {
        if let Some(header) = self.header.get() {
            return Ok(*header);
        }
        let buffer = source.fetch(self.offset, CIRTREE_HEADER_SIZE).await?;
        let header = RTreeHeader::read(&buffer)?;
        // a concurrent query may have won the race, both values are equal
        let _ = self.header.set(header);
        Ok(header)
    }

    async fn root<S: ByteRangeSource>(&self, source: &S, header: &RTreeHeader) -> Result<RTreeNode> {
        if let Some(buffer) = self.root.get() {
            return RTreeNode::read(buffer, 0);
        }
        let buffer = source.fetch(self.root_offset(), header.max_node_size()).await?;
        let node   = RTreeNode::read(&buffer, 0)?;
        let _ = self.root.set(buffer);
        Ok(node)
    }

    /// Fetch and parse the nodes at the given file offsets. The maximum
    /// extent of every node is computed, overlapping extents are merged and
    /// each merged range is fetched with a single request.
    pub async fn fetch_nodes<S: ByteRangeSource>(&self, source: &S, offsets: &[u64]) -> Result<Vec<RTreeNode>> {

        let header = self.header(source).await?;

        if offsets.len() == 1 && offsets[0] == self.root_offset() {
            return Ok(vec![self.root(source, &header).await?]);
        }
        let max_size = header.max_node_size();

        let ranges = union_spans(
            offsets.iter().map(|&o| (o, o.saturating_add(max_size))).collect());

        log::debug!("fetching {} R tree nodes with {} requests", offsets.len(), ranges.len());

        let buffers = try_join_all(
            ranges.iter().map(|&(from, to)| source.fetch(from, to - from))
        ).await?;

        let mut nodes = Vec::with_capacity(offsets.len());

        for &offset in offsets {
            let i = ranges.partition_point(|&(from, _)| from <= offset) - 1;
            let p = (offset - ranges[i].0) as usize;
            nodes.push(RTreeNode::read(&buffers[i], p)?);
        }
        Ok(nodes)
    }

    /// Enumerate all data blocks that may contain records overlapping
    /// `[min, max]` on chromosome `chrom_id`. The tree is walked level by
    /// level, so the number of requests per level is bounded by the number
    /// of disjoint regions the candidate nodes occupy.
    pub async fn find_blocks<S: ByteRangeSource>(&self, source: &S, chrom_id: u32, min: u32, max: u32) -> Result<Vec<Block>> {

        let mut blocks   = Vec::new();
        let mut worklist = vec![self.root_offset()];

        for _ in 0..MAX_DEPTH {
            if worklist.is_empty() {
                return Ok(blocks);
            }
            let nodes = self.fetch_nodes(source, &worklist).await?;

            worklist.clear();

            for node in nodes {
                for entry in node.entries.iter().filter(|e| e.overlaps(chrom_id, min, max)) {
                    match entry.block() {
                        Some(block) => blocks.push(block),
                        None        => worklist.push(entry.offset),
                    }
                }
            }
        }
        Err(Error::InvalidFile(format!("R tree at offset {} is deeper than {} levels", self.offset, MAX_DEPTH)))
    }

    /// All leaf entries of the tree in file order.
    pub async fn leaf_entries<S: ByteRangeSource>(&self, source: &S) -> Result<Vec<RTreeEntry>> {

        let mut leaves   = Vec::new();
        let mut worklist = vec![self.root_offset()];

        for _ in 0..MAX_DEPTH {
            if worklist.is_empty() {
                return Ok(leaves);
            }
            let nodes = self.fetch_nodes(source, &worklist).await?;

            worklist.clear();

            for node in nodes {
                if node.is_leaf {
                    leaves.extend(node.entries);
                } else {
                    worklist.extend(node.entries.iter().map(|e| e.offset));
                }
            }
        }
        Err(Error::InvalidFile(format!("R tree at offset {} is deeper than {} levels", self.offset, MAX_DEPTH)))
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
