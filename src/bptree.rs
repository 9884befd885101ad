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

use std::collections::HashSet;

use crate::codec;
use crate::error::{Error, Result};
use crate::genome::Genome;

/* -------------------------------------------------------------------------- */

pub const BPT_MAGIC       : u32   = 0x78CA8C91;
pub const BPT_HEADER_SIZE : usize = 32;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BPlusTreeHeader {
    pub block_size: u32,
    pub key_size  : u32,
    pub val_size  : u32,
    pub item_count: u64,
}

/* -------------------------------------------------------------------------- */

impl BPlusTreeHeader {

    pub fn read(buffer: &[u8], offset: usize) -> Result<Self> {
        let magic = codec::read_u32(buffer, offset)?;
        if magic != BPT_MAGIC {
            return Err(Error::InvalidFile(format!("invalid B+ tree magic `{:#x}`", magic)));
        }
        Ok(BPlusTreeHeader {
            block_size: codec::read_u32(buffer, offset +  4)?,
            key_size  : codec::read_u32(buffer, offset +  8)?,
            val_size  : codec::read_u32(buffer, offset + 12)?,
            item_count: codec::read_u64(buffer, offset + 16)?,
        })
    }

    /// Upper bound on the size of a single node.
    pub fn max_node_size(&self) -> u64 {
        4 + self.block_size as u64 * (self.key_size as u64 + self.val_size.max(8) as u64)
    }
}

/* -------------------------------------------------------------------------- */

/// Parse the chromosome tree. `buffer` holds the bytes starting at
/// `tree_offset`, the file offset of the tree header; child pointers stored
/// in the tree are file offsets and are rebased onto the buffer.
pub fn read_chrom_tree(buffer: &[u8], tree_offset: u64) -> Result<Genome> {

    let header = BPlusTreeHeader::read(buffer, 0)?;
    let key_size = header.key_size as usize;

    if header.val_size != 8 {
        return Err(Error::InvalidFile(format!("chromosome tree has invalid value size `{}`", header.val_size)));
    }

    let mut genome  = Genome::default();
    let mut visited = HashSet::new();
    let mut stack   = vec![BPT_HEADER_SIZE];

    while let Some(node) = stack.pop() {

        if !visited.insert(node) {
            return Err(Error::InvalidFile("chromosome tree contains a cycle".to_string()));
        }

        let is_leaf = codec::read_u8 (buffer, node    )?;
        let count   = codec::read_u16(buffer, node + 2)? as usize;
        let mut p   = node + 4;

        if is_leaf != 0 {
            for _ in 0..count {
                let name   = codec::read_padded_str(buffer, p, key_size)?;
                let id     = codec::read_u32(buffer, p + key_size    )?;
                let length = codec::read_u32(buffer, p + key_size + 4)?;

                // ids are dense, so anything beyond the item count is corrupt
                if id as u64 >= header.item_count {
                    return Err(Error::InvalidFile(format!("chromosome `{}` has invalid id `{}`", name, id)));
                }
                genome.add_sequence(name, id, length);

                p += key_size + 8;
            }
        } else {
            let mut children = Vec::with_capacity(count);
            for _ in 0..count {
                let child = codec::read_u64(buffer, p + key_size)?;
                let child = child.checked_sub(tree_offset)
                    .ok_or_else(|| Error::InvalidFile(format!("chromosome tree child offset `{}` precedes the tree", child)))?;
                children.push(child as usize);

                p += key_size + 8;
            }
            // keep the left-to-right order of the children
            stack.extend(children.into_iter().rev());
        }
    }
    log::debug!("read {} chromosomes from chromosome tree", genome.len());

    Ok(genome)
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
