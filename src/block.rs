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

use std::io::Read;

use flate2::read::ZlibDecoder;
use futures_util::future::try_join_all;

use crate::codec;
use crate::error::{Error, Result};
use crate::netfile::ByteRangeSource;

/* -------------------------------------------------------------------------- */

/// Location of a data block in the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
    pub offset: u64,
    pub size  : u64,
}

/* -------------------------------------------------------------------------- */

impl Block {
    pub fn new(offset: u64, size: u64) -> Self {
        Block { offset, size }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/* -------------------------------------------------------------------------- */

/// A run of byte-contiguous blocks that is fetched with a single request.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockRun {
    pub offset: u64,
    pub size  : u64,
    pub blocks: Vec<Block>,
}

/* -------------------------------------------------------------------------- */

/// Sort blocks by offset, drop duplicates and merge runs where each block
/// starts exactly where the previous one ends.
pub fn merge_blocks(mut blocks: Vec<Block>) -> Vec<BlockRun> {
    blocks.sort();
    blocks.dedup();

    let mut runs: Vec<BlockRun> = Vec::new();

    for block in blocks {
        match runs.last_mut() {
            Some(run) if run.offset.checked_add(run.size) == Some(block.offset) => {
                run.size = run.size.saturating_add(block.size);
                run.blocks.push(block);
            }
            _ => runs.push(BlockRun {
                offset: block.offset,
                size  : block.size,
                blocks: vec![block],
            }),
        }
    }
    runs
}

/* -------------------------------------------------------------------------- */

/// Inflate a zlib compressed block.
pub fn uncompress_slice(data: &[u8], offset: u64) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut buffer  = Vec::new();
    decoder.read_to_end(&mut buffer)
        .map_err(|source| Error::Decompress { offset, source })?;
    Ok(buffer)
}

/* -------------------------------------------------------------------------- */

/// A fetched block together with its decompressed bytes, or the error that
/// prevented getting them.
pub struct FetchedBlock {
    pub block: Block,
    pub data : Result<Vec<u8>>,
}

/* -------------------------------------------------------------------------- */

/// Fetch blocks with as few requests as possible. Transport failures fail
/// the whole call, while a short read or a failed inflate is reported for
/// the affected block only. Results are ordered by block offset.
pub async fn fetch_blocks<S: ByteRangeSource>(
    source             : &S,
    blocks             : Vec<Block>,
    uncompress_buf_size: u32,
) -> Result<Vec<FetchedBlock>> {

    let runs = merge_blocks(blocks);

    log::debug!("fetching {} block runs", runs.len());

    let buffers = try_join_all(
        runs.iter().map(|run| source.fetch(run.offset, run.size))
    ).await?;

    let mut result = Vec::new();

    for (run, buffer) in runs.iter().zip(buffers.iter()) {
        for block in &run.blocks {
            let start = (block.offset - run.offset) as usize;
            let data  = codec::slice(buffer, start, block.size as usize, "data block")
                .and_then(|raw| {
                    if uncompress_buf_size > 0 {
                        uncompress_slice(raw, block.offset)
                    } else {
                        Ok(raw.to_vec())
                    }
                });
            result.push(FetchedBlock { block: *block, data });
        }
    }
    Ok(result)
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
