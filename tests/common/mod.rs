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

// Writer for small, byte-exact bigWig and bigBed files held in memory.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use futures::executor::block_on;

use bbiquery::bbi::{BbiFile, BIGBED_MAGIC, BIGWIG_MAGIC};
use bbiquery::bptree::BPT_MAGIC;
use bbiquery::config::BbiParameters;
use bbiquery::error::{Error, Result};
use bbiquery::netfile::{ByteRangeSource, MemoryFile};
use bbiquery::rtree::CIRTREE_MAGIC;

/* -------------------------------------------------------------------------- */

type E = LittleEndian;

/// Uncompressed content of a data block together with its genomic extent,
/// `[start_base, end_base)` in 0-based coordinates.
#[derive(Clone, Debug)]
pub struct DataBlock {
    pub start_chrom: u32,
    pub start_base : u32,
    pub end_chrom  : u32,
    pub end_base   : u32,
    pub data       : Vec<u8>,
}

/* -------------------------------------------------------------------------- */

fn wig_header(chrom_id: u32, start: u32, end: u32, step: u32, span: u32, kind: u8, count: usize) -> Vec<u8> {
    let mut data = Vec::new();
    data.write_u32::<E>(chrom_id).unwrap();
    data.write_u32::<E>(start).unwrap();
    data.write_u32::<E>(end).unwrap();
    data.write_u32::<E>(step).unwrap();
    data.write_u32::<E>(span).unwrap();
    data.write_u8(kind).unwrap();
    data.write_u8(0).unwrap();
    data.write_u16::<E>(count as u16).unwrap();
    data
}

/// A bedGraph block with items `(start, end, score)`.
pub fn bed_graph_block(chrom_id: u32, items: &[(u32, u32, f32)]) -> DataBlock {
    let start = items.iter().map(|x| x.0).min().unwrap_or(0);
    let end   = items.iter().map(|x| x.1).max().unwrap_or(0);

    let mut data = wig_header(chrom_id, start, end, 0, 0, 1, items.len());
    for &(s, e, score) in items {
        data.write_u32::<E>(s).unwrap();
        data.write_u32::<E>(e).unwrap();
        data.write_f32::<E>(score).unwrap();
    }
    DataBlock { start_chrom: chrom_id, start_base: start, end_chrom: chrom_id, end_base: end, data }
}

pub fn fixed_step_block(chrom_id: u32, start: u32, step: u32, span: u32, scores: &[f32]) -> DataBlock {
    let end = start + (scores.len() as u32).saturating_sub(1) * step + span;

    let mut data = wig_header(chrom_id, start, end, step, span, 3, scores.len());
    for &score in scores {
        data.write_f32::<E>(score).unwrap();
    }
    DataBlock { start_chrom: chrom_id, start_base: start, end_chrom: chrom_id, end_base: end, data }
}

pub fn variable_step_block(chrom_id: u32, span: u32, items: &[(u32, f32)]) -> DataBlock {
    let start = items.iter().map(|x| x.0).min().unwrap_or(0);
    let end   = items.iter().map(|x| x.0 + span).max().unwrap_or(0);

    let mut data = wig_header(chrom_id, start, end, 0, span, 2, items.len());
    for &(s, score) in items {
        data.write_u32::<E>(s).unwrap();
        data.write_f32::<E>(score).unwrap();
    }
    DataBlock { start_chrom: chrom_id, start_base: start, end_chrom: chrom_id, end_base: end, data }
}

/// A bigBed block with records `(chrom_id, start, end, rest)`, where `rest`
/// holds the tab separated columns after `chromEnd`.
pub fn bed_block(records: &[(u32, u32, u32, &str)]) -> DataBlock {
    let mut data = Vec::new();
    for &(chrom_id, start, end, rest) in records {
        data.write_u32::<E>(chrom_id).unwrap();
        data.write_u32::<E>(start).unwrap();
        data.write_u32::<E>(end).unwrap();
        data.write_all(rest.as_bytes()).unwrap();
        data.write_u8(0).unwrap();
    }
    let first = records.first().map_or((0, 0), |r| (r.0, r.1));
    let last  = records.iter().map(|r| (r.0, r.2)).max().unwrap_or((0, 0));

    DataBlock { start_chrom: first.0, start_base: first.1, end_chrom: last.0, end_base: last.1, data }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryRecord {
    pub chrom_id   : u32,
    pub start      : u32,
    pub end        : u32,
    pub valid_count: u32,
    pub min_val    : f32,
    pub max_val    : f32,
    pub sum_data   : f32,
    pub sum_squares: f32,
}

/// Summarize bedGraph items `(chrom_id, start, end, score)` over bins of
/// `reduction` bases. Each record spans the covered part of its bin.
pub fn summarize(items: &[(u32, u32, u32, f32)], reduction: u32) -> Vec<SummaryRecord> {
    let mut bins: BTreeMap<(u32, u32), SummaryRecord> = BTreeMap::new();

    for &(chrom_id, start, end, score) in items {
        let mut bin = start / reduction;
        while bin * reduction < end {
            let from    = start.max(bin * reduction);
            let to      = end.min((bin + 1) * reduction);
            let overlap = to - from;

            let r = bins.entry((chrom_id, bin)).or_insert(SummaryRecord {
                chrom_id,
                start      : from,
                end        : to,
                valid_count: 0,
                min_val    : score,
                max_val    : score,
                sum_data   : 0.0,
                sum_squares: 0.0,
            });
            r.start        = r.start.min(from);
            r.end          = r.end.max(to);
            r.valid_count += overlap;
            r.min_val      = r.min_val.min(score);
            r.max_val      = r.max_val.max(score);
            r.sum_data    += score * overlap as f32;
            r.sum_squares += score * score * overlap as f32;

            bin += 1;
        }
    }
    bins.into_values().collect()
}

pub fn zoom_block(records: &[SummaryRecord]) -> DataBlock {
    let mut data = Vec::new();
    for r in records {
        data.write_u32::<E>(r.chrom_id).unwrap();
        data.write_u32::<E>(r.start).unwrap();
        data.write_u32::<E>(r.end).unwrap();
        data.write_u32::<E>(r.valid_count).unwrap();
        data.write_f32::<E>(r.min_val).unwrap();
        data.write_f32::<E>(r.max_val).unwrap();
        data.write_f32::<E>(r.sum_data).unwrap();
        data.write_f32::<E>(r.sum_squares).unwrap();
    }
    let first = records.first().map_or((0, 0), |r| (r.chrom_id, r.start));
    let last  = records.iter().map(|r| (r.chrom_id, r.end)).max().unwrap_or((0, 0));

    DataBlock { start_chrom: first.0, start_base: first.1, end_chrom: last.0, end_base: last.1, data }
}

/// Split summary records into zoom blocks of at most `n` records each.
pub fn zoom_blocks(records: &[SummaryRecord], n: usize) -> Vec<DataBlock> {
    records.chunks(n).map(zoom_block).collect()
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct ZoomLevel {
    pub reduction: u32,
    pub blocks   : Vec<DataBlock>,
}

#[derive(Clone, Debug)]
pub struct ExtraIndexSpec {
    pub field_id  : u16,
    pub block_size: u32,
    /// Keys with the index of the data block holding their records.
    pub keys      : Vec<(String, usize)>,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct BbiWriter {
    pub magic              : u32,
    pub chroms             : Vec<(String, u32)>,
    pub compress           : bool,
    pub blocks             : Vec<DataBlock>,
    pub zooms              : Vec<ZoomLevel>,
    pub field_count        : u16,
    pub defined_field_count: u16,
    pub autosql            : Option<String>,
    pub extra_index        : Option<ExtraIndexSpec>,
    pub rtree_block_size   : u32,
    pub total_summary      : Option<(u64, f64, f64, f64, f64)>,
}

/* -------------------------------------------------------------------------- */

impl BbiWriter {

    pub fn bigwig(chroms: &[(&str, u32)]) -> Self {
        BbiWriter {
            magic              : BIGWIG_MAGIC,
            chroms             : chroms.iter().map(|&(n, l)| (n.to_string(), l)).collect(),
            compress           : false,
            blocks             : Vec::new(),
            zooms              : Vec::new(),
            field_count        : 0,
            defined_field_count: 0,
            autosql            : None,
            extra_index        : None,
            rtree_block_size   : 256,
            total_summary      : None,
        }
    }

    pub fn bigbed(chroms: &[(&str, u32)], field_count: u16, defined_field_count: u16) -> Self {
        BbiWriter {
            magic: BIGBED_MAGIC,
            field_count,
            defined_field_count,
            ..BbiWriter::bigwig(chroms)
        }
    }

    fn encode_block(&self, block: &DataBlock) -> Vec<u8> {
        if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&block.data).unwrap();
            encoder.finish().unwrap()
        } else {
            block.data.clone()
        }
    }

    /// Append data blocks and return their `(offset, size)` locations.
    fn write_blocks(&self, out: &mut Vec<u8>, blocks: &[DataBlock]) -> Vec<(u64, u64)> {
        let mut locations = Vec::new();
        for block in blocks {
            let bytes = self.encode_block(block);
            locations.push((out.len() as u64, bytes.len() as u64));
            out.extend_from_slice(&bytes);
        }
        locations
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 64 + 24 * self.zooms.len()];

        let autosql_offset = match &self.autosql {
            Some(text) => {
                let offset = out.len() as u64;
                out.extend_from_slice(text.as_bytes());
                out.push(0);
                offset
            }
            None => 0,
        };

        let total_summary_offset = match self.total_summary {
            Some((bases, min, max, sum, sum_squares)) => {
                let offset = out.len() as u64;
                out.write_u64::<E>(bases).unwrap();
                out.write_f64::<E>(min).unwrap();
                out.write_f64::<E>(max).unwrap();
                out.write_f64::<E>(sum).unwrap();
                out.write_f64::<E>(sum_squares).unwrap();
                offset
            }
            None => 0,
        };

        let ext_header_offset = if self.extra_index.is_some() {
            let offset = out.len() as u64;
            out.resize(out.len() + 64, 0);
            offset
        } else {
            0
        };

        let chrom_tree_offset = out.len() as u64;
        write_chrom_tree(&mut out, &self.chroms);

        let data_offset = out.len() as u64;
        out.write_u64::<E>(self.blocks.len() as u64).unwrap();
        let locations = self.write_blocks(&mut out, &self.blocks);

        let index_offset = out.len() as u64;
        write_rtree(&mut out, &self.blocks, &locations, self.rtree_block_size);

        let mut zoom_offsets = Vec::new();
        for zoom in &self.zooms {
            let zoom_data = out.len() as u64;
            out.write_u32::<E>(zoom.blocks.len() as u32).unwrap();
            let locations  = self.write_blocks(&mut out, &zoom.blocks);
            let zoom_index = out.len() as u64;
            write_rtree(&mut out, &zoom.blocks, &locations, self.rtree_block_size);
            zoom_offsets.push((zoom.reduction, zoom_data, zoom_index));
        }

        if let Some(spec) = &self.extra_index {
            let list_offset  = out.len() as u64;
            let index_offset = list_offset + 20;

            out.write_u16::<E>(0).unwrap();
            out.write_u16::<E>(1).unwrap();
            out.write_u64::<E>(index_offset).unwrap();
            out.write_u32::<E>(0).unwrap();
            out.write_u16::<E>(spec.field_id).unwrap();
            out.write_u16::<E>(0).unwrap();

            let keys: Vec<(String, (u64, u64))> = spec.keys.iter()
                .map(|(k, i)| (k.clone(), locations[*i]))
                .collect();
            write_extra_index(&mut out, keys, spec.block_size);

            let mut ext = Vec::new();
            ext.write_u16::<E>(64).unwrap();
            ext.write_u16::<E>(1).unwrap();
            ext.write_u64::<E>(list_offset).unwrap();
            let p = ext_header_offset as usize;
            out[p..p + ext.len()].copy_from_slice(&ext);
        }

        let uncompress_buf_size = if self.compress {
            self.blocks.iter().chain(self.zooms.iter().flat_map(|z| z.blocks.iter()))
                .map(|b| b.data.len() as u32)
                .max()
                .unwrap_or(1)
                .max(1)
        } else {
            0
        };

        let mut header = Vec::new();
        header.write_u32::<E>(self.magic).unwrap();
        header.write_u16::<E>(4).unwrap();
        header.write_u16::<E>(self.zooms.len() as u16).unwrap();
        header.write_u64::<E>(chrom_tree_offset).unwrap();
        header.write_u64::<E>(data_offset).unwrap();
        header.write_u64::<E>(index_offset).unwrap();
        header.write_u16::<E>(self.field_count).unwrap();
        header.write_u16::<E>(self.defined_field_count).unwrap();
        header.write_u64::<E>(autosql_offset).unwrap();
        header.write_u64::<E>(total_summary_offset).unwrap();
        header.write_u32::<E>(uncompress_buf_size).unwrap();
        header.write_u64::<E>(ext_header_offset).unwrap();
        for (reduction, data, index) in zoom_offsets {
            header.write_u32::<E>(reduction).unwrap();
            header.write_u32::<E>(0).unwrap();
            header.write_u64::<E>(data).unwrap();
            header.write_u64::<E>(index).unwrap();
        }
        out[..header.len()].copy_from_slice(&header);
        out
    }
}

/* -------------------------------------------------------------------------- */

fn write_chrom_tree(out: &mut Vec<u8>, chroms: &[(String, u32)]) {
    let key_size = chroms.iter().map(|(n, _)| n.len()).max().unwrap_or(1).max(1);

    let mut sorted: Vec<(usize, &(String, u32))> = chroms.iter().enumerate().collect();
    sorted.sort_by(|(_, a), (_, b)| a.0.cmp(&b.0));

    out.write_u32::<E>(BPT_MAGIC).unwrap();
    out.write_u32::<E>(chroms.len().max(1) as u32).unwrap();
    out.write_u32::<E>(key_size as u32).unwrap();
    out.write_u32::<E>(8).unwrap();
    out.write_u64::<E>(chroms.len() as u64).unwrap();
    out.write_u64::<E>(0).unwrap();

    out.write_u8(1).unwrap();
    out.write_u8(0).unwrap();
    out.write_u16::<E>(chroms.len() as u16).unwrap();
    for (id, (name, length)) in sorted {
        write_key(out, name, key_size);
        out.write_u32::<E>(id as u32).unwrap();
        out.write_u32::<E>(*length).unwrap();
    }
}

fn write_key(out: &mut Vec<u8>, key: &str, key_size: usize) {
    let mut bytes = key.as_bytes().to_vec();
    bytes.resize(key_size, 0);
    out.extend_from_slice(&bytes);
}

/* -------------------------------------------------------------------------- */

type Extent = (u32, u32, u32, u32);

fn union_extent(extents: &[Extent]) -> Extent {
    let start = extents.iter().map(|e| (e.0, e.1)).min().unwrap_or((0, 0));
    let end   = extents.iter().map(|e| (e.2, e.3)).max().unwrap_or((0, 0));
    (start.0, start.1, end.0, end.1)
}

/// Write an R tree over `blocks` with the root node directly following the
/// header, then each level below it.
fn write_rtree(out: &mut Vec<u8>, blocks: &[DataBlock], locations: &[(u64, u64)], block_size: u32) {
    let b = block_size.max(2) as usize;

    let leaf_items: Vec<Extent> = blocks.iter()
        .map(|x| (x.start_chrom, x.start_base, x.end_chrom, x.end_base))
        .collect();

    // levels[0] holds the leaves, each node as a range of item indices
    let mut levels: Vec<Vec<(usize, usize)>> = Vec::new();
    let mut extents: Vec<Vec<Extent>> = Vec::new();

    let leaves: Vec<(usize, usize)> = if leaf_items.is_empty() {
        vec![(0, 0)]
    } else {
        (0..leaf_items.len()).step_by(b).map(|i| (i, (i + b).min(leaf_items.len()))).collect()
    };
    extents.push(leaves.iter().map(|&(i, j)| union_extent(&leaf_items[i..j])).collect());
    levels.push(leaves);

    while levels.last().unwrap().len() > 1 {
        let below = extents.last().unwrap().clone();
        let nodes: Vec<(usize, usize)> = (0..below.len()).step_by(b).map(|i| (i, (i + b).min(below.len()))).collect();
        extents.push(nodes.iter().map(|&(i, j)| union_extent(&below[i..j])).collect());
        levels.push(nodes);
    }

    let root   = out.len() as u64 + 48;
    let height = levels.len();

    // node offsets, root level first
    let mut offsets: Vec<Vec<u64>> = vec![Vec::new(); height];
    let mut p = root;
    for level in (0..height).rev() {
        for &(i, j) in &levels[level] {
            offsets[level].push(p);
            let item = if level == 0 { 32 } else { 24 };
            p += 4 + ((j - i) * item) as u64;
        }
    }

    let total = union_extent(&leaf_items);

    out.write_u32::<E>(CIRTREE_MAGIC).unwrap();
    out.write_u32::<E>(block_size).unwrap();
    out.write_u64::<E>(blocks.len() as u64).unwrap();
    out.write_u32::<E>(total.0).unwrap();
    out.write_u32::<E>(total.1).unwrap();
    out.write_u32::<E>(total.2).unwrap();
    out.write_u32::<E>(total.3).unwrap();
    out.write_u64::<E>(0).unwrap();
    out.write_u32::<E>(1).unwrap();
    out.write_u32::<E>(0).unwrap();

    for level in (0..height).rev() {
        for &(i, j) in &levels[level] {
            out.write_u8(if level == 0 { 1 } else { 0 }).unwrap();
            out.write_u8(0).unwrap();
            out.write_u16::<E>((j - i) as u16).unwrap();
            for k in i..j {
                let e = if level == 0 { leaf_items[k] } else { extents[level - 1][k] };
                out.write_u32::<E>(e.0).unwrap();
                out.write_u32::<E>(e.1).unwrap();
                out.write_u32::<E>(e.2).unwrap();
                out.write_u32::<E>(e.3).unwrap();
                if level == 0 {
                    out.write_u64::<E>(locations[k].0).unwrap();
                    out.write_u64::<E>(locations[k].1).unwrap();
                } else {
                    out.write_u64::<E>(offsets[level - 1][k]).unwrap();
                }
            }
        }
    }
}

/* -------------------------------------------------------------------------- */

/// Write a B+ tree mapping keys to `(offset, size)` values.
fn write_extra_index(out: &mut Vec<u8>, mut keys: Vec<(String, (u64, u64))>, block_size: u32) {
    keys.sort_by(|a, b| a.0.cmp(&b.0));

    let b        = block_size.max(2) as usize;
    let key_size = keys.iter().map(|(k, _)| k.len()).max().unwrap_or(1).max(1);

    // each level as a list of (first key index, last key index) ranges of the level below
    let mut levels: Vec<Vec<(usize, usize)>> = Vec::new();
    let mut first_keys: Vec<Vec<String>> = Vec::new();

    let leaves: Vec<(usize, usize)> = (0..keys.len()).step_by(b).map(|i| (i, (i + b).min(keys.len()))).collect();
    first_keys.push(leaves.iter().map(|&(i, _)| keys[i].0.clone()).collect());
    levels.push(leaves);

    while levels.last().unwrap().len() > 1 {
        let below = first_keys.last().unwrap().clone();
        let nodes: Vec<(usize, usize)> = (0..below.len()).step_by(b).map(|i| (i, (i + b).min(below.len()))).collect();
        first_keys.push(nodes.iter().map(|&(i, _)| below[i].clone()).collect());
        levels.push(nodes);
    }

    let header = out.len() as u64;
    let height = levels.len();

    let mut offsets: Vec<Vec<u64>> = vec![Vec::new(); height];
    let mut p = header + 32;
    for level in (0..height).rev() {
        for &(i, j) in &levels[level] {
            offsets[level].push(p);
            let item = if level == 0 { key_size + 16 } else { key_size + 8 };
            p += 4 + ((j - i) * item) as u64;
        }
    }

    out.write_u32::<E>(BPT_MAGIC).unwrap();
    out.write_u32::<E>(block_size).unwrap();
    out.write_u32::<E>(key_size as u32).unwrap();
    out.write_u32::<E>(16).unwrap();
    out.write_u64::<E>(keys.len() as u64).unwrap();
    out.write_u64::<E>(0).unwrap();

    for level in (0..height).rev() {
        for &(i, j) in &levels[level] {
            out.write_u8(if level == 0 { 1 } else { 0 }).unwrap();
            out.write_u8(0).unwrap();
            out.write_u16::<E>((j - i) as u16).unwrap();
            for k in i..j {
                if level == 0 {
                    let (key, (offset, size)) = &keys[k];
                    write_key(out, key, key_size);
                    out.write_u64::<E>(*offset).unwrap();
                    out.write_u64::<E>(*size).unwrap();
                } else {
                    write_key(out, &first_keys[level - 1][k], key_size);
                    out.write_u64::<E>(offsets[level - 1][k]).unwrap();
                }
            }
        }
    }
}

/* -------------------------------------------------------------------------- */

/// In-memory file that records every requested range.
pub struct CountingFile {
    inner       : MemoryFile,
    pub requests: Mutex<Vec<(u64, u64)>>,
}

impl CountingFile {

    pub fn new(data: Vec<u8>) -> Self {
        CountingFile { inner: MemoryFile::new(data), requests: Mutex::new(Vec::new()) }
    }

    pub fn take_requests(&self) -> Vec<(u64, u64)> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

impl ByteRangeSource for CountingFile {
    async fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push((offset, size));
        self.inner.fetch(offset, size).await
    }
}

/* -------------------------------------------------------------------------- */

/// In-memory file whose reads can be made to fail.
pub struct FlakyFile {
    inner      : MemoryFile,
    pub failing: AtomicBool,
}

impl FlakyFile {

    pub fn new(data: Vec<u8>) -> Self {
        FlakyFile { inner: MemoryFile::new(data), failing: AtomicBool::new(false) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ByteRangeSource for FlakyFile {
    async fn fetch(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Generic(format!("connection reset while reading {} bytes at {}", size, offset)));
        }
        self.inner.fetch(offset, size).await
    }
}

/* -------------------------------------------------------------------------- */

/// Minimal HTTP/1.1 server on a loopback port. Every connection carries a
/// single request, whose `Range` header is recorded and passed to the
/// handler as inclusive byte bounds.
pub struct StubServer {
    pub url   : String,
    pub ranges: Arc<Mutex<Vec<String>>>,
}

impl StubServer {

    pub fn start<H>(handler: H) -> Self
    where
        H: Fn(Option<(u64, u64)>) -> (u16, Vec<u8>) + Send + 'static
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url      = format!("http://{}/track.bb", listener.local_addr().unwrap());
        let ranges   = Arc::new(Mutex::new(Vec::new()));
        let recorded = ranges.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Ok(clone) = stream.try_clone() else { continue };

                let mut reader = BufReader::new(clone);
                let mut range  = None;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("range") {
                            range = Some(value.trim().to_string());
                        }
                    }
                }
                if let Some(range) = &range {
                    recorded.lock().unwrap().push(range.clone());
                }
                let (status, body) = handler(range.as_deref().and_then(parse_range));

                let head = format!("HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", status, body.len());
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        StubServer { url, ranges }
    }

    /// Answer range requests from `data`, clamped to its end.
    pub fn serve(data: Vec<u8>) -> Self {
        StubServer::start(move |range| match range {
            Some((from, to)) => {
                let len  = data.len() as u64;
                let from = from.min(len) as usize;
                let to   = to.saturating_add(1).min(len) as usize;
                (206, data[from..to.max(from)].to_vec())
            }
            None => (200, data.clone()),
        })
    }

    pub fn ranges(&self) -> Vec<String> {
        self.ranges.lock().unwrap().clone()
    }
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (from, to) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((from.parse().ok()?, to.parse().ok()?))
}

/* -------------------------------------------------------------------------- */

pub fn open<S: ByteRangeSource>(source: S) -> BbiFile<S> {
    open_with(source, BbiParameters::default())
}

pub fn open_with<S: ByteRangeSource>(source: S, parameters: BbiParameters) -> BbiFile<S> {
    block_on(BbiFile::open(source, parameters)).unwrap()
}
