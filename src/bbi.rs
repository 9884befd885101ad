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

use std::fmt;

use async_stream::stream;
use futures_core::stream::Stream;
use serde::Serialize;

use crate::autosql::AutoSqlSchema;
use crate::block::{fetch_blocks, Block};
use crate::bptree::read_chrom_tree;
use crate::codec;
use crate::config::BbiParameters;
use crate::decode::{BlockDecoder, FeatureFilter, OverlapFilter};
use crate::error::{Error, Result};
use crate::extra_index::{read_extra_indices, ExtraIndex};
use crate::feature::Feature;
use crate::genome::Genome;
use crate::netfile::{ByteRangeSource, NetFile};
use crate::rtree::RTreeIndex;
use crate::zoom::{select_view, View};

/* -------------------------------------------------------------------------- */

pub const BIGWIG_MAGIC       : u32   = 0x888FFC26;
pub const BIGBED_MAGIC       : u32   = 0x8789F2EB;

const BBI_HEADER_SIZE        : usize = 64;
const ZOOM_HEADER_SIZE       : usize = 24;
const TOTAL_SUMMARY_SIZE     : u64   = 40;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BbiFileType {
    BigWig,
    BigBed,
}

/* -------------------------------------------------------------------------- */

impl BbiFileType {

    fn from_magic(magic: u32) -> Result<Self> {
        match magic {
            BIGWIG_MAGIC => Ok(BbiFileType::BigWig),
            BIGBED_MAGIC => Ok(BbiFileType::BigBed),
            _ if magic.swap_bytes() == BIGWIG_MAGIC || magic.swap_bytes() == BIGBED_MAGIC => {
                Err(Error::UnsupportedFormat("big-endian bbi files are not supported".to_string()))
            }
            _ => {
                Err(Error::UnsupportedFormat(format!("not a bigWig or bigBed file (magic `{:#x}`)", magic)))
            }
        }
    }
}

impl fmt::Display for BbiFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BbiFileType::BigWig => write!(f, "bigWig"),
            BbiFileType::BigBed => write!(f, "bigBed"),
        }
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ZoomHeader {
    pub reduction   : u32,
    pub data_offset : u64,
    pub index_offset: u64,
}

/* -------------------------------------------------------------------------- */

impl ZoomHeader {

    fn read(buffer: &[u8], p: usize) -> Result<Self> {
        Ok(ZoomHeader {
            reduction   : codec::read_u32(buffer, p     )?,
            data_offset : codec::read_u64(buffer, p +  8)?,
            index_offset: codec::read_u64(buffer, p + 16)?,
        })
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BbiHeader {
    pub file_type           : BbiFileType,
    pub version             : u16,
    pub zoom_levels         : u16,
    pub chrom_tree_offset   : u64,
    pub data_offset         : u64,
    pub index_offset        : u64,
    pub field_count         : u16,
    pub defined_field_count : u16,
    pub autosql_offset      : u64,
    pub total_summary_offset: u64,
    pub uncompress_buf_size : u32,
    pub ext_header_offset   : u64,
    pub zooms               : Vec<ZoomHeader>,
}

/* -------------------------------------------------------------------------- */

impl BbiHeader {

    /// Parse the fixed header and the zoom level table. Returns the number
    /// of bytes needed if `buffer` is too short to hold the zoom table.
    fn read(buffer: &[u8]) -> Result<std::result::Result<Self, usize>> {

        let file_type = BbiFileType::from_magic(codec::read_u32(buffer, 0)?)?;

        codec::slice(buffer, 0, BBI_HEADER_SIZE, "bbi header")?;

        let mut header = BbiHeader {
            file_type,
            version             : codec::read_u16(buffer,  4)?,
            zoom_levels         : codec::read_u16(buffer,  6)?,
            chrom_tree_offset   : codec::read_u64(buffer,  8)?,
            data_offset         : codec::read_u64(buffer, 16)?,
            index_offset        : codec::read_u64(buffer, 24)?,
            field_count         : codec::read_u16(buffer, 32)?,
            defined_field_count : codec::read_u16(buffer, 34)?,
            autosql_offset      : codec::read_u64(buffer, 36)?,
            total_summary_offset: codec::read_u64(buffer, 44)?,
            uncompress_buf_size : codec::read_u32(buffer, 52)?,
            ext_header_offset   : codec::read_u64(buffer, 56)?,
            zooms               : Vec::new(),
        };

        let needed = BBI_HEADER_SIZE + header.zoom_levels as usize * ZOOM_HEADER_SIZE;

        if buffer.len() < needed {
            return Ok(Err(needed));
        }
        for i in 0..header.zoom_levels as usize {
            header.zooms.push(ZoomHeader::read(buffer, BBI_HEADER_SIZE + i * ZOOM_HEADER_SIZE)?);
        }
        Ok(Ok(header))
    }

    pub fn is_compressed(&self) -> bool {
        self.uncompress_buf_size > 0
    }

    pub fn reductions(&self) -> Vec<u32> {
        self.zooms.iter().map(|z| z.reduction).collect()
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TotalSummary {
    pub bases_covered: u64,
    pub min_val      : f64,
    pub max_val      : f64,
    pub sum_data     : f64,
    pub sum_squares  : f64,
}

/* -------------------------------------------------------------------------- */

impl TotalSummary {

    fn read(buffer: &[u8]) -> Result<Self> {
        Ok(TotalSummary {
            bases_covered: codec::read_u64(buffer,  0)?,
            min_val      : codec::read_f64(buffer,  8)?,
            max_val      : codec::read_f64(buffer, 16)?,
            sum_data     : codec::read_f64(buffer, 24)?,
            sum_squares  : codec::read_f64(buffer, 32)?,
        })
    }

    pub fn mean(&self) -> f64 {
        self.sum_data / self.bases_covered as f64
    }

    pub fn std_dev(&self) -> f64 {
        let n    = self.bases_covered as f64;
        let mean = self.mean();
        (self.sum_squares / n - mean * mean).max(0.0).sqrt()
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, Serialize)]
pub struct BbiInfo {
    pub file_type          : BbiFileType,
    pub version            : u16,
    pub compressed         : bool,
    pub field_count        : u16,
    pub defined_field_count: u16,
    pub zoom_levels        : Vec<ZoomHeader>,
    pub total_summary      : Option<TotalSummary>,
    pub chroms             : Vec<(String, u32)>,
    pub extra_indices      : Vec<String>,
}

/* -------------------------------------------------------------------------- */

impl fmt::Display for BbiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "type                : {}", self.file_type)?;
        writeln!(f, "version             : {}", self.version)?;
        writeln!(f, "compressed          : {}", self.compressed)?;
        if self.file_type == BbiFileType::BigBed {
            writeln!(f, "field count         : {}", self.field_count)?;
            writeln!(f, "defined field count : {}", self.defined_field_count)?;
        }
        if let Some(summary) = &self.total_summary {
            writeln!(f, "bases covered       : {}", summary.bases_covered)?;
            writeln!(f, "min / max           : {} / {}", summary.min_val, summary.max_val)?;
            writeln!(f, "mean / std          : {} / {}", summary.mean(), summary.std_dev())?;
        }
        for (i, zoom) in self.zoom_levels.iter().enumerate() {
            writeln!(f, "zoom level {:<8} : reduction {}", i, zoom.reduction)?;
        }
        for name in &self.extra_indices {
            writeln!(f, "extra index         : {}", name)?;
        }
        for (name, length) in &self.chroms {
            writeln!(f, "{}\t{}", name, length)?;
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

/// An open bigWig or bigBed file. Header, chromosome table and AutoSQL
/// schema are read on open; R tree headers and roots are cached on first
/// use and shared by all queries on this handle.
#[derive(Debug)]
pub struct BbiFile<S: ByteRangeSource> {
    source        : S,
    parameters    : BbiParameters,
    header        : BbiHeader,
    genome        : Genome,
    total_summary : Option<TotalSummary>,
    schema        : Option<AutoSqlSchema>,
    extra_indices : Vec<ExtraIndex>,
    unzoomed_index: RTreeIndex,
    zoom_indices  : Vec<RTreeIndex>,
}

/* -------------------------------------------------------------------------- */

impl BbiFile<NetFile> {

    /// Open a local file or, for `http://` and `https://` names, a remote
    /// file.
    pub async fn open_path(filename: &str, parameters: BbiParameters) -> Result<Self> {
        let source = NetFile::open(filename, &parameters)?;
        BbiFile::open(source, parameters).await
    }
}

/* -------------------------------------------------------------------------- */

impl<S: ByteRangeSource> BbiFile<S> {

    pub async fn open(source: S, parameters: BbiParameters) -> Result<Self> {

        let prefetch = (parameters.header_prefetch as u64).max(BBI_HEADER_SIZE as u64);
        let buffer   = source.fetch(0, prefetch).await?;

        let header = match BbiHeader::read(&buffer)? {
            Ok(header) => header,
            Err(needed) => {
                let buffer = source.fetch(0, needed as u64).await?;
                BbiHeader::read(&buffer)?
                    .map_err(|needed| Error::Truncated {
                        what: "zoom level table", offset: 0, needed, available: buffer.len() })?
            }
        };
        log::debug!("opened {} file (version {}, {} zoom levels)",
            header.file_type, header.version, header.zoom_levels);

        if header.data_offset <= header.chrom_tree_offset {
            return Err(Error::InvalidFile(format!("chromosome tree at offset {} is not followed by data at {}",
                header.chrom_tree_offset, header.data_offset)));
        }
        // the data section precedes the R tree index
        if header.data_offset > header.index_offset {
            return Err(Error::InvalidFile(format!("data at offset {} is located after the index at {}",
                header.data_offset, header.index_offset)));
        }
        let buffer = source.fetch(header.chrom_tree_offset, header.data_offset - header.chrom_tree_offset).await?;
        let genome = read_chrom_tree(&buffer, header.chrom_tree_offset)?;

        let total_summary = if header.total_summary_offset > 0 {
            let buffer = source.fetch(header.total_summary_offset, TOTAL_SUMMARY_SIZE).await?;
            Some(TotalSummary::read(&buffer)?)
        } else {
            None
        };

        let schema = if header.file_type == BbiFileType::BigBed && header.autosql_offset > 0 {
            let text = read_cstring(&source, header.autosql_offset, parameters.autosql_prefetch).await?;
            AutoSqlSchema::parse(&text)?
        } else {
            None
        };

        let extra_indices = if header.file_type == BbiFileType::BigBed && header.ext_header_offset > 0 {
            read_extra_indices(&source, header.ext_header_offset, schema.as_ref()).await?
        } else {
            Vec::new()
        };

        let unzoomed_index = RTreeIndex::new(header.index_offset);
        let zoom_indices   = header.zooms.iter()
            .map(|z| RTreeIndex::new(z.index_offset))
            .collect();

        Ok(BbiFile {
            source,
            parameters,
            header,
            genome,
            total_summary,
            schema,
            extra_indices,
            unzoomed_index,
            zoom_indices,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn parameters(&self) -> &BbiParameters {
        &self.parameters
    }

    pub fn header(&self) -> &BbiHeader {
        &self.header
    }

    pub fn file_type(&self) -> BbiFileType {
        self.header.file_type
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn schema(&self) -> Option<&AutoSqlSchema> {
        self.schema.as_ref()
    }

    pub fn total_summary(&self) -> Option<&TotalSummary> {
        self.total_summary.as_ref()
    }

    pub fn extra_indices(&self) -> &[ExtraIndex] {
        &self.extra_indices
    }

    pub fn info(&self) -> BbiInfo {
        BbiInfo {
            file_type          : self.header.file_type,
            version            : self.header.version,
            compressed         : self.header.is_compressed(),
            field_count        : self.header.field_count,
            defined_field_count: self.header.defined_field_count,
            zoom_levels        : self.header.zooms.clone(),
            total_summary      : self.total_summary,
            chroms             : self.genome.seqnames.iter().cloned()
                .zip(self.genome.lengths.iter().copied())
                .collect(),
            extra_indices      : self.extra_indices.iter().map(|x| x.name.clone()).collect(),
        }
    }

    pub fn unzoomed_view(&self) -> BbiView<'_, S> {
        BbiView {
            file      : self,
            index     : &self.unzoomed_index,
            is_summary: false,
            reduction : 1,
        }
    }

    pub fn zoomed_view(&self, zoom: usize) -> Option<BbiView<'_, S>> {
        let index = self.zoom_indices.get(zoom)?;
        Some(BbiView {
            file      : self,
            index,
            is_summary: true,
            reduction : self.header.zooms[zoom].reduction,
        })
    }

    pub fn view(&self, view: View) -> Option<BbiView<'_, S>> {
        match view {
            View::Unzoomed => Some(self.unzoomed_view()),
            View::Zoom(i)  => self.zoomed_view(i),
        }
    }

    /// The view whose resolution keeps a query over `[min, max]` below the
    /// configured number of points.
    pub fn select_view(&self, min: u32, max: u32) -> BbiView<'_, S> {
        let range = max.saturating_sub(min) as u64;
        let view  = select_view(range, &self.header.reductions(), self.parameters.max_points);
        self.view(view).unwrap_or_else(|| self.unzoomed_view())
    }

    /// Records overlapping `[min, max]` on `chrom`, at a resolution chosen
    /// by the zoom selector. Results are sorted by position.
    pub async fn read_wig_data(&self, chrom: &str, min: u32, max: u32) -> Result<Vec<Feature>> {
        self.select_view(min, max).read_wig_data(chrom, min, max).await
    }

    /// Like `read_wig_data` but reads the coarsest zoom level whose reduction
    /// does not exceed `reduction`, or the raw data if there is none.
    pub async fn read_wig_data_at_reduction(&self, chrom: &str, min: u32, max: u32, reduction: u32) -> Result<Vec<Feature>> {
        let zoom = self.header.zooms.iter()
            .enumerate()
            .filter(|(_, z)| z.reduction <= reduction)
            .max_by_key(|(_, z)| z.reduction)
            .map(|(i, _)| i);

        let view = match zoom {
            Some(i) => self.zoomed_view(i).unwrap_or_else(|| self.unzoomed_view()),
            None    => self.unzoomed_view(),
        };
        view.read_wig_data(chrom, min, max).await
    }

    pub(crate) fn decoder(&self, is_summary: bool) -> BlockDecoder<'_> {
        BlockDecoder {
            file_type          : self.header.file_type,
            is_summary,
            defined_field_count: self.header.defined_field_count,
            schema             : self.schema.as_ref(),
        }
    }

    /// Fetch and decode the given blocks. A block that cannot be decoded
    /// fails the call, unless the file was opened in lenient mode.
    pub(crate) async fn decode_blocks<F: FeatureFilter + ?Sized>(
        &self,
        blocks    : Vec<Block>,
        is_summary: bool,
        filter    : &F,
    ) -> Result<Vec<Feature>> {

        let decoder  = self.decoder(is_summary);
        let fetched  = fetch_blocks(&self.source, blocks, self.header.uncompress_buf_size).await?;

        let mut features = Vec::new();

        for block in fetched {
            let mut decoded = Vec::new();
            let result = block.data
                .and_then(|data| decoder.decode(&data, filter, &mut decoded));

            match result {
                Ok(()) => features.append(&mut decoded),
                Err(err) if self.parameters.lenient => {
                    log::warn!("skipping data block at offset {}: {}", block.block.offset, err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(features)
    }
}

/* -------------------------------------------------------------------------- */

/// The raw data or one zoom level of a file.
#[derive(Debug)]
pub struct BbiView<'a, S: ByteRangeSource> {
    file      : &'a BbiFile<S>,
    index     : &'a RTreeIndex,
    is_summary: bool,
    reduction : u32,
}

// derive would require `S: Copy`
impl<S: ByteRangeSource> Clone for BbiView<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ByteRangeSource> Copy for BbiView<'_, S> {}

/* -------------------------------------------------------------------------- */

impl<'a, S: ByteRangeSource> BbiView<'a, S> {

    pub fn file(&self) -> &'a BbiFile<S> {
        self.file
    }

    pub fn index(&self) -> &'a RTreeIndex {
        self.index
    }

    pub fn is_summary(&self) -> bool {
        self.is_summary
    }

    pub fn reduction(&self) -> u32 {
        self.reduction
    }

    /// Records overlapping `[min, max]` on `chrom`. A chromosome that is
    /// not part of the file yields an empty result.
    pub async fn read_wig_data(&self, chrom: &str, min: u32, max: u32) -> Result<Vec<Feature>> {
        match self.file.genome.get_id(chrom) {
            Some(chrom_id) => self.read_wig_data_by_id(chrom_id, min, max).await,
            None => {
                log::debug!("chromosome `{}` not found", chrom);
                Ok(Vec::new())
            }
        }
    }

    pub async fn read_wig_data_by_id(&self, chrom_id: u32, min: u32, max: u32) -> Result<Vec<Feature>> {
        let filter = OverlapFilter { chrom_id, min, max };

        let mut features = self.read_features(chrom_id, min, max, &filter).await?;

        features.sort_by(|a, b| (a.chrom_id, a.min, a.max).cmp(&(b.chrom_id, b.min, b.max)));

        Ok(features)
    }

    /// Decode all records in blocks overlapping `[min, max]` that pass
    /// `filter`, in block order.
    pub async fn read_features<F: FeatureFilter + ?Sized>(&self, chrom_id: u32, min: u32, max: u32, filter: &F) -> Result<Vec<Feature>> {
        let blocks = self.index.find_blocks(&self.file.source, chrom_id, min, max).await?;

        log::debug!("query {}:[{}, {}] touches {} blocks", chrom_id, min, max, blocks.len());

        self.file.decode_blocks(blocks, self.is_summary, filter).await
    }

    /// Stream the records overlapping `[min, max]`, one item per data block.
    pub fn query_stream(&self, chrom_id: u32, min: u32, max: u32) -> impl Stream<Item = Result<Vec<Feature>>> + 'a {

        let view = *self;

        stream! {
            let blocks = match view.index.find_blocks(&view.file.source, chrom_id, min, max).await {
                Ok(blocks) => blocks,
                Err(err)   => { yield Err(err); return; }
            };
            let filter = OverlapFilter { chrom_id, min, max };

            for block in blocks {
                match view.file.decode_blocks(vec![block], view.is_summary, &filter).await {
                    Ok(features) => yield Ok(features),
                    Err(err)     => { yield Err(err); return; }
                }
            }
        }
    }
}

/* -------------------------------------------------------------------------- */

/// Read a NUL-terminated string, doubling the fetch window until the
/// terminator or the end of the file is reached.
async fn read_cstring<S: ByteRangeSource>(source: &S, offset: u64, prefetch: u32) -> Result<String> {
    let mut size = (prefetch as u64).max(64);
    loop {
        let buffer = source.fetch(offset, size).await?;

        if let Some(end) = buffer.iter().position(|&b| b == 0) {
            return Ok(String::from_utf8_lossy(&buffer[..end]).into_owned());
        }
        if (buffer.len() as u64) < size {
            return Ok(String::from_utf8_lossy(&buffer).into_owned());
        }
        size *= 2;
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
