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

use crate::autosql::AutoSqlSchema;
use crate::bbi::BbiFileType;
use crate::codec;
use crate::error::{Error, Result};
use crate::feature::{BedFeature, BedFeatureKind, Feature, FeatureData, FeatureGroup, GroupKind};

/* -------------------------------------------------------------------------- */

const BBI_TYPE_BED_GRAPH : u8    = 1;
const BBI_TYPE_VARIABLE  : u8    = 2;
const BBI_TYPE_FIXED     : u8    = 3;

const DATA_HEADER_SIZE   : usize = 24;
const ZOOM_RECORD_SIZE   : usize = 32;

/* -------------------------------------------------------------------------- */

/// Decides which decoded records are materialized. Receives the chromosome
/// id, the 1-based closed coordinates of the record and, for bigBed
/// records, the tab separated columns following `chromEnd`.
pub trait FeatureFilter {
    fn accept(&self, chrom_id: u32, min: u32, max: u32, fields: &[&str]) -> bool;
}

impl<F> FeatureFilter for F
where
    F: Fn(u32, u32, u32, &[&str]) -> bool,
{
    fn accept(&self, chrom_id: u32, min: u32, max: u32, fields: &[&str]) -> bool {
        self(chrom_id, min, max, fields)
    }
}

/* -------------------------------------------------------------------------- */

/// Exact overlap with a 1-based closed interval.
#[derive(Clone, Copy, Debug)]
pub struct OverlapFilter {
    pub chrom_id: u32,
    pub min     : u32,
    pub max     : u32,
}

impl FeatureFilter for OverlapFilter {
    fn accept(&self, chrom_id: u32, min: u32, max: u32, _fields: &[&str]) -> bool {
        chrom_id == self.chrom_id && min <= self.max && max >= self.min
    }
}

/// Accepts everything.
#[derive(Clone, Copy, Debug)]
pub struct AcceptAll;

impl FeatureFilter for AcceptAll {
    fn accept(&self, _chrom_id: u32, _min: u32, _max: u32, _fields: &[&str]) -> bool {
        true
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
struct BbiDataHeader {
    chrom_id  : u32,
    start     : u32,
    step      : u32,
    span      : u32,
    kind      : u8,
    item_count: u16,
}

/* -------------------------------------------------------------------------- */

impl BbiDataHeader {

    fn read(buffer: &[u8]) -> Result<Self> {
        codec::slice(buffer, 0, DATA_HEADER_SIZE, "data block header")?;
        // end (offset 8) and reserved (offset 21) are not needed
        Ok(BbiDataHeader {
            chrom_id  : codec::read_u32(buffer,  0)?,
            start     : codec::read_u32(buffer,  4)?,
            step      : codec::read_u32(buffer, 12)?,
            span      : codec::read_u32(buffer, 16)?,
            kind      : codec::read_u8 (buffer, 20)?,
            item_count: codec::read_u16(buffer, 22)?,
        })
    }
}

/* -------------------------------------------------------------------------- */

/// Interprets decompressed data blocks.
#[derive(Clone, Copy, Debug)]
pub struct BlockDecoder<'a> {
    pub file_type          : BbiFileType,
    pub is_summary         : bool,
    pub defined_field_count: u16,
    pub schema             : Option<&'a AutoSqlSchema>,
}

/* -------------------------------------------------------------------------- */

impl<'a> BlockDecoder<'a> {

    pub fn decode<F: FeatureFilter + ?Sized>(&self, block: &[u8], filter: &F, features: &mut Vec<Feature>) -> Result<()> {
        if self.is_summary {
            decode_summary(block, filter, features)
        } else {
            match self.file_type {
                BbiFileType::BigWig => decode_wig(block, filter, features),
                BbiFileType::BigBed => self.decode_bed(block, filter, features),
            }
        }
    }

    fn decode_bed<F: FeatureFilter + ?Sized>(&self, block: &[u8], filter: &F, features: &mut Vec<Feature>) -> Result<()> {
        let mut p = 0;

        while p < block.len() {
            let chrom_id = codec::read_u32(block, p    )?;
            let start    = codec::read_u32(block, p + 4)?;
            let end      = codec::read_u32(block, p + 8)?;
            p += 12;

            let nul = block[p..]
                .iter()
                .position(|&b| b == 0)
                .ok_or(Error::Truncated {
                    what     : "bigBed record",
                    offset   : p,
                    needed   : block.len() - p + 1,
                    available: block.len() - p,
                })?;
            let rest = String::from_utf8_lossy(&block[p..p + nul]);
            p += nul + 1;

            let fields: Vec<&str> = if rest.is_empty() {
                Vec::new()
            } else {
                rest.split('\t').collect()
            };

            if !filter.accept(chrom_id, first_base(start)?, end, &fields) {
                continue;
            }
            self.bed_features(chrom_id, start, end, &fields, features)?;
        }
        Ok(())
    }

    fn bed_features(&self, chrom_id: u32, start: u32, end: u32, fields: &[&str], features: &mut Vec<Feature>) -> Result<()> {

        let mut bed = BedFeature::default();

        if let Some(label) = fields.first() {
            bed.label = Some(label.to_string());
        }
        if let Some(score) = fields.get(1) {
            bed.score = score.trim().parse::<f64>().ok();
        }
        if let Some(strand) = fields.get(2) {
            bed.orientation = strand.chars().next();
        }
        if let Some(rgb) = fields.get(5) {
            bed.item_rgb = parse_rgb(rgb);
        }
        let defined = (self.defined_field_count as usize).max(3);
        for col in defined..fields.len() + 3 {
            let name = self.schema
                .and_then(|s| s.field_name(col))
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("field{}", col));
            bed.extra_fields.push((name, fields[col - 3].to_string()));
        }

        if self.defined_field_count < 12 || fields.len() < 9 {
            features.push(Feature::new(chrom_id, first_base(start)?, end, FeatureData::Bed(bed)));
            return Ok(());
        }

        let thick_start = parse_u32(fields[3]);
        let thick_end   = parse_u32(fields[4]);
        let block_count = parse_u32(fields[6]) as usize;
        let block_sizes : Vec<u32> = parse_list(fields[7]);
        let block_starts: Vec<u32> = parse_list(fields[8]);
        let exon_frames : Option<Vec<i32>> = bed.extra("exonFrames").map(|s| parse_list::<i32>(s));

        bed.kind = BedFeatureKind::Transcript;

        let transcript = FeatureGroup {
            kind    : GroupKind::Transcript,
            id      : bed.label.clone(),
            label   : bed.label.clone(),
            chrom_id,
            min     : first_base(start)?,
            max     : end,
        };
        bed.groups.push(transcript.clone());

        if fields.len() > 9 {
            let gene_id = bed.extra("geneName")
                .unwrap_or(fields[9])
                .to_string();
            let mut gene_name = fields.get(10).map_or(gene_id.clone(), |s| s.to_string());
            if let Some(name2) = bed.extra("geneName2") {
                gene_name = name2.to_string();
            }
            bed.groups.push(FeatureGroup {
                kind : GroupKind::Gene,
                id   : Some(gene_id),
                label: Some(gene_name),
                ..transcript
            });
        }

        let exons = union_spans(
            (0..block_count.min(block_sizes.len()).min(block_starts.len()))
                .map(|b| {
                    let bmin = start.saturating_add(block_starts[b]);
                    (bmin, bmin.saturating_add(block_sizes[b]))
                })
                .collect());

        for &(min, max) in &exons {
            features.push(Feature::new(chrom_id, first_base(min)?, max, FeatureData::Bed(bed.clone())));
        }

        if thick_end <= thick_start {
            return Ok(());
        }
        let minus = bed.orientation == Some('-');
        // widened by three bases to include the stop codon
        let coding = if minus {
            (thick_start.saturating_sub(3), thick_end)
        } else {
            (thick_start, thick_end.saturating_add(3))
        };
        let translated = intersect_spans(&exons, coding);

        if translated.is_empty() {
            return Ok(());
        }
        let mut exon_offset = 0;
        while exon_offset + 1 < exons.len() && translated[0].0 >= exons[exon_offset].1 {
            exon_offset += 1;
        }

        bed.kind = BedFeatureKind::Translation;

        let mut reading_frame = 0u32;
        let n = translated.len();

        for s in 0..n {
            let index = if minus { n - s - 1 } else { s };
            let (min, max) = translated[index];

            let mut frame = reading_frame as u8;
            if let Some(frames) = &exon_frames {
                if let Some(&f) = frames.get(index + exon_offset) {
                    if (0..3).contains(&f) {
                        frame = ((3 - f) % 3) as u8;
                    }
                }
            }
            reading_frame = (reading_frame + (max - min)) % 3;

            let mut translation = bed.clone();
            translation.read_frame = Some(frame);

            features.push(Feature::new(chrom_id, first_base(min)?, max, FeatureData::Bed(translation)));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

fn decode_summary<F: FeatureFilter + ?Sized>(block: &[u8], filter: &F, features: &mut Vec<Feature>) -> Result<()> {
    if block.len() % ZOOM_RECORD_SIZE != 0 {
        return Err(Error::InvalidFile(format!("zoom block length `{}` is not a multiple of {}", block.len(), ZOOM_RECORD_SIZE)));
    }
    for p in (0..block.len()).step_by(ZOOM_RECORD_SIZE) {
        let chrom_id    = codec::read_u32(block, p     )?;
        let start       = codec::read_u32(block, p +  4)?;
        let end         = codec::read_u32(block, p +  8)?;
        let valid_count = codec::read_u32(block, p + 12)?;
        let min_val     = codec::read_f32(block, p + 16)?;
        let max_val     = codec::read_f32(block, p + 20)?;
        let sum_data    = codec::read_f32(block, p + 24)?;

        if valid_count == 0 {
            continue;
        }
        let min = first_base(start)?;
        if !filter.accept(chrom_id, min, end, &[]) {
            continue;
        }
        features.push(Feature::new(chrom_id, min, end, FeatureData::SummaryPoint {
            score    : sum_data as f64 / valid_count as f64,
            min_score: min_val,
            max_score: max_val,
        }));
    }
    Ok(())
}

/* -------------------------------------------------------------------------- */

fn decode_wig<F: FeatureFilter + ?Sized>(block: &[u8], filter: &F, features: &mut Vec<Feature>) -> Result<()> {

    let header = BbiDataHeader::read(block)?;
    let n      = header.item_count as usize;
    let p      = DATA_HEADER_SIZE;

    let mut push = |min: u32, max: u32, score: f32| {
        if filter.accept(header.chrom_id, min, max, &[]) {
            features.push(Feature::new(header.chrom_id, min, max, FeatureData::Signal { score }));
        }
    };

    match header.kind {
        BBI_TYPE_FIXED => {
            codec::slice(block, p, n * 4, "fixed step items")?;
            for i in 0..n {
                let start = header.start.saturating_add((i as u32).saturating_mul(header.step));
                let score = codec::read_f32(block, p + i * 4)?;
                push(first_base(start)?, start.saturating_add(header.span), score);
            }
        }
        BBI_TYPE_VARIABLE => {
            codec::slice(block, p, n * 8, "variable step items")?;
            for i in 0..n {
                let start = codec::read_u32(block, p + i * 8    )?;
                let score = codec::read_f32(block, p + i * 8 + 4)?;
                push(first_base(start)?, start.saturating_add(header.span).saturating_sub(1), score);
            }
        }
        BBI_TYPE_BED_GRAPH => {
            codec::slice(block, p, n * 12, "bedGraph items")?;
            for i in 0..n {
                let mut start = codec::read_u32(block, p + i * 12    )?;
                let mut end   = codec::read_u32(block, p + i * 12 + 4)?;
                let score     = codec::read_f32(block, p + i * 12 + 8)?;
                if start > end {
                    std::mem::swap(&mut start, &mut end);
                }
                push(first_base(start)?, end, score);
            }
        }
        kind => {
            return Err(Error::InvalidFile(format!("unsupported data block type `{}`", kind)));
        }
    }
    Ok(())
}

/* -------------------------------------------------------------------------- */

/// Convert a zero-based start into the one-based first base of a record.
fn first_base(start: u32) -> Result<u32> {
    start.checked_add(1)
        .ok_or_else(|| Error::InvalidFile(format!("record start `{}` is out of range", start)))
}

fn parse_u32(s: &str) -> u32 {
    s.trim().parse().unwrap_or(0)
}

fn parse_list<T: std::str::FromStr>(s: &str) -> Vec<T> {
    s.split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .filter_map(|x| x.parse().ok())
        .collect()
}

fn parse_rgb(s: &str) -> Option<[u8; 3]> {
    let v: Vec<u8> = s.split(',').map(|x| x.trim().parse::<u8>()).collect::<std::result::Result<_, _>>().ok()?;
    if v.len() == 3 {
        Some([v[0], v[1], v[2]])
    } else {
        None
    }
}

/// Merge half-open spans into a sorted list of disjoint spans.
pub fn union_spans<T: Ord + Copy>(mut spans: Vec<(T, T)>) -> Vec<(T, T)> {
    spans.sort_unstable();
    let mut result: Vec<(T, T)> = Vec::with_capacity(spans.len());
    for (min, max) in spans {
        match result.last_mut() {
            Some(last) if min <= last.1 => {
                last.1 = last.1.max(max);
            }
            _ => result.push((min, max)),
        }
    }
    result
}

fn intersect_spans(spans: &[(u32, u32)], (cmin, cmax): (u32, u32)) -> Vec<(u32, u32)> {
    spans.iter()
        .map(|&(min, max)| (min.max(cmin), max.min(cmax)))
        .filter(|&(min, max)| min < max)
        .collect()
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
