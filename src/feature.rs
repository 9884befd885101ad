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

/* -------------------------------------------------------------------------- */

/// A decoded record. Coordinates are 1-based and inclusive, i.e. a record
/// stored as `[start, end)` becomes `min = start + 1`, `max = end`.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub chrom_id: u32,
    pub min     : u32,
    pub max     : u32,
    pub data    : FeatureData,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq)]
pub enum FeatureData {
    Signal {
        score: f32,
    },
    SummaryPoint {
        score    : f64,
        min_score: f32,
        max_score: f32,
    },
    Bed(BedFeature),
}

/* -------------------------------------------------------------------------- */

impl Feature {

    pub fn new(chrom_id: u32, min: u32, max: u32, data: FeatureData) -> Self {
        Feature { chrom_id, min, max, data }
    }

    /// Mean score for signal and summary records, the BED score otherwise.
    pub fn score(&self) -> Option<f64> {
        match &self.data {
            FeatureData::Signal      { score }      => Some(*score as f64),
            FeatureData::SummaryPoint{ score, .. }  => Some(*score),
            FeatureData::Bed(bed)                   => bed.score,
        }
    }

    /// The score threshold searches compare against: the maximum for
    /// summary records, the plain score otherwise.
    pub fn peak_score(&self) -> Option<f64> {
        match &self.data {
            FeatureData::SummaryPoint{ max_score, .. } => Some(*max_score as f64),
            _ => self.score(),
        }
    }

    pub fn bed(&self) -> Option<&BedFeature> {
        match &self.data {
            FeatureData::Bed(bed) => Some(bed),
            _ => None,
        }
    }

    /// Test for overlap with the 1-based closed interval `[min, max]`.
    pub fn overlaps(&self, chrom_id: u32, min: u32, max: u32) -> bool {
        self.chrom_id == chrom_id && self.min <= max && self.max >= min
    }
}

/* -------------------------------------------------------------------------- */

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[{}, {}]", self.chrom_id, self.min, self.max)?;
        match &self.data {
            FeatureData::Signal { score } => {
                write!(f, "={}", score)
            }
            FeatureData::SummaryPoint { score, min_score, max_score } => {
                write!(f, "={} (min={}, max={})", score, min_score, max_score)
            }
            FeatureData::Bed(bed) => {
                if let Some(label) = &bed.label {
                    write!(f, " {}", label)?;
                }
                if let Some(orientation) = bed.orientation {
                    write!(f, " {}", orientation)?;
                }
                write!(f, " {}", bed.kind)
            }
        }
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BedFeatureKind {
    #[default]
    Bed,
    /// An exon of a BED12 transcript.
    Transcript,
    /// The coding part of an exon.
    Translation,
}

impl fmt::Display for BedFeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BedFeatureKind::Bed         => write!(f, "bed"),
            BedFeatureKind::Transcript  => write!(f, "transcript"),
            BedFeatureKind::Translation => write!(f, "translation"),
        }
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKind {
    Transcript,
    Gene,
}

/// A BED12 transcript or its gene, spanning all exons of the record.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureGroup {
    pub kind    : GroupKind,
    pub id      : Option<String>,
    pub label   : Option<String>,
    pub chrom_id: u32,
    pub min     : u32,
    pub max     : u32,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BedFeature {
    pub label       : Option<String>,
    pub score       : Option<f64>,
    pub orientation : Option<char>,
    pub item_rgb    : Option<[u8; 3]>,
    pub kind        : BedFeatureKind,
    pub read_frame  : Option<u8>,
    /// Columns beyond the defined BED fields, named by the AutoSQL schema
    /// where available.
    pub extra_fields: Vec<(String, String)>,
    pub groups      : Vec<FeatureGroup>,
}

impl BedFeature {

    pub fn extra(&self, name: &str) -> Option<&str> {
        self.extra_fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

}
