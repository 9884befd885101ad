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

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::bbi::BbiFile;
use crate::error::Result;
use crate::feature::Feature;
use crate::nearest::Direction;
use crate::netfile::ByteRangeSource;

/* -------------------------------------------------------------------------- */

/// A region still to be searched. Candidates are ordered by zoom level
/// (finest first), then by distance of the chromosome from the reference
/// chromosome, then by position in search direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    zoom     : i32,
    chrom_ord: u32,
    key      : i64,
    chrom_id : u32,
    min      : u32,
    max      : u32,
    from_ref : bool,
}

/* -------------------------------------------------------------------------- */

impl Candidate {

    fn new(zoom: i32, chrom_ord: u32, chrom_id: u32, min: u32, max: u32, from_ref: bool, dir: Direction) -> Self {
        Candidate {
            // all negative levels denote the raw data
            zoom: zoom.max(-1),
            chrom_ord,
            key : min as i64 * dir.sign(),
            chrom_id,
            min,
            max,
            from_ref,
        }
    }
}

/* -------------------------------------------------------------------------- */

impl<S: ByteRangeSource> BbiFile<S> {

    /// Find the first feature after (`Forward`) or before (`Backward`)
    /// `reference_point` whose score exceeds `threshold`. The search starts
    /// on coarse zoom levels and refines every region with a hit two levels
    /// at a time until the raw data is reached. Other chromosomes are
    /// searched in order of their distance from `chrom`, wrapping around.
    pub async fn threshold_search(&self, chrom: &str, reference_point: u32, dir: Direction, threshold: f64) -> Result<Option<Feature>> {

        let genome = self.genome();

        let (initial, max_id) = match (genome.get_id(chrom), genome.max_id()) {
            (Some(initial), Some(max_id)) => (initial, max_id),
            _ => return Ok(None),
        };
        let levels = self.header().zooms.len() as i32;
        let n      = max_id as i64 + 1;
        let extent = |chrom_id: u32| genome.seq_length(chrom_id).unwrap_or(u32::MAX);

        let mut candidates = BinaryHeap::new();

        candidates.push(Reverse(Candidate::new(levels - 4, 0, initial, 0, extent(initial), true, dir)));

        for i in 1..=n {
            let chrom_id = (initial as i64 + dir.sign() * i).rem_euclid(n) as u32;
            candidates.push(Reverse(Candidate::new(levels - 1, i as u32, chrom_id, 0, extent(chrom_id), false, dir)));
        }

        while let Some(Reverse(candidate)) = candidates.pop() {

            let view = if candidate.zoom < 0 {
                self.unzoomed_view()
            } else {
                match self.zoomed_view(candidate.zoom as usize) {
                    Some(view) => view,
                    None       => self.unzoomed_view(),
                }
            };
            log::debug!("threshold search on {}:[{}, {}] at zoom {}",
                candidate.chrom_id, candidate.min, candidate.max, candidate.zoom);

            let mut features = view.read_wig_data_by_id(candidate.chrom_id, candidate.min, candidate.max).await?;

            let rp = match (candidate.from_ref, dir) {
                (true , _                  ) => reference_point,
                (false, Direction::Forward ) => 0,
                (false, Direction::Backward) => u32::MAX,
            };
            // closest features first
            if dir == Direction::Backward {
                features.reverse();
            }
            for f in features {
                if !f.peak_score().is_some_and(|score| score > threshold) {
                    continue;
                }
                let beyond = match dir {
                    Direction::Forward  => f.min > rp,
                    Direction::Backward => f.max < rp,
                };
                let reaches = match dir {
                    Direction::Forward  => f.max > rp,
                    Direction::Backward => f.min < rp,
                };
                if candidate.zoom < 0 {
                    if beyond {
                        return Ok(Some(f));
                    }
                } else if reaches {
                    candidates.push(Reverse(Candidate::new(
                        candidate.zoom - 2, candidate.chrom_ord, candidate.chrom_id, f.min, f.max, candidate.from_ref, dir)));
                }
            }
        }
        Ok(None)
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
