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
use std::fmt;
use std::str::FromStr;

use crate::bbi::{BbiFile, BbiView};
use crate::decode::AcceptAll;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::netfile::ByteRangeSource;
use crate::rtree::RTreeEntry;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

/* -------------------------------------------------------------------------- */

impl Direction {

    pub fn sign(&self) -> i64 {
        match self {
            Direction::Backward => -1,
            Direction::Forward  =>  1,
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "+1" | "1" | "+" | "forward"  => Ok(Direction::Forward),
            "-1"       | "-" | "backward" => Ok(Direction::Backward),
            _ => Err(Error::Generic(format!("invalid direction `{}`", s))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Backward => write!(f, "-1"),
            Direction::Forward  => write!(f, "+1"),
        }
    }
}

/* -------------------------------------------------------------------------- */

fn is_candidate(entry: &RTreeEntry, chrom_id: u32, pos: u64, dir: Direction) -> bool {
    match dir {
        Direction::Backward => (entry.start_chrom, entry.start_base as u64) < (chrom_id, pos),
        Direction::Forward  => (entry.end_chrom  , entry.end_base   as u64) > (chrom_id, pos),
    }
}

/// Closest feature in `features` strictly before or after `pos`.
fn pick_feature(features: Vec<Feature>, chrom_id: u32, pos: u64, dir: Direction) -> Option<Feature> {
    match dir {
        Direction::Backward => features.into_iter()
            .filter(|f| (f.chrom_id, f.max as u64) < (chrom_id, pos))
            .max_by_key(|f| (f.chrom_id, f.max)),
        Direction::Forward  => features.into_iter()
            .filter(|f| (f.chrom_id, f.min as u64) > (chrom_id, pos))
            .min_by_key(|f| (f.chrom_id, f.min)),
    }
}

/* -------------------------------------------------------------------------- */

impl<S: ByteRangeSource> BbiView<'_, S> {

    /// Find the feature closest to `pos` in direction `dir`. Only the
    /// closest subtree is descended; its siblings are visited only if it
    /// holds no matching feature. When nothing is found the search wraps
    /// once around the genome.
    pub async fn get_first_adjacent(&self, chrom_id: u32, pos: u32, dir: Direction) -> Result<Option<Feature>> {

        if let Some(feature) = self.get_first_adjacent_from(chrom_id, pos as u64, dir).await? {
            return Ok(Some(feature));
        }
        log::debug!("no feature {} of {}:{}, wrapping around", dir, chrom_id, pos);

        match dir {
            Direction::Forward  => self.get_first_adjacent_from(0, 0, dir).await,
            Direction::Backward => match self.file().genome().max_id() {
                Some(max_id) => self.get_first_adjacent_from(max_id, u64::MAX, dir).await,
                None         => Ok(None),
            },
        }
    }

    async fn get_first_adjacent_from(&self, chrom_id: u32, pos: u64, dir: Direction) -> Result<Option<Feature>> {

        let file   = self.file();
        let source = file.source();
        let index  = self.index();

        // candidates, the most promising one on top
        let mut stack: Vec<RTreeEntry> = Vec::new();
        let mut node = index.fetch_nodes(source, &[index.root_offset()]).await?.remove(0);

        loop {
            let is_leaf = node.is_leaf;

            let mut candidates: Vec<RTreeEntry> = node.entries.into_iter()
                .filter(|e| is_candidate(e, chrom_id, pos, dir))
                .filter(|e| !(is_leaf && is_random(file, e.start_chrom)))
                .collect();

            match dir {
                Direction::Backward => candidates.sort_by_key(|e| (e.end_chrom, e.end_base)),
                Direction::Forward  => candidates.sort_by_key(|e| Reverse((e.start_chrom, e.start_base))),
            }
            stack.extend(candidates);

            loop {
                let entry = match stack.pop() {
                    Some(entry) => entry,
                    None        => return Ok(None),
                };
                match entry.block() {
                    Some(block) => {
                        let features = file.decode_blocks(vec![block], self.is_summary(), &AcceptAll).await?;
                        if let Some(feature) = pick_feature(features, chrom_id, pos, dir) {
                            return Ok(Some(feature));
                        }
                    }
                    None => {
                        node = index.fetch_nodes(source, &[entry.offset]).await?.remove(0);
                        break;
                    }
                }
            }
        }
    }
}

fn is_random<S: ByteRangeSource>(file: &BbiFile<S>, chrom_id: u32) -> bool {
    file.genome()
        .get_name(chrom_id)
        .is_some_and(|name| name.contains("_random"))
}

/* -------------------------------------------------------------------------- */

impl<S: ByteRangeSource> BbiFile<S> {

    /// Closest feature to `chrom:pos` in direction `dir` at full resolution.
    /// Unknown chromosomes yield no result.
    pub async fn get_first_adjacent(&self, chrom: &str, pos: u32, dir: Direction) -> Result<Option<Feature>> {
        match self.genome().get_id(chrom) {
            Some(chrom_id) => self.unzoomed_view().get_first_adjacent(chrom_id, pos, dir).await,
            None           => Ok(None),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
