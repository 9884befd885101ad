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

/* -------------------------------------------------------------------------- */

use std::collections::HashMap;
use std::fmt;

/* -------------------------------------------------------------------------- */

/// Chromosome table of a bbi file. Ids are dense, so the id to name
/// direction is a plain vector.
#[derive(Clone, Debug, Default)]
pub struct Genome {
    pub seqnames: Vec<String>,
    pub lengths : Vec<u32>,
    ids         : HashMap<String, u32>,
}

/* -------------------------------------------------------------------------- */

impl Genome {

    pub fn len(&self) -> usize {
        self.seqnames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqnames.is_empty()
    }

    /// Largest chromosome id, `None` for an empty table.
    pub fn max_id(&self) -> Option<u32> {
        if self.seqnames.is_empty() {
            None
        } else {
            Some(self.seqnames.len() as u32 - 1)
        }
    }

    /// Register a chromosome. Names starting with `chr` are also reachable
    /// without the prefix, unless that name is taken by a real entry.
    pub fn add_sequence(&mut self, seqname: String, id: u32, length: u32) {
        let i = id as usize;
        if i >= self.seqnames.len() {
            self.seqnames.resize(i + 1, String::new());
            self.lengths .resize(i + 1, 0);
        }
        if let Some(alias) = seqname.strip_prefix("chr") {
            if !alias.is_empty() {
                self.ids.entry(alias.to_string()).or_insert(id);
            }
        }
        self.ids.insert(seqname.clone(), id);
        self.seqnames[i] = seqname;
        self.lengths [i] = length;
    }

    pub fn get_id(&self, seqname: &str) -> Option<u32> {
        self.ids.get(seqname).cloned()
    }

    pub fn get_name(&self, id: u32) -> Option<&str> {
        self.seqnames.get(id as usize).map(|s| s.as_str())
    }

    pub fn seq_length(&self, id: u32) -> Option<u32> {
        self.lengths.get(id as usize).cloned()
    }

    pub fn chroms_to_ids(&self) -> &HashMap<String, u32> {
        &self.ids
    }

    pub fn ids_to_chroms(&self) -> &[String] {
        &self.seqnames
    }
}

/* -------------------------------------------------------------------------- */

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>10}", "seqnames", "lengths")?;
        for (seqname, length) in self.seqnames.iter().zip(self.lengths.iter()) {
            writeln!(f, "{:<10} {:>10}", seqname, length)?;
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
