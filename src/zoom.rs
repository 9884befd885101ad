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

/// A view of the file, either the raw data or one of the zoom levels
/// (index into the zoom level table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    Unzoomed,
    Zoom(usize),
}

/* -------------------------------------------------------------------------- */

impl View {

    /// Number of bases summarized by one record of this view.
    pub fn reduction(&self, reductions: &[u32]) -> u32 {
        match self {
            View::Unzoomed => 1,
            View::Zoom(i)  => reductions.get(*i).copied().unwrap_or(1),
        }
    }
}

/* -------------------------------------------------------------------------- */

/// Pick the view for a query spanning `range` bases such that the number
/// of returned records stays below `max_points`. Zoom levels are tried from
/// finest to coarsest; if none is coarse enough the coarsest one is used.
pub fn select_view(range: u64, reductions: &[u32], max_points: u32) -> View {

    if range <= max_points as u64 || reductions.is_empty() {
        return View::Unzoomed;
    }
    let mut order: Vec<usize> = (0..reductions.len())
        .filter(|&i| reductions[i] > 0)
        .collect();

    order.sort_by_key(|&i| reductions[i]);

    for &i in &order {
        if (range as f64) / (reductions[i] as f64) < max_points as f64 {
            return View::Zoom(i);
        }
    }
    match order.last() {
        Some(&i) => View::Zoom(i),
        None     => View::Unzoomed,
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
