// Copyright (c) 2026 asm-lens Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lane assignment for jump arrows.
//!
//! Two arcs that cross (each has exactly one endpoint strictly inside the
//! other) may not share a lane. Nested, disjoint and touching arcs may.

/// Closed address interval `[lo, hi]` spanned by one jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpArc {
    pub lo: u64,
    pub hi: u64,
}

impl JumpArc {
    pub fn new(pc: u64, target: u64) -> Self {
        Self { lo: pc.min(target), hi: pc.max(target) }
    }

    pub fn crosses(&self, other: &JumpArc) -> bool {
        (self.lo < other.lo && other.lo < self.hi && self.hi < other.hi)
            || (other.lo < self.lo && self.lo < other.hi && other.hi < self.hi)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaneLayout {
    /// Lane of each input arc, in input order.
    pub lanes: Vec<usize>,
    /// Number of lanes used; 0 when there are no arcs.
    pub max_lanes: usize,
}

/// Sweeps arcs by start (shorter first on ties) and gives each the lowest
/// lane none of whose live arcs it crosses.
pub fn assign_lanes(arcs: &[JumpArc]) -> LaneLayout {
    let mut order: Vec<usize> = (0..arcs.len()).collect();
    order.sort_by_key(|&i| (arcs[i].lo, arcs[i].hi - arcs[i].lo));

    let mut live: Vec<Vec<JumpArc>> = Vec::new();
    let mut lanes = vec![0; arcs.len()];
    for i in order {
        let arc = arcs[i];
        for lane in live.iter_mut() {
            lane.retain(|held| held.hi > arc.lo);
        }
        let lane = match live.iter().position(|held| !held.iter().any(|h| h.crosses(&arc))) {
            Some(lane) => lane,
            None => {
                live.push(Vec::new());
                live.len() - 1
            }
        };
        live[lane].push(arc);
        lanes[i] = lane;
    }

    let max_lanes = lanes.iter().max().map_or(0, |m| m + 1);
    LaneLayout { lanes, max_lanes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(lo: u64, hi: u64) -> JumpArc {
        JumpArc { lo, hi }
    }

    fn check_no_crossing_share(arcs: &[JumpArc], layout: &LaneLayout) {
        for a in 0..arcs.len() {
            for b in a + 1..arcs.len() {
                if arcs[a].crosses(&arcs[b]) {
                    assert_ne!(layout.lanes[a], layout.lanes[b], "{:?} / {:?}", arcs[a], arcs[b]);
                }
            }
        }
    }

    #[test]
    fn no_arcs_no_lanes() {
        assert_eq!(assign_lanes(&[]), LaneLayout::default());
    }

    #[test]
    fn single_arc_uses_lane_zero() {
        let layout = assign_lanes(&[JumpArc::new(2, 0)]);
        assert_eq!(layout.lanes, vec![0]);
        assert_eq!(layout.max_lanes, 1);
    }

    #[test]
    fn crossing_arcs_split() {
        let arcs = [arc(0, 3), arc(1, 4)];
        let layout = assign_lanes(&arcs);
        assert_eq!(layout.lanes, vec![0, 1]);
        assert_eq!(layout.max_lanes, 2);
    }

    #[test]
    fn nested_disjoint_and_touching_arcs_share() {
        let arcs = [arc(0, 10), arc(2, 4), arc(5, 8), arc(10, 12)];
        let layout = assign_lanes(&arcs);
        assert_eq!(layout.lanes, vec![0, 0, 0, 0]);
        assert_eq!(layout.max_lanes, 1);
    }

    #[test]
    fn nested_arc_inside_a_crossing_pair() {
        // (0,10) and (5,15) cross; (6,8) is nested in both and crosses neither.
        let arcs = [arc(0, 10), arc(5, 15), arc(6, 8)];
        let layout = assign_lanes(&arcs);
        check_no_crossing_share(&arcs, &layout);
        assert_eq!(layout.lanes[2], 0);
        assert_eq!(layout.max_lanes, 2);
    }

    #[test]
    fn lanes_are_reused_after_arcs_end() {
        let arcs = [arc(0, 3), arc(1, 4), arc(5, 7), arc(6, 9)];
        let layout = assign_lanes(&arcs);
        assert_eq!(layout.lanes, vec![0, 1, 0, 1]);
        assert_eq!(layout.max_lanes, 2);
    }

    #[test]
    fn ladder_of_crossings() {
        let arcs: Vec<_> = (0..6).map(|i| arc(i * 2, i * 2 + 5)).collect();
        let layout = assign_lanes(&arcs);
        check_no_crossing_share(&arcs, &layout);
        assert_eq!(layout.max_lanes, 3);
    }

    #[test]
    fn held_nested_arc_does_not_hide_a_crossing() {
        // Lane 0 holds (0,20) and then (1,3). (2,25) crosses (0,20) even
        // though the most recent arc in that lane ends earlier.
        let arcs = [arc(0, 20), arc(1, 3), arc(2, 25)];
        let layout = assign_lanes(&arcs);
        check_no_crossing_share(&arcs, &layout);
        assert_eq!(layout.lanes, vec![0, 0, 1]);
    }
}
