//! Data association: resolve, per track, the objects it claims from the
//! gated score map.
//!
//! # Strategies
//! - [`GnnAssociator`]: greedy global nearest neighbour. Every finite pair is
//!   sorted by (score, object id, track id); a pair is accepted when neither
//!   its track nor its object is claimed yet. One object per track.
//! - [`HungarianAssociator`]: globally optimal one-to-one assignment. Finite
//!   pairs form a sparse bipartite graph, partitioned into connected
//!   components (union-find); each component is solved with Kuhn-Munkres.
//! - [`ClusterAssociator`]: each object goes to its best track, so a track
//!   may collect several objects (multi-agent confirmation). Each object is
//!   still claimed by at most one track.
//!
//! Every track present in the score map gets an entry, possibly empty.

use crate::{
    gating::is_assignable,
    object::DetectedObject,
    types::{AssociationMap, ObjectId, ScoreMap, TrackId},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// Strategy turning a gated score map into an association map.
pub trait Associator: Send + Sync {
    fn associate(&self, scores: &ScoreMap) -> AssociationMap;
}

/// Which associator a pipeline is built with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssociatorConfig {
    #[default]
    Gnn,
    /// `dummy_cost`: cost of leaving a track or object unassigned
    Hungarian { dummy_cost: f64 },
    Cluster,
}

impl AssociatorConfig {
    pub fn build(&self) -> Box<dyn Associator> {
        match *self {
            AssociatorConfig::Gnn => Box::new(GnnAssociator),
            AssociatorConfig::Hungarian { dummy_cost } => {
                Box::new(HungarianAssociator { dummy_cost })
            }
            AssociatorConfig::Cluster => Box::new(ClusterAssociator),
        }
    }
}

/// Run `associator` and make sure every scored track has an entry.
pub fn associate(associator: &dyn Associator, scores: &ScoreMap) -> AssociationMap {
    let mut associations = empty_associations(scores);
    for (track, objects) in associator.associate(scores) {
        associations.insert(track, objects);
    }
    debug!(
        tracks = associations.len(),
        claimed = associations.values().map(Vec::len).sum::<usize>(),
        "associated objects to tracks"
    );
    associations
}

/// Identifiers of objects no track claimed, in input order.
pub fn unassociated_objects(
    objects: &[DetectedObject],
    associations: &AssociationMap,
) -> Vec<ObjectId> {
    let claimed: HashSet<&ObjectId> = associations.values().flatten().collect();
    objects
        .iter()
        .filter(|o| !claimed.contains(&o.id))
        .map(|o| o.id.clone())
        .collect()
}

fn empty_associations(scores: &ScoreMap) -> AssociationMap {
    scores
        .keys()
        .map(|(track, _)| (track.clone(), Vec::new()))
        .collect()
}

/// Finite-score pairs sorted by (score, object id, track id).
fn ranked_pairs(scores: &ScoreMap) -> Vec<(&TrackId, &ObjectId, f64)> {
    let mut pairs: Vec<_> = scores
        .iter()
        .filter(|(_, s)| is_assignable(**s))
        .map(|((t, o), s)| (t, o, *s))
        .collect();
    pairs.sort_by(|a, b| {
        a.2.partial_cmp(&b.2)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
            .then_with(|| a.0.cmp(b.0))
    });
    pairs
}

// ---------------------------------------------------------------------------
// Global nearest neighbour (greedy)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct GnnAssociator;

impl Associator for GnnAssociator {
    fn associate(&self, scores: &ScoreMap) -> AssociationMap {
        let mut associations = empty_associations(scores);
        let mut claimed_objects: HashSet<&ObjectId> = HashSet::new();

        for (track, object, _) in ranked_pairs(scores) {
            if claimed_objects.contains(object) {
                continue;
            }
            let Some(entry) = associations.get_mut(track) else {
                continue;
            };
            if entry.is_empty() {
                entry.push(object.clone());
                claimed_objects.insert(object);
            }
        }
        associations
    }
}

// ---------------------------------------------------------------------------
// Cluster: many objects per track
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterAssociator;

impl Associator for ClusterAssociator {
    fn associate(&self, scores: &ScoreMap) -> AssociationMap {
        let mut associations = empty_associations(scores);
        let mut claimed_objects: HashSet<&ObjectId> = HashSet::new();

        // Ranked order makes each object's first appearance its best track,
        // and keeps each track's list ordered by score then object id.
        for (track, object, _) in ranked_pairs(scores) {
            if claimed_objects.insert(object) {
                if let Some(entry) = associations.get_mut(track) {
                    entry.push(object.clone());
                }
            }
        }
        associations
    }
}

// ---------------------------------------------------------------------------
// Sparse cost graph
// ---------------------------------------------------------------------------

/// Finite-cost candidate between dense track and object indices.
#[derive(Clone, Copy, Debug)]
struct Edge {
    track: usize,
    object: usize,
    cost: f64,
}

// ---------------------------------------------------------------------------
// Union-Find (path halving + union by rank)
// ---------------------------------------------------------------------------

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            Ordering::Less => self.parent[rx] = ry,
            Ordering::Greater => self.parent[ry] = rx,
            Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
    }
}

/// Tracks and objects linked by finite-cost edges, indices sorted.
#[derive(Debug)]
struct Component {
    tracks: Vec<usize>,
    objects: Vec<usize>,
    edges: Vec<Edge>,
}

fn sorted_unique(indices: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut v: Vec<usize> = indices.collect();
    v.sort_unstable();
    v.dedup();
    v
}

/// Split `edges` into connected components, ordered by smallest track index.
/// Track i is node i; object j is node n_tracks + j.
fn partition_components(edges: &[Edge], n_tracks: usize, n_objects: usize) -> Vec<Component> {
    let mut uf = UnionFind::new(n_tracks + n_objects);
    for e in edges {
        uf.union(e.track, n_tracks + e.object);
    }

    let mut by_root: BTreeMap<usize, Vec<Edge>> = BTreeMap::new();
    for e in edges {
        by_root.entry(uf.find(e.track)).or_default().push(*e);
    }

    let mut components: Vec<Component> = by_root
        .into_values()
        .map(|edges| {
            let tracks = sorted_unique(edges.iter().map(|e| e.track));
            let objects = sorted_unique(edges.iter().map(|e| e.object));
            Component { tracks, objects, edges }
        })
        .collect();
    components.sort_by_key(|c| c.tracks.first().copied());
    components
}

// ---------------------------------------------------------------------------
// Hungarian algorithm: O(n³) Kuhn-Munkres
// ---------------------------------------------------------------------------

/// Optimal (track, object) pairs of one component. The cost matrix is padded
/// to n×n with `dummy_cost`; a pair is kept only when it is a real edge no
/// dearer than leaving both sides unassigned.
fn solve_component(component: &Component, dummy_cost: f64) -> Vec<(usize, usize)> {
    let nt = component.tracks.len();
    let no = component.objects.len();
    let n = nt.max(no);
    if n == 0 {
        return Vec::new();
    }

    let mut cost = vec![dummy_cost; n * n];
    let mut real = vec![false; n * n];
    for e in &component.edges {
        let row = component.tracks.binary_search(&e.track);
        let col = component.objects.binary_search(&e.object);
        if let (Ok(r), Ok(c)) = (row, col) {
            cost[r * n + c] = e.cost;
            real[r * n + c] = true;
        }
    }

    let pairs: Vec<(usize, usize)> = run_hungarian(&cost, n)
        .into_iter()
        .enumerate()
        .take(nt)
        .filter(|&(r, c)| c < no && real[r * n + c] && cost[r * n + c] <= dummy_cost)
        .map(|(r, c)| (component.tracks[r], component.objects[c]))
        .collect();
    trace!(tracks = nt, objects = no, matched = pairs.len(), "hungarian component");
    pairs
}

/// Core Hungarian algorithm on a square n×n cost matrix (row-major).
/// Returns row_assignment[row] = assigned_column.
fn run_hungarian(cost: &[f64], n: usize) -> Vec<usize> {
    // Potentials for rows (u) and columns (v)
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    // p[j] = row assigned to column j (1-indexed, 0 = none)
    let mut p = vec![0usize; n + 1];
    // way[j] = previous column in augmenting path
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if !used[j] {
                    let val = cost[(i0 - 1) * n + (j - 1)] - u[i0] - v[j];
                    if val < minv[j] {
                        minv[j] = val;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_assign = vec![0usize; n];
    for j in 1..=n {
        if p[j] != 0 {
            row_assign[p[j] - 1] = j - 1;
        }
    }
    row_assign
}

/// Optimal one-to-one assignment over the finite entries of the score map.
#[derive(Clone, Copy, Debug)]
pub struct HungarianAssociator {
    pub dummy_cost: f64,
}

impl Default for HungarianAssociator {
    fn default() -> Self {
        Self { dummy_cost: 1000.0 }
    }
}

impl Associator for HungarianAssociator {
    fn associate(&self, scores: &ScoreMap) -> AssociationMap {
        let mut associations = empty_associations(scores);

        // Dense indices in identifier order
        let track_ids: Vec<&TrackId> = associations.keys().collect();
        let mut object_ids: Vec<&ObjectId> = scores.keys().map(|(_, o)| o).collect();
        object_ids.sort();
        object_ids.dedup();
        let track_idx: HashMap<&TrackId, usize> =
            track_ids.iter().enumerate().map(|(i, t)| (*t, i)).collect();
        let object_idx: HashMap<&ObjectId, usize> =
            object_ids.iter().enumerate().map(|(j, o)| (*o, j)).collect();

        let edges: Vec<Edge> = scores
            .iter()
            .filter(|&(_, &s)| is_assignable(s))
            .map(|((t, o), &cost)| Edge {
                track: track_idx[t],
                object: object_idx[o],
                cost,
            })
            .collect();

        let pairs: Vec<(TrackId, ObjectId)> = partition_components(&edges, track_ids.len(), object_ids.len())
            .iter()
            .flat_map(|comp| solve_component(comp, self.dummy_cost))
            .map(|(ti, oi)| (track_ids[ti].clone(), object_ids[oi].clone()))
            .collect();

        for (track, object) in pairs {
            if let Some(entry) = associations.get_mut(&track) {
                entry.push(object);
            }
        }
        associations
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gating::UNASSIGNABLE;

    fn scores(entries: &[(&str, &str, f64)]) -> ScoreMap {
        entries
            .iter()
            .map(|&(t, o, s)| ((TrackId::from(t), ObjectId::from(o)), s))
            .collect()
    }

    fn claimed(a: &AssociationMap, t: &str) -> Vec<String> {
        a[&TrackId::from(t)].iter().map(|o| o.0.clone()).collect()
    }

    fn assert_one_object_per_track(a: &AssociationMap) {
        let mut seen = HashSet::new();
        for objects in a.values() {
            for o in objects {
                assert!(seen.insert(o.clone()), "object {o} claimed twice");
            }
        }
    }

    #[test]
    fn hungarian_3x3_known() {
        // [4, 1, 3]
        // [2, 0, 5]
        // [3, 2, 2]
        // Optimal: row0→col1 (1), row1→col0 (2), row2→col2 (2) = 5
        let cost = vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0];
        let assign = run_hungarian(&cost, 3);
        let total: f64 = assign.iter().enumerate().map(|(r, &c)| cost[r * 3 + c]).sum();
        assert!((total - 5.0).abs() < 1e-9, "Expected total cost 5, got {total}");
    }

    #[test]
    fn partition_two_independent_components() {
        let edges = [
            Edge { track: 2, object: 3, cost: 2.0 },
            Edge { track: 0, object: 0, cost: 1.0 },
            Edge { track: 0, object: 1, cost: 1.5 },
        ];
        let comps = partition_components(&edges, 4, 4);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].tracks, vec![0]);
        assert_eq!(comps[0].objects, vec![0, 1]);
        assert_eq!(comps[1].objects, vec![3]);
    }

    #[test]
    fn component_drops_pairs_dearer_than_dummy() {
        let comp = Component {
            tracks: vec![0, 1],
            objects: vec![4],
            edges: vec![
                Edge { track: 0, object: 4, cost: 50.0 },
                Edge { track: 1, object: 4, cost: 3.0 },
            ],
        };
        assert_eq!(solve_component(&comp, 10.0), vec![(1, 4)]);
        assert!(solve_component(&comp, 1.0).is_empty());
    }

    #[test]
    fn gnn_picks_lowest_cost_first() {
        let s = scores(&[
            ("t1", "o1", 1.0),
            ("t1", "o2", 0.5),
            ("t2", "o1", 0.8),
            ("t2", "o2", 0.6),
        ]);
        let a = associate(&GnnAssociator, &s);
        assert_eq!(claimed(&a, "t1"), vec!["o2"]);
        assert_eq!(claimed(&a, "t2"), vec!["o1"]);
        assert_one_object_per_track(&a);
    }

    #[test]
    fn gnn_breaks_ties_by_object_id() {
        let s = scores(&[("t1", "ob", 1.0), ("t1", "oa", 1.0)]);
        let a = associate(&GnnAssociator, &s);
        assert_eq!(claimed(&a, "t1"), vec!["oa"]);
    }

    #[test]
    fn gated_out_pairs_leave_tracks_empty() {
        let s = scores(&[("t1", "o1", UNASSIGNABLE), ("t2", "o1", 0.3)]);
        for associator in [
            AssociatorConfig::Gnn,
            AssociatorConfig::Hungarian { dummy_cost: 100.0 },
            AssociatorConfig::Cluster,
        ] {
            let a = associate(associator.build().as_ref(), &s);
            assert_eq!(a.len(), 2, "{associator:?}");
            assert!(a[&TrackId::from("t1")].is_empty(), "{associator:?}");
            assert_eq!(claimed(&a, "t2"), vec!["o1"], "{associator:?}");
        }
    }

    #[test]
    fn hungarian_beats_greedy() {
        // Greedy takes t1-o1 (1.0) then t2-o2 (10.0) = 11; optimal is 2 + 2 = 4
        let s = scores(&[
            ("t1", "o1", 1.0),
            ("t1", "o2", 2.0),
            ("t2", "o1", 2.0),
            ("t2", "o2", 10.0),
        ]);
        let greedy = associate(&GnnAssociator, &s);
        assert_eq!(claimed(&greedy, "t1"), vec!["o1"]);

        let optimal = associate(&HungarianAssociator { dummy_cost: 100.0 }, &s);
        assert_eq!(claimed(&optimal, "t1"), vec!["o2"]);
        assert_eq!(claimed(&optimal, "t2"), vec!["o1"]);
        assert_one_object_per_track(&optimal);
    }

    #[test]
    fn hungarian_leaves_pairs_above_dummy_cost() {
        let s = scores(&[("t1", "o1", 50.0)]);
        let a = associate(&HungarianAssociator { dummy_cost: 10.0 }, &s);
        assert!(a[&TrackId::from("t1")].is_empty());
    }

    #[test]
    fn cluster_collects_several_objects() {
        let s = scores(&[
            ("t1", "o1", 0.4),
            ("t1", "o2", 0.2),
            ("t1", "o3", 5.0),
            ("t2", "o3", 1.0),
            ("t2", "o1", 3.0),
        ]);
        let a = associate(&ClusterAssociator, &s);
        assert_eq!(claimed(&a, "t1"), vec!["o2", "o1"]);
        assert_eq!(claimed(&a, "t2"), vec!["o3"]);
        assert_one_object_per_track(&a);
    }

    #[test]
    fn unclaimed_objects_in_input_order() {
        use crate::motion::CtrvState;
        use crate::types::{AgentId, DMat};
        let objects: Vec<DetectedObject> = ["o3", "o1", "o2"]
            .iter()
            .map(|id| {
                DetectedObject::new(
                    ObjectId::from(*id),
                    AgentId(0),
                    0.0,
                    CtrvState::default().into(),
                    DMat::identity(5, 5),
                )
                .unwrap()
            })
            .collect();
        let mut a = AssociationMap::new();
        a.insert(TrackId::from("t1"), vec![ObjectId::from("o1")]);
        let free = unassociated_objects(&objects, &a);
        assert_eq!(free, vec![ObjectId::from("o3"), ObjectId::from("o2")]);
    }
}
