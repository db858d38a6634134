//! Splits a snapshot into electrically independent islands.

use std::borrow::Cow;
use std::collections::VecDeque;

use super::{
    options::PowerFlowOptions,
    snapshot::{BranchControl, NetworkSnapshot},
};

/// Bidirectional map between island-local and global (snapshot) indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMap {
    to_global: Vec<usize>,
    to_local: Vec<Option<usize>>,
}

impl IndexMap {
    pub fn identity(n: usize) -> Self {
        Self {
            to_global: (0..n).collect(),
            to_local: (0..n).map(Some).collect(),
        }
    }

    /// `selected` must be sorted and unique.
    pub fn from_selection(selected: Vec<usize>, n_global: usize) -> Self {
        let mut to_local = vec![None; n_global];
        for (local, &global) in selected.iter().enumerate() {
            to_local[global] = Some(local);
        }
        Self {
            to_global: selected,
            to_local,
        }
    }

    #[inline]
    pub fn global(&self, local: usize) -> usize {
        self.to_global[local]
    }

    #[inline]
    pub fn local(&self, global: usize) -> Option<usize> {
        self.to_local.get(global).copied().flatten()
    }

    pub fn globals(&self) -> &[usize] {
        &self.to_global
    }

    pub fn len(&self) -> usize {
        self.to_global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_global.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.to_global.len() == self.to_local.len()
            && self.to_global.iter().enumerate().all(|(i, &g)| i == g)
    }
}

/// A connected set of active buses with its own locally numbered device arrays.
#[derive(Debug, Clone)]
pub struct Island<'a> {
    pub index: usize,
    pub data: Cow<'a, NetworkSnapshot>,
    pub buses: IndexMap,
    pub branches: IndexMap,
    pub generators: IndexMap,
    pub batteries: IndexMap,
    pub loads: IndexMap,
    pub shunts: IndexMap,
    /// Global indices of branches whose regulated bus lies outside this island.
    pub detached_controls: Vec<usize>,
}

impl<'a> Island<'a> {
    /// Reuses the snapshot arrays as they are, with identity maps.
    pub fn whole(snapshot: &'a NetworkSnapshot) -> Self {
        Self {
            index: 0,
            data: Cow::Borrowed(snapshot),
            buses: IndexMap::identity(snapshot.buses.len()),
            branches: IndexMap::identity(snapshot.branches.len()),
            generators: IndexMap::identity(snapshot.generators.len()),
            batteries: IndexMap::identity(snapshot.batteries.len()),
            loads: IndexMap::identity(snapshot.loads.len()),
            shunts: IndexMap::identity(snapshot.shunts.len()),
            detached_controls: Vec::new(),
        }
    }

    /// Copies the devices attached to `bus_set` (sorted global bus indices) into
    /// a new, locally numbered snapshot. Branches are kept when both ends are in the set.
    pub fn slice(snapshot: &NetworkSnapshot, bus_set: Vec<usize>, index: usize) -> Island<'static> {
        let buses = IndexMap::from_selection(bus_set, snapshot.buses.len());

        let select = |n: usize, keep: &dyn Fn(usize) -> bool| {
            IndexMap::from_selection((0..n).filter(|&i| keep(i)).collect(), n)
        };
        let branches = select(snapshot.branches.len(), &|k| {
            let br = &snapshot.branches[k];
            buses.local(br.from).is_some() && buses.local(br.to).is_some()
        });
        let generators = select(snapshot.generators.len(), &|i| {
            buses.local(snapshot.generators[i].bus).is_some()
        });
        let batteries = select(snapshot.batteries.len(), &|i| {
            buses.local(snapshot.batteries[i].bus).is_some()
        });
        let loads = select(snapshot.loads.len(), &|i| buses.local(snapshot.loads[i].bus).is_some());
        let shunts = select(snapshot.shunts.len(), &|i| buses.local(snapshot.shunts[i].bus).is_some());

        // every index below is in the island by construction of the maps above
        let to_local = |g: usize| buses.local(g).unwrap_or_default();
        let mut detached_controls = Vec::new();

        let data = NetworkSnapshot {
            sbase: snapshot.sbase,
            buses: buses.globals().iter().map(|&i| snapshot.buses[i].clone()).collect(),
            branches: branches
                .globals()
                .iter()
                .map(|&k| {
                    let mut br = snapshot.branches[k].clone();
                    br.from = to_local(br.from);
                    br.to = to_local(br.to);
                    if let BranchControl::VoltageModule { bus, .. } = &mut br.control {
                        match buses.local(*bus) {
                            Some(local) => *bus = local,
                            None => {
                                detached_controls.push(k);
                                br.control = BranchControl::None;
                            }
                        }
                    }
                    br
                })
                .collect(),
            generators: generators
                .globals()
                .iter()
                .map(|&i| {
                    let mut g = snapshot.generators[i].clone();
                    g.bus = to_local(g.bus);
                    g
                })
                .collect(),
            batteries: batteries
                .globals()
                .iter()
                .map(|&i| {
                    let mut g = snapshot.batteries[i].clone();
                    g.bus = to_local(g.bus);
                    g
                })
                .collect(),
            loads: loads
                .globals()
                .iter()
                .map(|&i| {
                    let mut l = snapshot.loads[i].clone();
                    l.bus = to_local(l.bus);
                    l
                })
                .collect(),
            shunts: shunts
                .globals()
                .iter()
                .map(|&i| {
                    let mut s = snapshot.shunts[i].clone();
                    s.bus = to_local(s.bus);
                    s
                })
                .collect(),
            // HVDC links join islands through injections and are handled at grid level
            hvdc_links: Vec::new(),
        };

        Island {
            index,
            data: Cow::Owned(data),
            buses,
            branches,
            generators,
            batteries,
            loads,
            shunts,
            detached_controls,
        }
    }

    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    pub fn n_branch(&self) -> usize {
        self.branches.len()
    }

    pub fn is_sliced(&self) -> bool {
        matches!(self.data, Cow::Owned(_))
    }
}

/// Result of splitting a snapshot.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    pub islands: Vec<Island<'a>>,
    /// Single-node components removed by `ignore_single_node_islands`.
    pub discarded: Vec<usize>,
}

/// Connected components of the active buses through active branches.
///
/// Components are ordered by their lowest bus index and their members are sorted.
pub fn find_islands(snapshot: &NetworkSnapshot) -> Vec<Vec<usize>> {
    let n = snapshot.buses.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for br in snapshot.branches.iter().filter(|b| b.active) {
        if snapshot.buses[br.from].active && snapshot.buses[br.to].active {
            adjacency[br.from].push(br.to);
            adjacency[br.to].push(br.from);
        }
    }

    let mut visited = vec![false; n];
    let mut islands = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..n {
        if visited[start] || !snapshot.buses[start].active {
            continue;
        }
        let mut members = Vec::new();
        visited[start] = true;
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            members.push(node);
            for &next in &adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        members.sort_unstable();
        islands.push(members);
    }
    islands
}

/// Splits the snapshot into islands, taking the no-copy path when a single
/// component spans every bus.
pub fn partition<'a>(snapshot: &'a NetworkSnapshot, options: &PowerFlowOptions) -> Partition<'a> {
    let components = find_islands(snapshot);
    if components.len() == 1 && components[0].len() == snapshot.buses.len() {
        let skip = options.ignore_single_node_islands && components[0].len() == 1;
        tracing::debug!("single island covering the whole network");
        return Partition {
            islands: if skip { Vec::new() } else { vec![Island::whole(snapshot)] },
            discarded: if skip { components[0].clone() } else { Vec::new() },
        };
    }

    let mut islands = Vec::with_capacity(components.len());
    let mut discarded = Vec::new();
    for members in components {
        if options.ignore_single_node_islands && members.len() == 1 {
            discarded.extend(members);
            continue;
        }
        let index = islands.len();
        islands.push(Island::slice(snapshot, members, index));
    }
    tracing::debug!(
        islands = islands.len(),
        discarded = discarded.len(),
        "network partitioned"
    );
    Partition { islands, discarded }
}
