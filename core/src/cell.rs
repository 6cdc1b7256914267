//! `Cell` identifies a unit of application state; `MappedCells` is the
//! non-empty set of cells a message touches; `CellMap` is the
//! replicated `Cell -> owning bee` mapping (spec.md 3).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::{BeeId, NodeInfo};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cell {
    pub dict: String,
    pub key: Vec<u8>,
}

impl Cell {
    pub fn new(dict: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self { dict: dict.into(), key: key.into() }
    }
}

/// A non-empty set of cells. Order is irrelevant; equality and hashing
/// ignore it by storing a `BTreeSet`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MappedCells(BTreeSet<Cell>);

impl MappedCells {
    /// Builds a `MappedCells` from an iterator. Returns `None` if the
    /// iterator is empty — classification results must be non-empty
    /// per spec.md 4.4.
    pub fn new(cells: impl IntoIterator<Item = Cell>) -> Option<Self> {
        let set: BTreeSet<Cell> = cells.into_iter().collect();
        if set.is_empty() {
            None
        } else {
            Some(Self(set))
        }
    }

    pub fn single(cell: Cell) -> Self {
        Self(BTreeSet::from([cell]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-hive owner record: which bee owns a cell, and which hive that
/// bee currently lives on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub bee: BeeId,
    pub hive: NodeInfo,
}

/// The authoritative, replicated `Cell -> owner` mapping. Invariant:
/// at most one owner per cell. Lives inside the store's payload so it
/// survives snapshot/restore and is identical on every hive once
/// replication converges.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CellMap {
    owners: HashMap<Cell, Owner>,
}

/// Outcome of checking a `MappedCells` set against the current map.
pub enum Ownership {
    /// None of the cells are owned yet; the caller may claim all of
    /// them atomically for a new bee.
    Unclaimed,
    /// Every cell in the set is already owned by the same bee.
    SingleOwner(Owner),
    /// Cells in the set are split across different bees (or a mix of
    /// claimed and unclaimed) — a classification conflict.
    Conflict,
}

impl CellMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_of(&self, cell: &Cell) -> Option<&Owner> {
        self.owners.get(cell)
    }

    /// Classifies a `MappedCells` against the current map per spec.md
    /// 4.4's ownership-resolution rule.
    pub fn resolve(&self, cells: &MappedCells) -> Ownership {
        let mut found: Option<&Owner> = None;
        let mut any_unclaimed = false;

        for cell in cells.iter() {
            match self.owners.get(cell) {
                None => any_unclaimed = true,
                Some(owner) => match found {
                    None => found = Some(owner),
                    Some(prev) if prev == owner => {}
                    Some(_) => return Ownership::Conflict,
                },
            }
        }

        match (found, any_unclaimed) {
            (None, true) => Ownership::Unclaimed,
            (Some(owner), false) => Ownership::SingleOwner(owner.clone()),
            // A set that mixes already-owned cells with unclaimed ones
            // can never be claimed atomically for one new bee without
            // first stealing the claimed cells — treat as a conflict,
            // never a silent merge (spec.md 3, 9).
            (Some(_), true) => Ownership::Conflict,
            (None, false) => unreachable!("MappedCells is never empty"),
        }
    }

    pub fn claim(&mut self, cells: &MappedCells, bee: BeeId, hive: NodeInfo) {
        for cell in cells.iter() {
            self.owners.insert(cell.clone(), Owner { bee, hive: hive.clone() });
        }
    }

    pub fn unclaim(&mut self, cells: &MappedCells) {
        for cell in cells.iter() {
            self.owners.remove(cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64) -> NodeInfo {
        NodeInfo { id, addr: format!("127.0.0.1:{id}") }
    }

    #[test]
    fn unclaimed_set_resolves_to_unclaimed() {
        let map = CellMap::new();
        let cells = MappedCells::single(Cell::new("D", "a"));
        assert!(matches!(map.resolve(&cells), Ownership::Unclaimed));
    }

    #[test]
    fn single_owner_resolves_directly() {
        let mut map = CellMap::new();
        let cells = MappedCells::new([Cell::new("D", "a"), Cell::new("D", "b")]).unwrap();
        map.claim(&cells, 7, node(1));
        match map.resolve(&cells) {
            Ownership::SingleOwner(owner) => assert_eq!(owner.bee, 7),
            _ => panic!("expected single owner"),
        }
    }

    #[test]
    fn split_ownership_is_a_conflict() {
        let mut map = CellMap::new();
        map.claim(&MappedCells::single(Cell::new("D", "a")), 1, node(1));
        map.claim(&MappedCells::single(Cell::new("D", "b")), 2, node(1));

        let cells = MappedCells::new([Cell::new("D", "a"), Cell::new("D", "b")]).unwrap();
        assert!(matches!(map.resolve(&cells), Ownership::Conflict));
    }

    #[test]
    fn mixed_claimed_and_unclaimed_is_a_conflict() {
        let mut map = CellMap::new();
        map.claim(&MappedCells::single(Cell::new("D", "a")), 1, node(1));

        let cells = MappedCells::new([Cell::new("D", "a"), Cell::new("D", "b")]).unwrap();
        assert!(matches!(map.resolve(&cells), Ownership::Conflict));
    }

    #[test]
    fn unclaim_frees_the_cells() {
        let mut map = CellMap::new();
        let cells = MappedCells::single(Cell::new("D", "a"));
        map.claim(&cells, 1, node(1));
        map.unclaim(&cells);
        assert!(matches!(map.resolve(&cells), Ownership::Unclaimed));
    }
}
