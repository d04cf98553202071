//! Basis module
//!
//! Enumerates the many-body basis of a symmetry sector with fixed particle
//! number per spin species. A basis state is a `u64` occupation word with the
//! spin-up occupations in bits `0..sites` and the spin-down occupations in
//! bits `sites..2*sites`; fermionic modes are ordered up-block first, so
//! Jordan-Wigner signs are parities of the occupied modes below the acted-on
//! bit. States are stored in ascending word order, which makes the index
//! assignment deterministic: the same lattice and sector always produce the
//! same ordering, so state vectors stay index-compatible across runs.
//!
//! The reverse lookup from word to index is the dominant memory cost of the
//! engine; the sector dimension is computed combinatorially and checked
//! against a configurable ceiling before anything is allocated.

use std::collections::HashMap;

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Hard limit on the cluster size imposed by the `u64` state encoding
pub const MAX_SITES: usize = 32;

/// A fermionic spin species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Spin {
    /// Spin up
    Up,
    /// Spin down
    Down,
}

/// A symmetry sector: conserved particle number per spin species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sector {
    /// Number of spin-up particles
    pub n_up: usize,
    /// Number of spin-down particles
    pub n_down: usize,
}

impl Sector {
    /// A sector with `n_up` spin-up and `n_down` spin-down particles
    pub fn new(n_up: usize, n_down: usize) -> Self {
        Self { n_up, n_down }
    }

    /// Total particle count in the sector
    pub fn particles(&self) -> usize {
        self.n_up + self.n_down
    }

    /// Twice the total spin projection, `N_up - N_down`
    pub fn two_sz(&self) -> isize {
        self.n_up as isize - self.n_down as isize
    }
}

/// The ordered basis of one symmetry sector, with reverse lookup
#[derive(Debug, Clone)]
pub struct Basis {
    sites: usize,
    sector: Sector,
    states: Vec<u64>,
    index: HashMap<u64, usize>,
}

impl Basis {
    /// Enumerate the basis of `sector` on a cluster of `sites` sites
    ///
    /// Fails with `InvalidSector` if the constraints are mutually
    /// inconsistent and with `BasisTooLarge` if the combinatorial dimension
    /// exceeds `max_dimension`. The check runs before allocation, so an
    /// oversized request never exhausts memory.
    #[tracing::instrument(name = "Basis enumeration", level = "info", skip_all)]
    pub fn enumerate(
        sites: usize,
        sector: Sector,
        max_dimension: usize,
    ) -> Result<Self, BuildError> {
        if sites == 0 || sites > MAX_SITES {
            return Err(BuildError::InvalidSector(format!(
                "cluster of {sites} sites is outside the supported range 1..={MAX_SITES}"
            )));
        }
        if sector.n_up > sites || sector.n_down > sites {
            return Err(BuildError::InvalidSector(format!(
                "sector ({}, {}) does not fit on {sites} sites",
                sector.n_up, sector.n_down
            )));
        }
        let dimension = sector_dimension(sites, sector);
        if dimension > max_dimension as u128 {
            return Err(BuildError::BasisTooLarge {
                dimension,
                maximum: max_dimension,
            });
        }

        let up_masks = masks_with_popcount(sites, sector.n_up);
        let down_masks = masks_with_popcount(sites, sector.n_down);
        let mut states = Vec::with_capacity(dimension as usize);
        // The down block occupies the high bits, so iterating it in the outer
        // loop yields ascending combined words.
        for (down, up) in iproduct!(down_masks.iter(), up_masks.iter()) {
            states.push(up | (down << sites));
        }
        let index = states
            .iter()
            .enumerate()
            .map(|(position, &word)| (word, position))
            .collect::<HashMap<_, _>>();

        tracing::info!(
            dimension = states.len(),
            n_up = sector.n_up,
            n_down = sector.n_down,
            "enumerated sector basis"
        );

        Ok(Self {
            sites,
            sector,
            states,
            index,
        })
    }

    /// Number of states in the sector
    pub fn dimension(&self) -> usize {
        self.states.len()
    }

    /// Number of lattice sites
    pub fn sites(&self) -> usize {
        self.sites
    }

    /// The sector this basis spans
    pub fn sector(&self) -> Sector {
        self.sector
    }

    /// The occupation word of basis state `index`
    pub fn state(&self, index: usize) -> u64 {
        self.states[index]
    }

    /// All occupation words in index order
    pub fn states(&self) -> &[u64] {
        &self.states
    }

    /// The index of an occupation word, if it lies in this sector
    pub fn index_of(&self, word: u64) -> Option<usize> {
        self.index.get(&word).copied()
    }

    /// The single-bit mask of the fermionic mode `(site, spin)`
    pub fn mode_mask(&self, site: usize, spin: Spin) -> u64 {
        1u64 << self.mode(site, spin)
    }

    /// The mode number of `(site, spin)` in the up-block/down-block ordering
    pub fn mode(&self, site: usize, spin: Spin) -> usize {
        match spin {
            Spin::Up => site,
            Spin::Down => self.sites + site,
        }
    }

    /// Whether mode `(site, spin)` is occupied in `word`
    pub fn occupied(&self, word: u64, site: usize, spin: Spin) -> bool {
        word & self.mode_mask(site, spin) != 0
    }
}

/// The Jordan-Wigner sign of acting with `c` or `c†` on `mode` in `word`:
/// the parity of the occupied modes below it
pub fn jw_sign(word: u64, mode: usize) -> f64 {
    let below = word & ((1u64 << mode) - 1);
    if below.count_ones() % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Exact combinatorial dimension of `sector` on `sites` sites
pub fn sector_dimension(sites: usize, sector: Sector) -> u128 {
    binomial(sites, sector.n_up) * binomial(sites, sector.n_down)
}

fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
    }
    acc
}

/// All `sites`-bit words with exactly `count` set bits, in ascending order
///
/// Gosper's hack walks the words of fixed popcount in-order without search.
fn masks_with_popcount(sites: usize, count: usize) -> Vec<u64> {
    if count == 0 {
        return vec![0];
    }
    let limit = 1u64 << sites;
    let mut masks = Vec::new();
    let mut word = (1u64 << count) - 1;
    while word < limit {
        masks.push(word);
        let carry = word & word.wrapping_neg();
        let ripple = word + carry;
        word = (((ripple ^ word) >> 2) / carry) | ripple;
    }
    masks
}
