//! Lattice module
//!
//! An immutable description of the simulated cluster: the number of sites,
//! the hopping bonds with their complex amplitudes, the two-body interaction
//! couplings and the on-site fields. A `LatticeSpec` is created once per run
//! from validated configuration and is consumed read-only by the Hamiltonian
//! builder; every site index is checked at construction so the operator can
//! trust the spec unconditionally on the hot path.
//!
//! The Hamiltonian described by a spec is
//!
//! ```text
//! H = Σ_{bonds,σ} (t c†_{iσ} c_{jσ} + t* c†_{jσ} c_{iσ})
//!   + Σ_i U_i n_{i↑} n_{i↓}
//!   + Σ_{⟨ij⟩} V_{ij} n_i n_j
//!   - Σ_i μ_i n_i - Σ_i h_i (n_{i↑} - n_{i↓}) / 2
//! ```

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::Amplitude;

/// A hopping bond `t c†_{from,σ} c_{to,σ} + h.c.`, identical for both spins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hopping {
    /// Site the particle hops onto
    pub from: usize,
    /// Site the particle leaves
    pub to: usize,
    /// Complex hopping amplitude
    pub t: Amplitude,
}

/// An on-site Hubbard interaction `U n_{i↑} n_{i↓}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoulombIntra {
    /// Site the interaction acts on
    pub site: usize,
    /// Interaction strength
    pub u: f64,
}

/// An inter-site density-density coupling `V n_i n_j`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoulombInter {
    /// The coupled site pair
    pub pair: (usize, usize),
    /// Coupling strength
    pub v: f64,
}

/// On-site single-particle terms: chemical potential and longitudinal field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnSiteField {
    /// Site the field acts on
    pub site: usize,
    /// Chemical potential, entering as `-μ n_i`
    pub mu: f64,
    /// Longitudinal magnetic field, entering as `-h (n_{i↑} - n_{i↓}) / 2`
    pub h: f64,
}

/// Immutable lattice description consumed by the Hamiltonian builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeSpec {
    sites: usize,
    hoppings: Vec<Hopping>,
    coulomb_intra: Vec<CoulombIntra>,
    coulomb_inter: Vec<CoulombInter>,
    fields: Vec<OnSiteField>,
}

impl LatticeSpec {
    /// Start building a lattice with `sites` sites
    pub fn builder(sites: usize) -> LatticeBuilder {
        LatticeBuilder {
            sites,
            hoppings: Vec::new(),
            coulomb_intra: Vec::new(),
            coulomb_inter: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// An open tight-binding chain with uniform hopping `t` and Hubbard `u`
    ///
    /// The hopping enters with the standard sign, `-t Σ c†c`, so `t > 0`
    /// yields a bonding ground state with negative energy.
    pub fn chain(sites: usize, t: f64, u: f64) -> Result<Self, BuildError> {
        let mut builder = Self::builder(sites);
        for i in 0..sites.saturating_sub(1) {
            builder = builder.with_hopping(i, i + 1, Amplitude::new(-t, 0.0));
        }
        for site in 0..sites {
            builder = builder.with_coulomb_intra(site, u);
        }
        builder.build()
    }

    /// Number of sites in the cluster
    pub fn sites(&self) -> usize {
        self.sites
    }

    /// The hopping bonds
    pub fn hoppings(&self) -> &[Hopping] {
        &self.hoppings
    }

    /// The on-site interactions
    pub fn coulomb_intra(&self) -> &[CoulombIntra] {
        &self.coulomb_intra
    }

    /// The inter-site density-density couplings
    pub fn coulomb_inter(&self) -> &[CoulombInter] {
        &self.coulomb_inter
    }

    /// The on-site fields
    pub fn fields(&self) -> &[OnSiteField] {
        &self.fields
    }
}

/// Accumulates couplings before validation
///
/// All site indices are checked in `build`, which is the only way to obtain a
/// `LatticeSpec`.
pub struct LatticeBuilder {
    sites: usize,
    hoppings: Vec<Hopping>,
    coulomb_intra: Vec<CoulombIntra>,
    coulomb_inter: Vec<CoulombInter>,
    fields: Vec<OnSiteField>,
}

impl LatticeBuilder {
    /// Append a hopping bond `t c†_{from,σ} c_{to,σ} + h.c.`
    pub fn with_hopping(mut self, from: usize, to: usize, t: Amplitude) -> Self {
        self.hoppings.push(Hopping { from, to, t });
        self
    }

    /// Append an on-site interaction `u n_{i↑} n_{i↓}`
    pub fn with_coulomb_intra(mut self, site: usize, u: f64) -> Self {
        self.coulomb_intra.push(CoulombIntra { site, u });
        self
    }

    /// Append an inter-site coupling `v n_i n_j`
    pub fn with_coulomb_inter(mut self, i: usize, j: usize, v: f64) -> Self {
        self.coulomb_inter.push(CoulombInter { pair: (i, j), v });
        self
    }

    /// Append on-site chemical potential `μ` and longitudinal field `h`
    pub fn with_field(mut self, site: usize, mu: f64, h: f64) -> Self {
        self.fields.push(OnSiteField { site, mu, h });
        self
    }

    /// Validate every coupling and freeze the spec
    pub fn build(self) -> Result<LatticeSpec, BuildError> {
        if self.sites == 0 {
            return Err(BuildError::MalformedLattice(
                "a lattice must contain at least one site".into(),
            ));
        }
        let check = |site: usize, what: &str| -> Result<(), BuildError> {
            if site >= self.sites {
                return Err(BuildError::MalformedLattice(format!(
                    "{what} references site {site}, but the lattice has {} sites",
                    self.sites
                )));
            }
            Ok(())
        };
        for bond in &self.hoppings {
            check(bond.from, "hopping bond")?;
            check(bond.to, "hopping bond")?;
            if bond.from == bond.to {
                return Err(BuildError::MalformedLattice(format!(
                    "hopping bond connects site {} to itself; use a field term instead",
                    bond.from
                )));
            }
        }
        for intra in &self.coulomb_intra {
            check(intra.site, "on-site interaction")?;
        }
        for inter in &self.coulomb_inter {
            check(inter.pair.0, "density-density coupling")?;
            check(inter.pair.1, "density-density coupling")?;
        }
        for field in &self.fields {
            check(field.site, "on-site field")?;
        }
        Ok(LatticeSpec {
            sites: self.sites,
            hoppings: self.hoppings,
            coulomb_intra: self.coulomb_intra,
            coulomb_inter: self.coulomb_inter,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod test {
    use super::LatticeSpec;
    use crate::Amplitude;

    #[test]
    fn chain_has_expected_couplings() {
        let lattice = LatticeSpec::chain(4, 1.0, 8.0).unwrap();
        assert_eq!(lattice.sites(), 4);
        assert_eq!(lattice.hoppings().len(), 3);
        assert_eq!(lattice.coulomb_intra().len(), 4);
        assert!(lattice
            .hoppings()
            .iter()
            .all(|bond| bond.t == Amplitude::new(-1.0, 0.0)));
    }

    #[test]
    fn out_of_range_bond_is_rejected() {
        let result = LatticeSpec::builder(2)
            .with_hopping(0, 2, Amplitude::new(-1.0, 0.0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn self_hopping_is_rejected() {
        let result = LatticeSpec::builder(2)
            .with_hopping(1, 1, Amplitude::new(-1.0, 0.0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn empty_lattice_is_rejected() {
        assert!(LatticeSpec::builder(0).build().is_err());
    }
}
