//! Term rules for the many-body Hamiltonian
//!
//! The operator is never materialized: it is a closed set of tagged term
//! variants, each mapping a basis word to at most one (target word, amplitude)
//! pair. Off-diagonal rules carry Jordan-Wigner signs; diagonal rules read
//! occupations straight off the word. The assembled rule set is closed under
//! Hermitian conjugation and conserves the particle number of each spin
//! species, which the builder verifies once at construction time.

use crate::basis::{jw_sign, Basis, Spin};
use crate::lattice::LatticeSpec;
use crate::Amplitude;

/// A single Hamiltonian term rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Term {
    /// `t c†_{create} c_{annihilate}` between two modes of the same spin
    Hop {
        /// Mode the particle is created in
        create: usize,
        /// Mode the particle is annihilated in
        annihilate: usize,
        /// Complex amplitude `t`
        t: Amplitude,
    },
    /// `u n_{i↑} n_{i↓}`
    CoulombIntra {
        /// Single-bit mask of the site's spin-up mode
        up_mask: u64,
        /// Single-bit mask of the site's spin-down mode
        down_mask: u64,
        /// Interaction strength
        u: f64,
    },
    /// `v n_i n_j` over total site densities
    CoulombInter {
        /// Mask covering both modes of site `i`
        mask_i: u64,
        /// Mask covering both modes of site `j`
        mask_j: u64,
        /// Coupling strength
        v: f64,
    },
    /// `-μ n_i - h (n_{i↑} - n_{i↓}) / 2`
    Field {
        /// Single-bit mask of the site's spin-up mode
        up_mask: u64,
        /// Single-bit mask of the site's spin-down mode
        down_mask: u64,
        /// Chemical potential
        mu: f64,
        /// Longitudinal field
        h: f64,
    },
}

impl Term {
    /// Apply the rule to a basis word
    ///
    /// Returns the target word and the amplitude `⟨target|term|word⟩`, or
    /// `None` when the term annihilates the state.
    pub fn apply(&self, word: u64) -> Option<(u64, Amplitude)> {
        match *self {
            Term::Hop {
                create,
                annihilate,
                t,
            } => {
                let from_mask = 1u64 << annihilate;
                let to_mask = 1u64 << create;
                if word & from_mask == 0 || word & to_mask != 0 {
                    return None;
                }
                let mut sign = jw_sign(word, annihilate);
                let removed = word & !from_mask;
                sign *= jw_sign(removed, create);
                Some((removed | to_mask, t * sign))
            }
            Term::CoulombIntra {
                up_mask,
                down_mask,
                u,
            } => {
                if word & up_mask != 0 && word & down_mask != 0 {
                    Some((word, Amplitude::new(u, 0.0)))
                } else {
                    None
                }
            }
            Term::CoulombInter { mask_i, mask_j, v } => {
                let n_i = (word & mask_i).count_ones() as f64;
                let n_j = (word & mask_j).count_ones() as f64;
                if n_i == 0.0 || n_j == 0.0 {
                    return None;
                }
                Some((word, Amplitude::new(v * n_i * n_j, 0.0)))
            }
            Term::Field {
                up_mask,
                down_mask,
                mu,
                h,
            } => {
                let n_up = ((word & up_mask) != 0) as u8 as f64;
                let n_down = ((word & down_mask) != 0) as u8 as f64;
                let value = -mu * (n_up + n_down) - h * (n_up - n_down) / 2.0;
                if value == 0.0 {
                    return None;
                }
                Some((word, Amplitude::new(value, 0.0)))
            }
        }
    }

    /// Whether the rule leaves the basis word unchanged
    pub fn is_diagonal(&self) -> bool {
        !matches!(self, Term::Hop { .. })
    }
}

/// Derive the full Hermitian-closed rule set from a validated lattice
///
/// Every hopping bond contributes one rule per spin and direction, so the
/// generated set contains the conjugate partner of each off-diagonal rule by
/// construction; diagonal rules are their own partners.
pub fn assemble(lattice: &LatticeSpec, basis: &Basis) -> Vec<Term> {
    let mut terms = Vec::new();
    for bond in lattice.hoppings() {
        for spin in [Spin::Up, Spin::Down] {
            terms.push(Term::Hop {
                create: basis.mode(bond.from, spin),
                annihilate: basis.mode(bond.to, spin),
                t: bond.t,
            });
            terms.push(Term::Hop {
                create: basis.mode(bond.to, spin),
                annihilate: basis.mode(bond.from, spin),
                t: bond.t.conj(),
            });
        }
    }
    for intra in lattice.coulomb_intra() {
        terms.push(Term::CoulombIntra {
            up_mask: basis.mode_mask(intra.site, Spin::Up),
            down_mask: basis.mode_mask(intra.site, Spin::Down),
            u: intra.u,
        });
    }
    for inter in lattice.coulomb_inter() {
        let site_mask = |site: usize| {
            basis.mode_mask(site, Spin::Up) | basis.mode_mask(site, Spin::Down)
        };
        terms.push(Term::CoulombInter {
            mask_i: site_mask(inter.pair.0),
            mask_j: site_mask(inter.pair.1),
            v: inter.v,
        });
    }
    for field in lattice.fields() {
        terms.push(Term::Field {
            up_mask: basis.mode_mask(field.site, Spin::Up),
            down_mask: basis.mode_mask(field.site, Spin::Down),
            mu: field.mu,
            h: field.h,
        });
    }
    terms
}

/// Check Hermitian closure of an assembled rule set
///
/// Diagonal rules are real by construction; each `Hop` must be matched by its
/// conjugate-transposed partner with the same multiplicity, so a duplicated
/// rule with a single partner is caught as well. A violation is a
/// construction bug, reported as an error string for the builder to wrap.
pub fn verify_hermitian_closure(terms: &[Term]) -> Result<(), String> {
    let count = |create: usize, annihilate: usize, t: Amplitude| {
        terms
            .iter()
            .filter(|other| {
                matches!(
                    **other,
                    Term::Hop {
                        create: c,
                        annihilate: a,
                        t: s,
                    } if c == create && a == annihilate && s == t
                )
            })
            .count()
    };
    for term in terms {
        if let Term::Hop {
            create,
            annihilate,
            t,
        } = *term
        {
            let own = count(create, annihilate, t);
            let partners = count(annihilate, create, t.conj());
            if partners != own {
                return Err(format!(
                    "hopping rule {annihilate} -> {create} appears {own} times but its \
                     Hermitian partner appears {partners} times"
                ));
            }
        }
    }
    Ok(())
}

/// Check that every rule conserves the particle number of each spin species
///
/// Diagonal rules conserve trivially; a `Hop` conserves exactly when both of
/// its modes lie in the same spin block. A violation is a construction bug,
/// reported as an error string for the builder to wrap.
pub fn verify_sector_conservation(terms: &[Term], sites: usize) -> Result<(), String> {
    for term in terms {
        if let Term::Hop {
            create, annihilate, ..
        } = *term
        {
            if (create < sites) != (annihilate < sites) {
                return Err(format!(
                    "hopping rule {annihilate} -> {create} crosses the spin blocks and \
                     does not conserve the species counts"
                ));
            }
        }
    }
    Ok(())
}
