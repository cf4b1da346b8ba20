//! Realm handles owned by a scenario and the collaborators that build them.
//!
//! Creation, population and teardown of realms are provided by whoever
//! implements [`Provision`]; the driver only needs the resulting handles
//! and the run page of every REC.

use crate::config::{DEFAULT_NUM_RECS, DEFAULT_S2SZ, MAX_AUX_PLANES, MAX_S2SZ, MIN_S2SZ};
use crate::rmi::error::Error;
use crate::rmi::features::Features;
use crate::rmi::rec::Run;

use core::fmt;
use serde::Deserialize;

/// Plane index. 0 is the primary plane, 1..=N the auxiliary ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub struct Plane(usize);

impl Plane {
    pub const PRIMARY: Plane = Plane(0);

    pub const fn new(index: usize) -> Self {
        Plane(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    pub fn is_primary(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Realm descriptor as seen by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rd {
    pub addr: usize,
    pub num_aux_planes: usize,
    /// Every auxiliary plane owns a translation tree.
    pub rtt_tree_pp: bool,
    pub s2sz: u8,
}

impl Rd {
    pub fn aux_planes(&self) -> impl Iterator<Item = Plane> {
        (1..=self.num_aux_planes).map(Plane::new)
    }

    /// Protected mappings must leave the auxiliary trees before their RIPAS
    /// may change.
    pub fn needs_aux_unmap(&self) -> bool {
        self.rtt_tree_pp && self.num_aux_planes > 0
    }

    /// First IPA of the unprotected half of the address space, if the IPA
    /// width fits in a `usize`.
    pub fn unprotected_base(&self) -> Option<usize> {
        1usize.checked_shl(u32::from(self.s2sz.saturating_sub(1)))
    }
}

pub struct Rec {
    pub handle: usize,
    pub run: Run,
}

impl fmt::Debug for Rec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rec({:#x})", self.handle)
    }
}

#[derive(Debug)]
pub struct Realm {
    pub rd: Rd,
    pub recs: Vec<Rec>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RttTree {
    /// Per-plane trees unless the monitor can share a single one.
    #[default]
    Auto,
    PerPlane,
    Single,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Region {
    pub ipa: usize,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RealmParams {
    pub num_aux_planes: usize,
    pub rtt_tree: RttTree,
    pub s2sz: u8,
    pub num_recs: usize,
    /// Protected data populated before activation.
    pub data: Vec<Region>,
    /// Unassigned ranges initialised to RIPAS RAM before activation.
    pub ripas_init: Vec<Region>,
}

impl Default for RealmParams {
    fn default() -> Self {
        Self {
            num_aux_planes: 0,
            rtt_tree: RttTree::Auto,
            s2sz: DEFAULT_S2SZ,
            num_recs: DEFAULT_NUM_RECS,
            data: Vec::new(),
            ripas_init: Vec::new(),
        }
    }
}

impl RealmParams {
    pub fn needs_planes(&self) -> bool {
        self.num_aux_planes > 0
    }

    /// Settles an `Auto` tree choice against the monitor's capabilities.
    pub fn resolve(&self, features: &Features) -> Self {
        let mut params = self.clone();
        if params.rtt_tree == RttTree::Auto {
            params.rtt_tree = if features.supports_rtt_tree_single() {
                RttTree::Single
            } else {
                RttTree::PerPlane
            };
        }
        params
    }

    pub fn rtt_tree_pp(&self) -> bool {
        self.rtt_tree != RttTree::Single
    }

    /// Whether the monitor can build this realm at all. A realm it cannot
    /// build is a missing capability, not a failure.
    pub fn supported_by(&self, features: &Features) -> bool {
        if self.num_aux_planes > features.max_aux_planes() || self.s2sz > features.s2sz() {
            return false;
        }
        match self.rtt_tree {
            _ if !self.needs_planes() => true,
            RttTree::Auto => true,
            RttTree::PerPlane => features.supports_rtt_tree_per_plane(),
            RttTree::Single => features.supports_rtt_tree_single(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.num_aux_planes > MAX_AUX_PLANES || self.num_recs == 0 {
            return Err(Error::RmiErrorInput);
        }
        if !(MIN_S2SZ..=MAX_S2SZ).contains(&self.s2sz) {
            return Err(Error::RmiErrorInput);
        }
        Ok(())
    }
}

/// Out-of-band services used to build and tear down realms.
pub trait Provision {
    /// Creates, populates and activates a realm with `params.num_recs` RECs.
    fn realm_setup(&mut self, params: &RealmParams) -> Result<Realm, Error>;

    fn realm_destroy(&mut self, realm: Realm) -> Result<(), Error>;

    /// Maps `size` bytes of non-secure memory at `offset` into the
    /// unprotected half of the realm. Returns the IPA of the mapping.
    fn map_unprotected(&mut self, rd: &Rd, offset: usize, size: usize) -> Result<usize, Error>;

    /// Delegates fresh granules and maps them at `ipa` with unknown content.
    fn map_protected_unknown(&mut self, rd: &Rd, ipa: usize, size: usize) -> Result<(), Error>;

    /// Runs `f` against a freshly set up realm and destroys it afterwards,
    /// whatever `f` returned.
    fn with_realm<T, F>(&mut self, params: &RealmParams, f: F) -> Result<T, Error>
    where
        Self: Sized,
        F: FnOnce(&mut Self, &mut Realm) -> T,
    {
        let mut realm = self.realm_setup(params)?;
        debug!("realm {:#x} ready with {} REC(s)", realm.rd.addr, realm.recs.len());

        let ret = f(self, &mut realm);

        let addr = realm.rd.addr;
        if let Err(err) = self.realm_destroy(realm) {
            warn!("failed to destroy realm {:#x}: {}", addr, err);
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rmi::features::{FeatureReg0, RTT_PLANE_AUX_ANY, RTT_PLANE_AUX_PER_PLANE, RTT_PLANE_AUX_SINGLE};

    fn features(rtt_plane: u64) -> Features {
        let mut reg = FeatureReg0::new(0);
        reg.set_masked_value(FeatureReg0::MAX_NUM_AUX_PLANES, 1)
            .set_masked_value(FeatureReg0::RTT_PLANE, rtt_plane);
        Features::from(reg.get())
    }

    #[test]
    fn aux_planes() {
        let rd = Rd {
            addr: 0x8800_0000,
            num_aux_planes: 2,
            rtt_tree_pp: true,
            s2sz: 40,
        };
        assert_eq!(rd.aux_planes().collect::<Vec<_>>(), vec![Plane::new(1), Plane::new(2)]);
        assert!(rd.needs_aux_unmap());
        assert_eq!(rd.unprotected_base(), Some(0x80_0000_0000));
        assert_eq!(Rd { s2sz: 70, ..rd }.unprotected_base(), None);

        let rd = Rd { rtt_tree_pp: false, ..rd };
        assert!(!rd.needs_aux_unmap());
    }

    #[test]
    fn tree_choice_follows_monitor() {
        let params = RealmParams {
            num_aux_planes: 1,
            ..Default::default()
        };
        assert!(params.resolve(&features(RTT_PLANE_AUX_PER_PLANE)).rtt_tree_pp());
        assert!(!params.resolve(&features(RTT_PLANE_AUX_ANY)).rtt_tree_pp());

        let forced = RealmParams {
            rtt_tree: RttTree::PerPlane,
            ..params
        };
        assert!(forced.resolve(&features(RTT_PLANE_AUX_ANY)).rtt_tree_pp());
    }

    #[test]
    fn params_from_json() {
        let params: RealmParams =
            serde_json::from_str(r#"{ "num_aux_planes": 1, "data": [{ "ipa": 4096, "size": 4096 }] }"#)
                .unwrap();
        assert_eq!(params.s2sz, DEFAULT_S2SZ);
        assert_eq!(params.num_recs, 1);
        assert_eq!(params.data, vec![Region { ipa: 0x1000, size: 0x1000 }]);
        assert!(params.validate().is_ok());

        let too_many = RealmParams {
            num_aux_planes: MAX_AUX_PLANES + 1,
            ..params
        };
        assert_eq!(too_many.validate(), Err(Error::RmiErrorInput));
    }

    #[test]
    fn ipa_width_is_bounded() {
        for s2sz in [MIN_S2SZ - 1, MAX_S2SZ + 1, 70, u8::MAX] {
            let params = RealmParams {
                s2sz,
                ..Default::default()
            };
            assert_eq!(params.validate(), Err(Error::RmiErrorInput), "s2sz {}", s2sz);
        }
        let widest = RealmParams {
            s2sz: MAX_S2SZ,
            ..Default::default()
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn support_follows_monitor() {
        let params = RealmParams {
            num_aux_planes: 1,
            ..Default::default()
        };
        // features() reports s2sz 0
        assert!(!params.supported_by(&features(RTT_PLANE_AUX_ANY)));

        let mut reg = FeatureReg0::new(0);
        reg.set_masked_value(FeatureReg0::S2SZ, 48)
            .set_masked_value(FeatureReg0::MAX_NUM_AUX_PLANES, 1)
            .set_masked_value(FeatureReg0::RTT_PLANE, RTT_PLANE_AUX_SINGLE);
        let single_only = Features::from(reg.get());

        assert!(params.supported_by(&single_only));
        let per_plane = RealmParams {
            rtt_tree: RttTree::PerPlane,
            ..params.clone()
        };
        assert!(!per_plane.supported_by(&single_only));
        let two_planes = RealmParams {
            num_aux_planes: 2,
            ..params
        };
        assert!(!two_planes.supported_by(&single_only));
    }
}
