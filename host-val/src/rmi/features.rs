use crate::rmi::error::Error;
use crate::rmi::Monitor;

use armv9a::define_bits;

define_bits!(
    FeatureReg0,
    RTT_S2AP_INDIRECT[51 - 51],
    RTT_PLANE[50 - 49],
    MAX_NUM_AUX_PLANES[48 - 45],
    GICV3_NUM_LRS[37 - 34],
    MAX_RECS_ORDER[33 - 30],
    HASH_SHA_512[29 - 29],
    HASH_SHA_256[28 - 28],
    PMU_NUM_CTRS[27 - 23],
    PMU_EN[22 - 22],
    NUM_WPS[21 - 18],
    NUM_BPS[17 - 14],
    SVE_VL[13 - 10],
    SVE_EN[9 - 9],
    LPA2[8 - 8],
    S2SZ[7 - 0]
);

pub const FEATURE_REGISTER_0_INDEX: usize = 0;

// RTT_PLANE: how auxiliary planes may be translated
pub const RTT_PLANE_AUX_SINGLE: u64 = 0;
pub const RTT_PLANE_AUX_PER_PLANE: u64 = 1;
pub const RTT_PLANE_AUX_ANY: u64 = 2;

#[derive(Clone, Copy, Debug)]
pub struct Features(FeatureReg0);

impl Features {
    pub fn query<M: Monitor + ?Sized>(monitor: &mut M) -> Result<Self, Error> {
        let reg = monitor.features(FEATURE_REGISTER_0_INDEX)?;
        debug!("RMI_FEATURES[0]: {:#X}", reg);
        Ok(Self(FeatureReg0::new(reg)))
    }

    pub fn max_aux_planes(&self) -> usize {
        self.0.get_masked_value(FeatureReg0::MAX_NUM_AUX_PLANES) as usize
    }

    pub fn supports_planes(&self) -> bool {
        self.max_aux_planes() > 0
    }

    /// All planes may share the primary RTT tree.
    pub fn supports_rtt_tree_single(&self) -> bool {
        matches!(
            self.0.get_masked_value(FeatureReg0::RTT_PLANE),
            RTT_PLANE_AUX_SINGLE | RTT_PLANE_AUX_ANY
        )
    }

    /// Every auxiliary plane may own its RTT tree.
    pub fn supports_rtt_tree_per_plane(&self) -> bool {
        matches!(
            self.0.get_masked_value(FeatureReg0::RTT_PLANE),
            RTT_PLANE_AUX_PER_PLANE | RTT_PLANE_AUX_ANY
        )
    }

    pub fn s2sz(&self) -> u8 {
        self.0.get_masked_value(FeatureReg0::S2SZ) as u8
    }
}

impl From<u64> for Features {
    fn from(reg: u64) -> Self {
        Self(FeatureReg0::new(reg))
    }
}
