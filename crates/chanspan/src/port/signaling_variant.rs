// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Signaling-variant tag set (spec §6.2).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingVariant {
    FxsLs,
    FxsGs,
    FxsKs,
    FxoLs,
    FxoGs,
    FxoKs,
    Em,
    EmE1,
    EmWink,
    Featd,
    Featdmf,
    FeatdmfTa,
    Featb,
    E911,
    FgcCama,
    FgcCamamf,
    Sf,
    SfWink,
    SfFeatd,
    SfFeatdmf,
    SfFeatb,
    Pri,
    Bri,
    BriPtmp,
    Ss7,
    Gr303Fxoks,
    Gr303Fxsks,
    Pseudo,
}

impl SignalingVariant {
    pub fn from_config_key(s: &str) -> Option<Self> {
        use SignalingVariant::*;
        Some(match s.to_lowercase().as_str() {
            "fxs_ls" | "fxsls" => FxsLs,
            "fxs_gs" | "fxsgs" => FxsGs,
            "fxs_ks" | "fxsks" => FxsKs,
            "fxo_ls" | "fxols" => FxoLs,
            "fxo_gs" | "fxogs" => FxoGs,
            "fxo_ks" | "fxoks" => FxoKs,
            "em" => Em,
            "em_e1" => EmE1,
            "em_w" | "em_wink" => EmWink,
            "featd" => Featd,
            "featdmf" => Featdmf,
            "featdmf_ta" => FeatdmfTa,
            "featb" => Featb,
            "e911" => E911,
            "fgccama" => FgcCama,
            "fgccamamf" => FgcCamamf,
            "sf" => Sf,
            "sf_w" | "sf_wink" => SfWink,
            "sf_featd" => SfFeatd,
            "sf_featdmf" => SfFeatdmf,
            "sf_featb" => SfFeatb,
            "pri_cpe" | "pri_net" | "pri" => Pri,
            "bri_cpe" | "bri_net" | "bri" => Bri,
            "bri_cpe_ptmp" | "bri_ptmp" => BriPtmp,
            "ss7" => Ss7,
            "gr303fxoks" => Gr303Fxoks,
            "gr303fxsks" => Gr303Fxsks,
            "pseudo" => Pseudo,
            _ => return None,
        })
    }

    pub fn is_fxs(self) -> bool {
        matches!(self, Self::FxsLs | Self::FxsGs | Self::FxsKs | Self::Gr303Fxsks)
    }

    pub fn is_fxo(self) -> bool {
        matches!(self, Self::FxoLs | Self::FxoGs | Self::FxoKs | Self::Gr303Fxoks)
    }

    pub fn is_pri(self) -> bool {
        matches!(self, Self::Pri | Self::Bri | Self::BriPtmp)
    }

    pub fn is_ss7(self) -> bool {
        matches!(self, Self::Ss7)
    }

    pub fn is_digital(self) -> bool {
        self.is_pri() || self.is_ss7()
    }

    /// Analog lines that run through the feature-group/MF digit-collection
    /// path rather than plain DTMF (spec §4.8 "Feature Group D / MF
    /// variants / E911").
    pub fn is_mf_feature_group(self) -> bool {
        matches!(
            self,
            Self::Featd
                | Self::Featdmf
                | Self::FeatdmfTa
                | Self::Featb
                | Self::E911
                | Self::FgcCama
                | Self::FgcCamamf
                | Self::Sf
                | Self::SfWink
                | Self::SfFeatd
                | Self::SfFeatdmf
                | Self::SfFeatb
        )
    }
}
