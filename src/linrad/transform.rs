//! DC bias adjustment applied to every payload before framing

use serde::{Deserialize, Serialize};

use crate::types::Frame;

/// Bit forced on in every 16-bit sample component.
///
/// The radio's three least significant bits are always zero; Linrad treats a
/// fixed non-zero low bit as its liveness marker.
pub const DC_BIAS_BIT: i16 = 8;

const DC_BIAS_PACKED: u32 = 0x0008_0008;

/// Strategy for applying the DC bias adjustment.
///
/// Both strategies set bit value 8 in every I and Q component and produce
/// identical payloads; they differ only in how many words the loop touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DcBias {
    /// OR each 16-bit component separately.
    #[default]
    PerWord,
    /// OR each frame as one packed 32-bit word.
    PerFrame,
}

impl DcBias {
    /// Apply the adjustment in place to every frame.
    pub fn apply(self, frames: &mut [Frame]) {
        match self {
            DcBias::PerWord => {
                for frame in frames.iter_mut() {
                    frame.i |= DC_BIAS_BIT;
                    frame.q |= DC_BIAS_BIT;
                }
            }
            DcBias::PerFrame => {
                for frame in frames.iter_mut() {
                    *frame = Frame::from_packed(frame.packed() | DC_BIAS_PACKED);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frames(raw: &[(i16, i16)]) -> Vec<Frame> {
        raw.iter().map(|&(i, q)| Frame::new(i, q)).collect()
    }

    #[test]
    fn sets_bit_value_eight_on_both_components() {
        let mut payload = frames(&[(0, 0), (-32768, 16), (7, -1), (8, -8)]);
        DcBias::PerWord.apply(&mut payload);
        assert_eq!(payload, frames(&[(8, 8), (-32760, 24), (15, -1), (8, -8)]));
    }

    proptest! {
        #[test]
        fn is_idempotent(raw in prop::collection::vec(any::<(i16, i16)>(), 0..348)) {
            for strategy in [DcBias::PerWord, DcBias::PerFrame] {
                let mut once = frames(&raw);
                strategy.apply(&mut once);
                let mut twice = once.clone();
                strategy.apply(&mut twice);
                prop_assert_eq!(once, twice);
            }
        }

        #[test]
        fn strategies_agree(raw in prop::collection::vec(any::<(i16, i16)>(), 0..348)) {
            let mut per_word = frames(&raw);
            let mut per_frame = frames(&raw);
            DcBias::PerWord.apply(&mut per_word);
            DcBias::PerFrame.apply(&mut per_frame);
            prop_assert_eq!(per_word, per_frame);
        }

        #[test]
        fn only_touches_bit_three(raw in prop::collection::vec(any::<(i16, i16)>(), 1..64)) {
            let mut adjusted = frames(&raw);
            DcBias::PerWord.apply(&mut adjusted);
            for (before, after) in raw.iter().zip(&adjusted) {
                prop_assert_eq!((after.i ^ before.0) & !DC_BIAS_BIT, 0);
                prop_assert_eq!((after.q ^ before.1) & !DC_BIAS_BIT, 0);
                prop_assert!(after.i & DC_BIAS_BIT != 0 && after.q & DC_BIAS_BIT != 0);
            }
        }
    }
}
