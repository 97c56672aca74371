#![allow(dead_code)]

use labelspace::rle::Mask;
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Masks up to 24x24, including degenerate zero-sized ones.
pub fn arb_mask() -> impl Strategy<Value = Mask> {
    (0usize..24, 0usize..24).prop_flat_map(|(height, width)| {
        proptest::collection::vec(any::<bool>(), height * width)
            .prop_map(move |data| Mask::new(height, width, data).expect("sized to fit"))
    })
}

/// Masks made of a few large blocks, so runs span several columns.
pub fn arb_blocky_mask() -> impl Strategy<Value = Mask> {
    (1usize..64, 1usize..64, proptest::collection::vec((0usize..64, 0usize..64, 1usize..32, 1usize..32), 0..4))
        .prop_map(|(height, width, blocks)| {
            let mut mask = Mask::empty(height, width);
            for (top, left, h, w) in blocks {
                for row in top..(top + h).min(height) {
                    for col in left..(left + w).min(width) {
                        mask.set(row, col, true);
                    }
                }
            }
            mask
        })
}

/// Alternating run lengths as produced by the mask scanner.
pub fn arb_runs() -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::vec(0u32..200_000, 0..40)
}
