//! Per-worker random streams.
//!
//! Each search worker owns one `StdRng`, seeded from the run's master seed
//! and the worker index. Workers never share a generator, so a run with the
//! same seed and worker count replays exactly, threaded or not.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seed for worker `worker` of a run seeded with `master`.
///
/// SplitMix64 finalizer over the master seed offset by the worker index;
/// neighboring workers get unrelated streams.
pub const fn worker_seed(master: u64, worker: usize) -> u64 {
    let mut z = master.wrapping_add((worker as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub fn worker_rng(master: u64, worker: usize) -> StdRng {
    StdRng::seed_from_u64(worker_seed(master, worker))
}
