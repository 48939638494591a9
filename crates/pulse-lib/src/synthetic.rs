//! Seeded synthetic day history for demos and scenario tests.
//!
//! Each day draws SDNN ~ 42 +- 8, RMSSD ~ 35 +- 7 and pNN50 ~ 18 +- 5 ms,
//! modulated by a weekly and a monthly cycle. The fatigue label loosely
//! tracks how far the day sits below those centres.

use crate::metrics::DailyRecord;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

/// 2023-11-14T22:13:20Z, the first synthetic day.
pub const SYNTHETIC_EPOCH_MS: i64 = 1_700_000_000_000;
const DAY_MS: i64 = 86_400_000;
/// Length of the simulated recording behind each day.
const SESSION_MS: f64 = 300_000.0;

pub fn synthetic_history(days: usize, seed: u64) -> Vec<DailyRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..days).map(|day| synthetic_day(&mut rng, day)).collect()
}

fn synthetic_day(rng: &mut StdRng, day: usize) -> DailyRecord {
    let d = day as f64;
    let weekly = 1.0 + 0.1 * (2.0 * PI * d / 7.0).sin();
    let monthly = 1.0 + 0.05 * (2.0 * PI * d / 30.0).sin();
    let scale = weekly * monthly;

    let sdnn = (42.0 * scale + gaussian(rng) * 8.0).max(15.0);
    let rmssd = (35.0 * scale + gaussian(rng) * 7.0).max(10.0);
    let pnn50 = (18.0 * scale + gaussian(rng) * 5.0).max(2.0);

    let strain = (50.0 - sdnn) * 0.05 + (40.0 - rmssd) * 0.08 + (20.0 - pnn50) * 0.1;
    let fatigue = (3.0 + strain + gaussian(rng) * 0.8).clamp(1.0, 5.0);
    let mean_rr = (850.0 + gaussian(rng) * 40.0).max(500.0);

    DailyRecord {
        timestamp_ms: SYNTHETIC_EPOCH_MS + day as i64 * DAY_MS,
        mean_rr,
        sdnn,
        rmssd,
        pnn50,
        heart_rate: 60_000.0 / mean_rr,
        valid_beats: (SESSION_MS / mean_rr) as usize,
        fatigue_level: fatigue.round() as u8,
    }
}

/// Standard normal draw via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
