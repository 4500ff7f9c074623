//! Self-contained batch runs: replicate worlds averaged into one CSV.

use crate::engine::world::{World, WorldConfig, WorldStats};
use crate::error::EngineError;
use crate::model::{BatchJobConfig, BatchSettings};
use std::fmt::Write as _;

pub const RESULTS_HEADER: &str = "Step #,Population Size,% Food Available,Avg. Size,Avg. Flagellum Size,Avg. Stomach Size,Avg. Gestation Steps";

/// Spreads replicate seeds so worlds sharing a base seed still diverge.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Run one batch job to completion and return its results CSV.
///
/// `on_progress` receives whole percentages, non-decreasing, at most once per value.
pub fn run_batch(
    base: &WorldConfig,
    settings: &BatchSettings,
    job: &BatchJobConfig,
    on_progress: &mut dyn FnMut(u8),
) -> Result<String, EngineError> {
    if settings.simulations == 0 {
        return Err(EngineError::Runtime(
            "batch needs at least one simulation".into(),
        ));
    }
    if settings.samples == 0 {
        return Err(EngineError::Runtime("batch needs at least one sample".into()));
    }

    let config = WorldConfig {
        reproduction: job.reproduction_method,
        food_density: job.beginning_food_density,
        ..*base
    };
    let mut worlds: Vec<World> = (0..settings.simulations)
        .map(|i| {
            let seed = settings
                .seed
                .map(|s| s.wrapping_add(SEED_STRIDE.wrapping_mul(i as u64 + 1)));
            World::new(config, seed)
        })
        .collect();

    let mut out = String::from(RESULTS_HEADER);
    let mut last_percent = None;

    for sample in 0..settings.samples {
        let mut totals = WorldStats::default();
        for world in worlds.iter_mut() {
            if sample == settings.switch_at_sample {
                world.config_mut().food_density = job.switched_food_density;
            }
            for _ in 0..settings.steps_per_sample {
                world.step()?;
            }
            let s = world.stats();
            totals.population += s.population;
            totals.percent_food_available += s.percent_food_available;
            totals.avg_size += s.avg_size;
            totals.avg_flagellum_size += s.avg_flagellum_size;
            totals.avg_stomach_size += s.avg_stomach_size;
            totals.avg_gestation_steps += s.avg_gestation_steps;
        }

        let n = settings.simulations as f64;
        let _ = write!(
            out,
            "\n{},{},{},{},{},{},{}",
            (sample + 1) * settings.steps_per_sample,
            totals.population as f64 / n,
            totals.percent_food_available / n,
            totals.avg_size / n,
            totals.avg_flagellum_size / n,
            totals.avg_stomach_size / n,
            totals.avg_gestation_steps / n,
        );

        let percent = ((sample + 1) * 100 / settings.samples) as u8;
        if last_percent != Some(percent) {
            on_progress(percent);
            last_percent = Some(percent);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReproductionMethod;

    fn tiny() -> (WorldConfig, BatchSettings) {
        let base = WorldConfig {
            width: 400,
            height: 400,
            cell_number: 4,
            ..WorldConfig::default()
        };
        let settings = BatchSettings {
            simulations: 2,
            samples: 4,
            steps_per_sample: 10,
            switch_at_sample: 2,
            seed: Some(1),
        };
        (base, settings)
    }

    #[test]
    fn one_row_per_sample_with_step_numbers() {
        let (base, settings) = tiny();
        let job = BatchJobConfig::new(ReproductionMethod::Asexual, 240, 600);
        let mut reports = Vec::new();
        let csv = run_batch(&base, &settings, &job, &mut |p| reports.push(p)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], RESULTS_HEADER);
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("10,"));
        assert!(lines[4].starts_with("40,"));
        assert_eq!(reports, vec![25, 50, 75, 100]);
    }

    #[test]
    fn progress_is_reported_once_per_percent() {
        let (base, mut settings) = tiny();
        settings.samples = 250;
        settings.steps_per_sample = 1;
        let job = BatchJobConfig::new(ReproductionMethod::Sexual, 240, 240);
        let mut reports = Vec::new();
        run_batch(&base, &settings, &job, &mut |p| reports.push(p)).unwrap();
        assert!(reports.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(reports.last(), Some(&100));
    }

    #[test]
    fn seeded_batches_are_reproducible() {
        let (base, settings) = tiny();
        let job = BatchJobConfig::new(ReproductionMethod::Sexual, 120, 480);
        let a = run_batch(&base, &settings, &job, &mut |_| {}).unwrap();
        let b = run_batch(&base, &settings, &job, &mut |_| {}).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_workload_is_rejected() {
        let (base, mut settings) = tiny();
        settings.simulations = 0;
        let job = BatchJobConfig::new(ReproductionMethod::Asexual, 1, 1);
        assert!(matches!(
            run_batch(&base, &settings, &job, &mut |_| {}),
            Err(EngineError::Runtime(_))
        ));
    }
}
