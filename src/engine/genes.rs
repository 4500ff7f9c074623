use crate::engine::world::WorldConfig;
use rand::Rng;

/// Heritable traits of a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Genes {
    pub size: f64,
    pub flagellum_size: f64,
    pub stomach_size: f64,
    pub steps_until_child_born: f64,
}

impl Genes {
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            size: 27.0 + rng.gen_range(0..6) as f64,
            stomach_size: 9.0 + rng.gen_range(0..2) as f64,
            flagellum_size: 4.5 + rng.gen::<f64>(),
            steps_until_child_born: 195.0 + rng.gen_range(0..10) as f64,
        }
    }

    /// Pick each trait from either parent, occasionally mutating it.
    pub fn mix(&self, other: &Self, config: &WorldConfig, rng: &mut impl Rng) -> Self {
        let size = pick_with_mutation(self.size, other.size, config, rng);
        Self {
            size,
            // stomach never outgrows the cell
            stomach_size: pick_with_mutation(self.stomach_size, other.stomach_size, config, rng)
                .min(size),
            flagellum_size: pick_with_mutation(
                self.flagellum_size,
                other.flagellum_size,
                config,
                rng,
            ),
            steps_until_child_born: pick_with_mutation(
                self.steps_until_child_born,
                other.steps_until_child_born,
                config,
                rng,
            ),
        }
    }
}

fn pick_with_mutation(a: f64, b: f64, config: &WorldConfig, rng: &mut impl Rng) -> f64 {
    let mut chosen = if rng.gen_bool(0.5) { a } else { b };
    if rng.gen::<f64>() < config.mutation_chance {
        let sign = if rng.gen_bool(0.5) { -1.0 } else { 1.0 };
        chosen += sign * ((a + b) / 2.0) * config.mutation_percent_change;
    }
    chosen.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn mixed_traits_come_from_a_parent_without_mutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = WorldConfig {
            mutation_chance: 0.0,
            ..WorldConfig::default()
        };
        let a = Genes::random(&mut rng);
        let b = Genes::random(&mut rng);
        for _ in 0..50 {
            let child = a.mix(&b, &config, &mut rng);
            assert!(child.size == a.size || child.size == b.size);
            assert!(
                child.flagellum_size == a.flagellum_size
                    || child.flagellum_size == b.flagellum_size
            );
            assert!(child.stomach_size <= child.size);
        }
    }

    #[test]
    fn mutation_shifts_by_the_configured_fraction() {
        let mut rng = StdRng::seed_from_u64(11);
        let config = WorldConfig {
            mutation_chance: 1.0,
            mutation_percent_change: 0.1,
            ..WorldConfig::default()
        };
        let g = Genes {
            size: 30.0,
            flagellum_size: 5.0,
            stomach_size: 10.0,
            steps_until_child_born: 200.0,
        };
        let child = g.mix(&g, &config, &mut rng);
        assert!((child.size - 27.0).abs() < 1e-9 || (child.size - 33.0).abs() < 1e-9);
    }
}
