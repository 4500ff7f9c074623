//! Reference cell/food world behind the `Engine` trait.

use crate::engine::canvas::{Canvas, Glyph};
use crate::engine::genes::Genes;
use crate::error::EngineError;
use crate::model::{Camera, ReproductionMethod};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt::Write as _;

/// Side of the square buckets used to pair mates in sexual reproduction.
const MATING_BUCKET: f64 = 100.0;
const STARTING_FOOD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    pub reproduction: ReproductionMethod,
    /// Empty food slots regrow with probability `1 / food_density` per step.
    pub food_density: u32,
    pub width: u32,
    pub height: u32,
    pub cell_number: u32,
    pub food_spacing: u32,
    pub reproduction_cooldown: u32,
    pub mutation_chance: f64,
    pub mutation_percent_change: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            reproduction: ReproductionMethod::Asexual,
            food_density: 240,
            width: 1_600,
            height: 1_600,
            cell_number: 12,
            food_spacing: 40,
            reproduction_cooldown: 200,
            mutation_chance: 0.01,
            mutation_percent_change: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub genes: Genes,
    pub stored_food: f64,
    pub reproduction_cooldown: u32,
    pub gestation_remaining: u32,
    child_genes: Option<Genes>,
    alive: bool,
}

impl Cell {
    fn new(genes: Genes, x: f64, y: f64, stored_food: f64, config: &WorldConfig) -> Self {
        Self {
            x,
            y,
            heading: 0.0,
            genes,
            stored_food,
            reproduction_cooldown: config.reproduction_cooldown,
            gestation_remaining: 0,
            child_genes: None,
            alive: true,
        }
    }

    pub fn fullness(&self) -> f64 {
        (self.stored_food / self.genes.stomach_size).clamp(0.0, 1.0)
    }

    fn ready_to_reproduce(&self) -> bool {
        self.alive
            && self.reproduction_cooldown == 0
            && self.gestation_remaining == 0
            && self.fullness() >= 0.5
    }

    fn start_reproduction(&mut self, mate: &Genes, config: &WorldConfig, rng: &mut StdRng) {
        let child = self.genes.mix(mate, config, rng);
        self.gestation_remaining = child.steps_until_child_born.round().max(1.0) as u32;
        self.child_genes = Some(child);
        self.reproduction_cooldown = config.reproduction_cooldown;
    }
}

/// Summary row used by batch runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorldStats {
    pub population: usize,
    pub percent_food_available: f64,
    pub avg_size: f64,
    pub avg_flagellum_size: f64,
    pub avg_stomach_size: f64,
    pub avg_gestation_steps: f64,
}

pub struct World {
    config: WorldConfig,
    steps: u64,
    cells: Vec<Cell>,
    /// `food[col][row]`; lattice point `(col, row)` sits at `((col + 1) * spacing, (row + 1) * spacing)`.
    food: Vec<Vec<bool>>,
    rng: StdRng,
}

impl World {
    pub fn new(config: WorldConfig, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let cells = (0..config.cell_number)
            .map(|_| {
                let genes = Genes::random(&mut rng);
                let x = rng.gen_range(0.0..config.width as f64);
                let y = rng.gen_range(0.0..config.height as f64);
                let mut cell = Cell::new(genes, x, y, STARTING_FOOD, &config);
                cell.heading = rng.gen_range(0.0..2.0 * PI);
                cell
            })
            .collect();
        let spacing = config.food_spacing.max(1);
        let food = vec![vec![true; (config.height / spacing) as usize]; (config.width / spacing) as usize];
        Self {
            config,
            steps: 0,
            cells,
            food,
            rng,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut WorldConfig {
        &mut self.config
    }

    #[cfg(test)]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    #[cfg(test)]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn step(&mut self) -> Result<(), EngineError> {
        self.steps += 1;
        self.regrow_food();

        let config = self.config;
        let spacing = config.food_spacing.max(1) as f64;
        let mut waiting_mates: HashMap<(i64, i64), usize> = HashMap::new();
        let mut births = Vec::new();

        for idx in 0..self.cells.len() {
            if !self.cells[idx].alive {
                continue;
            }
            self.swim(idx);
            self.eat(idx, spacing);

            let cell = &mut self.cells[idx];
            let upkeep = (cell.genes.size / 30.0) * 0.02 + cell.genes.flagellum_size * 0.004;
            cell.stored_food -= upkeep;
            if cell.stored_food <= 0.0 {
                cell.alive = false;
                continue;
            }
            cell.reproduction_cooldown = cell.reproduction_cooldown.saturating_sub(1);

            if self.cells[idx].ready_to_reproduce() {
                match config.reproduction {
                    ReproductionMethod::Asexual => {
                        let own = self.cells[idx].genes;
                        self.cells[idx].start_reproduction(&own, &config, &mut self.rng);
                    }
                    ReproductionMethod::Sexual => {
                        let cell = &self.cells[idx];
                        let bucket = (
                            (cell.x / MATING_BUCKET).floor() as i64,
                            (cell.y / MATING_BUCKET).floor() as i64,
                        );
                        match waiting_mates.remove(&bucket) {
                            Some(mate) if self.cells[mate].ready_to_reproduce() => {
                                let genes = self.cells[idx].genes;
                                self.cells[mate].start_reproduction(&genes, &config, &mut self.rng);
                            }
                            _ => {
                                waiting_mates.insert(bucket, idx);
                            }
                        }
                    }
                }
            }

            let cell = &mut self.cells[idx];
            if cell.gestation_remaining > 0 {
                cell.gestation_remaining -= 1;
                if cell.gestation_remaining == 0 {
                    if let Some(genes) = cell.child_genes.take() {
                        cell.stored_food /= 2.0;
                        let mut child =
                            Cell::new(genes, cell.x, cell.y, cell.stored_food, &config);
                        child.heading = cell.heading + PI;
                        births.push(child);
                    }
                }
            }
        }

        self.cells.retain(|c| c.alive);
        self.cells.extend(births);

        if let Some(bad) = self
            .cells
            .iter()
            .position(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(EngineError::Runtime(format!(
                "cell {bad} left the world at step {}",
                self.steps
            )));
        }
        Ok(())
    }

    fn regrow_food(&mut self) {
        let chance = 1.0 / self.config.food_density.max(1) as f64;
        for column in self.food.iter_mut() {
            for slot in column.iter_mut() {
                if !*slot && self.rng.gen::<f64>() < chance {
                    *slot = true;
                }
            }
        }
    }

    fn swim(&mut self, idx: usize) {
        let (w, h) = (self.config.width as f64, self.config.height as f64);
        let turn = self.rng.gen_range(-0.3..0.3);
        let cell = &mut self.cells[idx];
        cell.heading = (cell.heading + turn).rem_euclid(2.0 * PI);
        let speed = cell.genes.flagellum_size * 30.0 / cell.genes.size.max(1.0);
        cell.x += cell.heading.cos() * speed;
        cell.y += cell.heading.sin() * speed;
        if cell.x < 0.0 || cell.x > w {
            cell.x = cell.x.clamp(0.0, w);
            cell.heading = PI - cell.heading;
        }
        if cell.y < 0.0 || cell.y > h {
            cell.y = cell.y.clamp(0.0, h);
            cell.heading = -cell.heading;
        }
    }

    fn eat(&mut self, idx: usize, spacing: f64) {
        let cell = &mut self.cells[idx];
        let reach = cell.genes.size;
        let lo_col = ((cell.x - reach) / spacing - 1.0).floor().max(0.0) as usize;
        let hi_col = ((cell.x + reach) / spacing - 1.0).ceil().max(0.0) as usize;
        let lo_row = ((cell.y - reach) / spacing - 1.0).floor().max(0.0) as usize;
        let hi_row = ((cell.y + reach) / spacing - 1.0).ceil().max(0.0) as usize;

        for col in lo_col..=hi_col.min(self.food.len().saturating_sub(1)) {
            let column = &mut self.food[col];
            for row in lo_row..=hi_row.min(column.len().saturating_sub(1)) {
                if cell.stored_food >= cell.genes.stomach_size {
                    return;
                }
                let fx = (col + 1) as f64 * spacing;
                let fy = (row + 1) as f64 * spacing;
                if column[row] && (fx - cell.x).hypot(fy - cell.y) <= reach {
                    column[row] = false;
                    cell.stored_food = (cell.stored_food + 1.0).min(cell.genes.stomach_size);
                }
            }
        }
    }

    pub fn stats(&self) -> WorldStats {
        let total_slots: usize = self.food.iter().map(Vec::len).sum();
        let available: usize = self
            .food
            .iter()
            .map(|c| c.iter().filter(|f| **f).count())
            .sum();
        let percent_food_available = if total_slots == 0 {
            0.0
        } else {
            available as f64 / total_slots as f64 * 100.0
        };
        let n = self.cells.len();
        let avg = |f: fn(&Genes) -> f64| {
            if n == 0 {
                0.0
            } else {
                self.cells.iter().map(|c| f(&c.genes)).sum::<f64>() / n as f64
            }
        };
        WorldStats {
            population: n,
            percent_food_available,
            avg_size: avg(|g| g.size),
            avg_flagellum_size: avg(|g| g.flagellum_size),
            avg_stomach_size: avg(|g| g.stomach_size),
            avg_gestation_steps: avg(|g| g.steps_until_child_born),
        }
    }

    pub fn render(&self, canvas: &mut Canvas, camera: &Camera) {
        canvas.clear();
        let spacing = self.config.food_spacing.max(1) as f64;
        for (col, column) in self.food.iter().enumerate() {
            for (row, has_food) in column.iter().enumerate() {
                if *has_food {
                    let (c, r) = Canvas::project(
                        camera,
                        (col + 1) as f64 * spacing,
                        (row + 1) as f64 * spacing,
                    );
                    canvas.put(c, r, Glyph::Food);
                }
            }
        }

        let (w, h) = (self.config.width as f64, self.config.height as f64);
        let (left, top) = Canvas::project(camera, 0.0, 0.0);
        let (right, bottom) = Canvas::project(camera, w, h);
        // Only walk the part of the border that can land on the canvas.
        let vp = canvas.viewport();
        for c in left.max(0)..=right.min(vp.width as i64) {
            canvas.put(c, top, Glyph::Border);
            canvas.put(c, bottom, Glyph::Border);
        }
        for r in top.max(0)..=bottom.min(vp.height as i64) {
            canvas.put(left, r, Glyph::Border);
            canvas.put(right, r, Glyph::Border);
        }

        for cell in &self.cells {
            let (c, r) = Canvas::project(camera, cell.x, cell.y);
            let glyph = if cell.gestation_remaining > 0 {
                Glyph::Gravid
            } else {
                Glyph::Cell
            };
            canvas.put(c, r, glyph);
        }
    }

    /// Per-cell CSV dump followed by a row of averages.
    pub fn cells_csv(&self) -> String {
        let mut out = format!(
            "Step #{}\nCell #,x,y,size,flagellum size,stomach size,steps until child born",
            self.steps
        );
        for (i, cell) in self.cells.iter().enumerate() {
            let g = &cell.genes;
            let _ = write!(
                out,
                "\n{},{:.0},{:.0},{},{},{},{}",
                i,
                cell.x,
                cell.y,
                g.size,
                g.flagellum_size,
                g.stomach_size,
                g.steps_until_child_born
            );
        }
        let stats = self.stats();
        let _ = write!(
            out,
            "\nAVERAGE,,,{},{},{},{}",
            stats.avg_size, stats.avg_flagellum_size, stats.avg_stomach_size, stats.avg_gestation_steps
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Viewport;

    fn small_world(seed: u64) -> World {
        World::new(
            WorldConfig {
                width: 400,
                height: 400,
                cell_number: 4,
                ..WorldConfig::default()
            },
            Some(seed),
        )
    }

    #[test]
    fn same_seed_gives_same_history() {
        let mut a = small_world(42);
        let mut b = small_world(42);
        for _ in 0..300 {
            a.step().unwrap();
            b.step().unwrap();
        }
        assert_eq!(a.cells_csv(), b.cells_csv());
        assert_eq!(a.steps(), 300);
    }

    #[test]
    fn cells_stay_inside_the_world() {
        let mut world = small_world(3);
        for _ in 0..500 {
            world.step().unwrap();
        }
        for cell in world.cells() {
            assert!((0.0..=400.0).contains(&cell.x));
            assert!((0.0..=400.0).contains(&cell.y));
        }
    }

    #[test]
    fn snapshot_csv_has_header_rows_and_average() {
        let world = small_world(5);
        let csv = world.cells_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Step #0");
        assert!(lines[1].starts_with("Cell #,x,y,size"));
        assert_eq!(lines.len(), 2 + 4 + 1);
        assert!(lines.last().unwrap().starts_with("AVERAGE,,,"));
    }

    #[test]
    fn fresh_world_is_fully_stocked() {
        let world = small_world(9);
        let stats = world.stats();
        assert_eq!(stats.population, 4);
        assert_eq!(stats.percent_food_available, 100.0);
    }

    #[test]
    fn render_draws_border_food_and_cells() {
        let world = small_world(1);
        let mut canvas = Canvas::new(Viewport {
            width: 30,
            height: 14,
        });
        world.render(&mut canvas, &Camera::default());
        let text = canvas.to_lines().join("\n");
        assert!(text.contains('#'));
        assert!(text.contains('·'));
        assert!(text.contains('o') || text.contains('@'));
    }
}
