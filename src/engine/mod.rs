mod batch;
pub mod canvas;
mod genes;
mod world;

pub use canvas::{Canvas, Glyph};
pub use world::WorldConfig;

use crate::error::EngineError;
use crate::model::{BatchJobConfig, BatchSettings, Camera, ReproductionMethod, Viewport};

/// A loadable engine module. Each call to `initialize` yields an isolated instance.
pub trait EngineModule: Send + Sync + 'static {
    /// `target` is the render target the instance will draw into; `None` for headless work.
    fn initialize(&self, target: Option<Viewport>) -> Result<Box<dyn Engine>, EngineError>;
}

/// One engine instance. Owned by exactly one session or batch worker.
pub trait Engine: Send {
    /// Advance the simulation by one tick.
    fn step(&mut self) -> Result<(), EngineError>;

    fn render(&mut self, target: &mut Canvas, camera: &Camera) -> Result<(), EngineError>;

    /// Serialize the full current state as CSV. Does not mutate state.
    fn export_snapshot(&self) -> String;

    fn set_food_density(&mut self, density: u32);

    fn set_reproduction_method(&mut self, method: ReproductionMethod);

    /// Run an independent simulation to completion and return its exported CSV.
    ///
    /// Progress values are informational; completion is signaled by returning.
    fn run_batch(
        &mut self,
        config: &BatchJobConfig,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<String, EngineError>;
}

/// The built-in cell/food simulation.
#[derive(Debug, Clone)]
pub struct SimModule {
    pub world: WorldConfig,
    pub batch: BatchSettings,
    /// Seed for interactive worlds; batch runs use `batch.seed`.
    pub seed: Option<u64>,
}

impl SimModule {
    pub fn new(world: WorldConfig, batch: BatchSettings) -> Self {
        Self {
            world,
            batch,
            seed: None,
        }
    }
}

impl EngineModule for SimModule {
    fn initialize(&self, target: Option<Viewport>) -> Result<Box<dyn Engine>, EngineError> {
        if let Some(vp) = target {
            if vp.width == 0 || vp.height == 0 {
                return Err(EngineError::Load(format!(
                    "render target has no area ({}x{})",
                    vp.width, vp.height
                )));
            }
        }
        if self.world.food_spacing == 0 || self.world.width == 0 || self.world.height == 0 {
            return Err(EngineError::Load("world dimensions must be non-zero".into()));
        }
        Ok(Box::new(SimEngine {
            world: world::World::new(self.world, self.seed),
            batch: self.batch,
        }))
    }
}

struct SimEngine {
    world: world::World,
    batch: BatchSettings,
}

impl Engine for SimEngine {
    fn step(&mut self) -> Result<(), EngineError> {
        self.world.step()
    }

    fn render(&mut self, target: &mut Canvas, camera: &Camera) -> Result<(), EngineError> {
        if target.is_empty() {
            return Err(EngineError::Runtime("render target has no area".into()));
        }
        self.world.render(target, camera);
        Ok(())
    }

    fn export_snapshot(&self) -> String {
        self.world.cells_csv()
    }

    fn set_food_density(&mut self, density: u32) {
        self.world.config_mut().food_density = density.max(1);
    }

    fn set_reproduction_method(&mut self, method: ReproductionMethod) {
        self.world.config_mut().reproduction = method;
    }

    fn run_batch(
        &mut self,
        config: &BatchJobConfig,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<String, EngineError> {
        batch::run_batch(self.world.config(), &self.batch, config, on_progress)
    }
}
