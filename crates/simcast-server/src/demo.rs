//! Bundled demo engine: particles bouncing inside a walled rectangle.
//!
//! Placement and velocities come from a seeded [`StdRng`], and reset
//! reseeds it, so every run of an experiment is identical.

use std::any::Any;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use simcast_core::config::DemoConfig;
use simcast_core::engine::{Arena, EngineError, SimulationEngine, Vec3};
use simcast_core::entity::{ConverterRegistry, Entity};

/// Entity kind tag for particles.
pub const PARTICLE_KIND: &str = "particle";
/// Entity kind tag for walls.
pub const WALL_KIND: &str = "wall";

const PARTICLE_RADIUS: f64 = 0.1;
const MAX_SPEED: f64 = 2.0;
const WALL_THICKNESS: f64 = 0.1;

/// A moving disc.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Particle {
    /// Unique id, `particle_<n>`.
    pub id: String,
    /// Centre position.
    pub position: Vec3,
    /// Velocity in units per second.
    pub velocity: Vec3,
    /// Disc radius.
    pub radius: f64,
}

impl Entity for Particle {
    fn kind(&self) -> &str {
        PARTICLE_KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A static box bounding the arena.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wall {
    /// Unique id, `wall_<side>`.
    pub id: String,
    /// Centre position.
    pub position: Vec3,
    /// Extent along each axis.
    pub size: Vec3,
}

impl Entity for Wall {
    fn kind(&self) -> &str {
        WALL_KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Converters for every entity kind the demo engine produces.
pub fn registry() -> ConverterRegistry {
    let mut registry = ConverterRegistry::new();
    registry
        .register_serialize::<Particle>(PARTICLE_KIND)
        .register_serialize::<Wall>(WALL_KIND);
    registry
}

/// The demo simulation.
#[derive(Debug)]
pub struct DemoEngine {
    config: DemoConfig,
    arena: Arena,
    steps: u64,
    particles: Vec<Particle>,
    walls: Vec<Wall>,
}

impl DemoEngine {
    /// Build the engine in its initial condition.
    pub fn new(config: &DemoConfig) -> Self {
        let [x, y, z] = config.arena_size;
        let arena = Arena {
            size: Vec3::new(x, y, z),
            center: Vec3::default(),
        };
        Self {
            particles: spawn_particles(config, &arena),
            walls: build_walls(&arena),
            config: config.clone(),
            arena,
            steps: 0,
        }
    }

    /// Current particles.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn half_extent(&self) -> (f64, f64) {
        (
            self.arena.size.x / 2.0 - PARTICLE_RADIUS,
            self.arena.size.y / 2.0 - PARTICLE_RADIUS,
        )
    }
}

fn spawn_particles(config: &DemoConfig, arena: &Arena) -> Vec<Particle> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let half_x = (arena.size.x / 2.0 - PARTICLE_RADIUS).max(0.0);
    let half_y = (arena.size.y / 2.0 - PARTICLE_RADIUS).max(0.0);

    (0..config.particles)
        .map(|n| Particle {
            id: format!("particle_{n}"),
            position: Vec3::new(
                arena.center.x + sample(&mut rng, half_x),
                arena.center.y + sample(&mut rng, half_y),
                arena.center.z,
            ),
            velocity: Vec3::new(
                sample(&mut rng, MAX_SPEED),
                sample(&mut rng, MAX_SPEED),
                0.0,
            ),
            radius: PARTICLE_RADIUS,
        })
        .collect()
}

/// Uniform sample in `[-bound, bound]`; 0 for a degenerate bound.
fn sample(rng: &mut StdRng, bound: f64) -> f64 {
    if bound > 0.0 {
        rng.random_range(-bound..=bound)
    } else {
        0.0
    }
}

fn build_walls(arena: &Arena) -> Vec<Wall> {
    let Vec3 { x, y, z } = arena.size;
    let center = arena.center;
    let (half_x, half_y) = (x / 2.0, y / 2.0);
    let sides = [
        ("north", Vec3::new(center.x, center.y + half_y, center.z), Vec3::new(x, WALL_THICKNESS, z)),
        ("south", Vec3::new(center.x, center.y - half_y, center.z), Vec3::new(x, WALL_THICKNESS, z)),
        ("east", Vec3::new(center.x + half_x, center.y, center.z), Vec3::new(WALL_THICKNESS, y, z)),
        ("west", Vec3::new(center.x - half_x, center.y, center.z), Vec3::new(WALL_THICKNESS, y, z)),
    ];
    sides
        .into_iter()
        .map(|(side, position, size)| Wall {
            id: format!("wall_{side}"),
            position,
            size,
        })
        .collect()
}

/// Advance one coordinate, reflecting off `[center - half, center + half]`.
fn advance(position: &mut f64, velocity: &mut f64, dt: f64, center: f64, half: f64) {
    if half <= 0.0 {
        *position = center;
        return;
    }
    let mut next = velocity.mul_add(dt, *position);
    if next > center + half {
        next = 2.0f64.mul_add(center + half, -next);
        *velocity = -*velocity;
    } else if next < center - half {
        next = 2.0f64.mul_add(center - half, -next);
        *velocity = -*velocity;
    }
    *position = next.clamp(center - half, center + half);
}

impl SimulationEngine for DemoEngine {
    fn is_finished(&self) -> bool {
        self.config.experiment_length > 0 && self.steps >= self.config.experiment_length
    }

    fn step(&mut self) -> Result<(), EngineError> {
        let dt = 1.0 / self.config.tick_rate;
        if !dt.is_finite() {
            return Err(EngineError::Step {
                message: format!("tick rate {} gives no time step", self.config.tick_rate),
            });
        }
        let (half_x, half_y) = self.half_extent();
        let center = self.arena.center;
        for p in &mut self.particles {
            advance(&mut p.position.x, &mut p.velocity.x, dt, center.x, half_x);
            advance(&mut p.position.y, &mut p.velocity.y, dt, center.y, half_y);
        }
        self.steps = self.steps.saturating_add(1);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.particles = spawn_particles(&self.config, &self.arena);
        self.steps = 0;
        Ok(())
    }

    fn current_step(&self) -> u64 {
        self.steps
    }

    fn tick_rate(&self) -> f64 {
        self.config.tick_rate
    }

    fn arena(&self) -> Arena {
        self.arena
    }

    fn entities(&self) -> Vec<&dyn Entity> {
        self.walls
            .iter()
            .map(|w| w as &dyn Entity)
            .chain(self.particles.iter().map(|p| p as &dyn Entity))
            .collect()
    }
}
