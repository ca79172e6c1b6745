//! Testing utilities: tracing setup and synthetic plates.

#![allow(dead_code)]

use common::buffer2::Buffer2;
use glam::Vec2;
use rand::prelude::*;

use crate::config::GridFormat;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Layout and appearance of a generated plate.
#[derive(Debug, Clone)]
pub struct PlateConfig {
    pub format: GridFormat,
    pub width: usize,
    pub height: usize,
    /// Center of cell (1, 1).
    pub first: Vec2,
    pub spacing: Vec2,
    pub colony_radius: f32,
    pub background: f32,
    pub colony: f32,
    /// Background increase from the left edge to the right edge.
    pub gradient: f32,
    pub noise_sigma: f32,
    pub seed: u64,
    /// 1-based `(row, col)` positions left empty.
    pub empty_cells: Vec<(usize, usize)>,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            format: GridFormat::new(4, 6),
            width: 160,
            height: 120,
            first: Vec2::new(30.0, 30.0),
            spacing: Vec2::new(20.0, 20.0),
            colony_radius: 6.0,
            background: 0.2,
            colony: 0.8,
            gradient: 0.0,
            noise_sigma: 0.0,
            seed: 7,
            empty_cells: Vec::new(),
        }
    }
}

impl PlateConfig {
    /// True center of every cell, row-major.
    pub fn centers(&self) -> Vec<Vec2> {
        (0..self.format.nrow)
            .flat_map(|r| {
                (0..self.format.ncol).map(move |c| {
                    self.first + Vec2::new(c as f32 * self.spacing.x, r as f32 * self.spacing.y)
                })
            })
            .collect()
    }

    /// Same plate with every colony radius scaled, for later timepoints.
    pub fn grown(&self, factor: f32) -> Self {
        Self {
            colony_radius: self.colony_radius * factor,
            ..self.clone()
        }
    }
}

/// Render a plate: flat agar with a horizontal lighting gradient and a disc
/// per occupied cell.
pub fn synthetic_plate(config: &PlateConfig) -> Buffer2<f32> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let centers: Vec<(usize, Vec2)> = config
        .centers()
        .into_iter()
        .enumerate()
        .filter(|(i, _)| {
            let row = i / config.format.ncol + 1;
            let col = i % config.format.ncol + 1;
            !config.empty_cells.contains(&(row, col))
        })
        .collect();

    let r2 = config.colony_radius * config.colony_radius;
    let span = (config.width.max(2) - 1) as f32;
    Buffer2::from_fn(config.width, config.height, |x, y| {
        let p = Vec2::new(x as f32, y as f32);
        let mut value = config.background + config.gradient * x as f32 / span;
        if config.colony_radius > 0.0 && centers.iter().any(|(_, c)| p.distance_squared(*c) <= r2) {
            value = config.colony;
        }
        if config.noise_sigma > 0.0 {
            value += config.noise_sigma * (rng.random::<f32>() - 0.5) * 2.0;
        }
        value.clamp(0.0, 1.0)
    })
}
