/*
 * Copyright (C) 2023 Asim Ihsan
 * SPDX-License-Identifier: AGPL-3.0-only
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU Affero General Public License as published by the Free
 * Software Foundation, version 3.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A
 * PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License along
 * with this program. If not, see <https://www.gnu.org/licenses/>
 */

use std::path::Path;

use cliff_walking::cliff_world::{CliffWorldConfig, CliffWorldEnvironment, RandomAgent, RenderMode};
use cliff_walking::Simulation;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
struct RunConfig {
    episodes: u32,
    max_steps_per_episode: u32,
    seed: u64,
    environment: CliffWorldConfig,
}

impl RunConfig {
    fn new(
        episodes: u32,
        max_steps_per_episode: u32,
        seed: u64,
        environment: CliffWorldConfig,
    ) -> Self {
        Self {
            episodes,
            max_steps_per_episode,
            seed,
            environment,
        }
    }

    fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(10, 10_000, 42, CliffWorldConfig::default())
    }
}

// Everything logs at info unless RUST_LOG says otherwise, e.g. RUST_LOG=cliff_walking=debug shows
// every reset and cliff fall.
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}

fn init_logging() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    fmt().with_env_filter(log_filter(&directives)).init();
}

// Run a random agent through the cliff walking gridworld and report how each episode went.
//
// Usage: cliff-walking-run-episodes [config.json]
//
// The optional JSON file may set any of the RunConfig fields, the rest keep their defaults.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => RunConfig::load(Path::new(&path))?,
        None => RunConfig::default(),
    };
    info!(?config, "starting");

    let environment = CliffWorldEnvironment::with_config(config.environment);
    let agent = RandomAgent::new(config.seed);
    let mut simulation = Simulation::new(environment, agent, config.max_steps_per_episode);

    for episode in 0..config.episodes {
        let summary = simulation.run_episode()?;
        info!(
            episode,
            steps = summary.steps,
            total_reward = summary.total_reward,
            cliff_falls = simulation.environment().cliff_falls(),
            reached_goal = summary.terminated,
            "episode finished"
        );
        println!("{}", serde_json::to_string(&summary)?);
    }

    simulation.environment().render(RenderMode::Human)?;
    println!("score: {}", simulation.score());
    Ok(())
}
