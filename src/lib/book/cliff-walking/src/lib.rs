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

#![warn(missing_docs)]

//! Episodic environments for reinforcement learning agents.
//!
//! The Agent and the Environment only meet inside a Simulation. An Agent turns an Observation into
//! an Action, and an Environment turns an Action into the next Observation plus a reward.
//!
//! See:
//! -  Chapter 22: Reinforcement Learning, and Sutton & Barto Example 6.6 (Cliff Walking).

use num_traits::Zero;
use rustc_hash::FxHashMap;
use serde::Serialize;

pub mod cliff_world;

/// Extra diagnostic values attached to a Step, keyed by name. Usually empty.
pub type Info = FxHashMap<String, serde_json::Value>;

/// The result of a single timestep in an Environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step<_Observation, _Reward> {
    /// What the Agent sees after the Action was executed.
    pub observation: _Observation,

    /// Reward for this timestep only.
    pub reward: _Reward,

    /// Whether the episode has reached a terminal state.
    pub done: bool,

    /// Diagnostic values for this timestep.
    pub info: Info,
}

impl<_Observation, _Reward> Step<_Observation, _Reward> {
    /// Create a Step with an empty info map.
    pub fn new(observation: _Observation, reward: _Reward, done: bool) -> Self {
        Self {
            observation,
            reward,
            done,
            info: Info::default(),
        }
    }
}

/// An Agent picks an Action for every Observation it receives.
///
/// Notice that the Agent is not aware of an Environment, it's only interface is the Observation
/// coming in then the Action going out.
pub trait Agent {
    /// Action the Agent emits.
    type Action;

    /// Observation the Agent consumes.
    type Observation;

    /// Choose the next Action.
    fn act(&mut self, observation: &Self::Observation) -> Self::Action;
}

/// An episodic Environment. It is driven one timestep at a time and is not aware of an Agent.
pub trait Environment {
    /// Action accepted by `step`.
    type Action;

    /// Observation produced by `reset` and `step`.
    type Observation;

    /// Per-step reward.
    type Reward: num_traits::NumAssign + Copy;

    /// Error raised by `step`.
    type Error: std::error::Error;

    /// Begin a new episode and return the initial Observation.
    fn reset(&mut self) -> Self::Observation;

    /// Advance exactly one timestep.
    fn step(
        &mut self,
        action: &Self::Action,
    ) -> Result<Step<Self::Observation, Self::Reward>, Self::Error>;
}

/// Summary of one episode run by a Simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary<_Reward> {
    /// Sum of all rewards received during the episode.
    pub total_reward: _Reward,

    /// Number of timesteps taken.
    pub steps: u32,

    /// Whether the episode ended in a terminal state rather than hitting the step limit.
    pub terminated: bool,
}

impl<_Reward> EpisodeSummary<_Reward>
where
    _Reward: num_traits::NumAssign + Copy,
{
    fn new() -> Self {
        Self {
            total_reward: _Reward::zero(),
            steps: 0,
            terminated: false,
        }
    }

    fn record<_Observation>(&mut self, step: &Step<_Observation, _Reward>) {
        self.total_reward += step.reward;
        self.steps += 1;
        self.terminated = step.done;
    }
}

/// A Simulation runs a single Agent through episodes of an Environment. The total reward across
/// all episodes is kept up to date as the score.
///
/// The Simulation is aware of both the Environment and the single Agent. The Agent's Action and
/// Observation types come from the Environment.
pub struct Simulation<_Environment, _Agent>
where
    _Environment: Environment,
    _Agent: Agent<Action = _Environment::Action, Observation = _Environment::Observation>,
{
    environment: _Environment,
    agent: _Agent,
    max_steps_per_episode: u32,
    score: _Environment::Reward,
}

impl<_Environment, _Agent> Simulation<_Environment, _Agent>
where
    _Environment: Environment,
    _Agent: Agent<Action = _Environment::Action, Observation = _Environment::Observation>,
{
    /// Create a Simulation. Episodes that have not terminated after `max_steps_per_episode`
    /// timesteps are cut off.
    pub fn new(environment: _Environment, agent: _Agent, max_steps_per_episode: u32) -> Self {
        Self {
            environment,
            agent,
            max_steps_per_episode,
            score: _Environment::Reward::zero(),
        }
    }

    /// Reset the Environment and run until it reports a terminal state or the step limit is hit.
    pub fn run_episode(
        &mut self,
    ) -> Result<EpisodeSummary<_Environment::Reward>, _Environment::Error> {
        let mut observation = self.environment.reset();
        let mut summary = EpisodeSummary::new();
        while summary.steps < self.max_steps_per_episode {
            let action = self.agent.act(&observation);
            let step = self.environment.step(&action)?;
            summary.record(&step);
            observation = step.observation;
            if step.done {
                break;
            }
        }
        self.score += summary.total_reward;
        Ok(summary)
    }

    /// Run `episodes` episodes back to back.
    pub fn run(
        &mut self,
        episodes: u32,
    ) -> Result<Vec<EpisodeSummary<_Environment::Reward>>, _Environment::Error> {
        (0..episodes).map(|_| self.run_episode()).collect()
    }

    /// Total reward across every episode run so far.
    pub fn score(&self) -> _Environment::Reward {
        self.score
    }

    /// The Environment, as left by the most recent timestep.
    pub fn environment(&self) -> &_Environment {
        &self.environment
    }
}
