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

//! The cliff walking gridworld.
//!
//! The agent starts in the bottom-left corner of a 4x12 grid and has to reach the bottom-right
//! corner. Every timestep costs -1. The cells between start and goal on the bottom row are a
//! cliff: stepping onto one costs -100 and sends the agent back to the start, but the episode
//! keeps going. Only the goal ends an episode.

use std::io::Write;

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{Agent, Environment, Step};

/// Number of rows in the grid.
pub const HEIGHT: usize = 4;

/// Number of columns in the grid.
pub const WIDTH: usize = 12;

/// Reward for every timestep that does not end on the cliff, including the one reaching the goal.
pub const STEP_REWARD: i32 = -1;

/// Reward for stepping onto the cliff.
pub const CLIFF_REWARD: i32 = -100;

/// Cliff world error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CliffWorldError {
    /// Action id is not one of the four defined actions.
    #[error("invalid action: {0}")]
    InvalidAction(usize),

    /// Step was called after reaching the goal, and the environment is in strict mode.
    #[error("step called after the episode reached the goal, reset first")]
    PostTerminalStep,

    /// Writing the rendered grid failed.
    #[error("failed to render: {0}")]
    Render(String),
}

/// A cell on the grid. Row 0 is the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Row, `0..HEIGHT`.
    pub row: usize,

    /// Column, `0..WIDTH`.
    pub col: usize,
}

impl Position {
    /// Bottom-left corner, where every episode begins.
    pub const START: Position = Position {
        row: HEIGHT - 1,
        col: 0,
    };

    /// Bottom-right corner, the only terminal cell.
    pub const GOAL: Position = Position {
        row: HEIGHT - 1,
        col: WIDTH - 1,
    };

    /// Create a position.
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Whether this is the start cell.
    pub fn is_start(&self) -> bool {
        *self == Self::START
    }

    /// Whether this is the goal cell.
    pub fn is_goal(&self) -> bool {
        *self == Self::GOAL
    }

    /// Whether this cell is part of the cliff: the bottom row, excluding start and goal.
    pub fn is_cliff(&self) -> bool {
        self.row == HEIGHT - 1 && self.col > 0 && self.col < WIDTH - 1
    }

    /// Apply the action's displacement, stopping at the walls.
    fn moved(self, action: Action) -> Self {
        let (d_row, d_col) = action.displacement();
        let row = (self.row as i32 + d_row).clamp(0, HEIGHT as i32 - 1);
        let col = (self.col as i32 + d_col).clamp(0, WIDTH as i32 - 1);
        Self::new(row as usize, col as usize)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the four moves. The discriminant is the discrete action id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Move one row towards the top.
    Up = 0,

    /// Move one column towards the goal side.
    Right = 1,

    /// Move one row towards the bottom.
    Down = 2,

    /// Move one column towards the start side.
    Left = 3,
}

impl Action {
    /// All actions, in id order.
    pub const ALL: [Action; 4] = [Action::Up, Action::Right, Action::Down, Action::Left];

    /// Discrete id of this action.
    pub fn id(self) -> usize {
        self as usize
    }

    /// (row, col) delta.
    pub fn displacement(self) -> (i32, i32) {
        match self {
            Action::Up => (-1, 0),
            Action::Right => (0, 1),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
        }
    }
}

impl TryFrom<usize> for Action {
    type Error = CliffWorldError;

    fn try_from(id: usize) -> Result<Self, Self::Error> {
        Action::ALL
            .get(id)
            .copied()
            .ok_or(CliffWorldError::InvalidAction(id))
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Up => write!(f, "up"),
            Action::Right => write!(f, "right"),
            Action::Down => write!(f, "down"),
            Action::Left => write!(f, "left"),
        }
    }
}

/// Where `render` sends the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    /// Write to stdout.
    Human,

    /// Return the text instead of writing it.
    Ansi,
}

/// Cliff world configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliffWorldConfig {
    /// Refuse to step after the goal has been reached until the next reset. When false, the
    /// agent keeps moving from the goal cell as if the episode was still going.
    pub strict_terminal: bool,
}

impl CliffWorldConfig {
    /// Create a configuration.
    pub fn new(strict_terminal: bool) -> Self {
        Self { strict_terminal }
    }
}

/// The cliff walking environment. It only tracks where the agent is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliffWorldEnvironment {
    position: Position,
    at_goal: bool,
    cliff_falls: u32,
    config: CliffWorldConfig,
}

impl Default for CliffWorldEnvironment {
    fn default() -> Self {
        CliffWorldEnvironment::with_config(CliffWorldConfig::default())
    }
}

impl CliffWorldEnvironment {
    /// Create an environment with the agent on the start cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an environment with the given configuration. The agent starts on the start cell.
    pub fn with_config(config: CliffWorldConfig) -> Self {
        Self {
            position: Position::START,
            at_goal: false,
            cliff_falls: 0,
            config,
        }
    }

    /// Current position of the agent.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether the last step reached the goal.
    pub fn is_terminal(&self) -> bool {
        self.at_goal
    }

    /// Number of times the agent fell off the cliff since the last `reset`.
    pub fn cliff_falls(&self) -> u32 {
        self.cliff_falls
    }

    /// Configuration this environment was created with.
    pub fn config(&self) -> &CliffWorldConfig {
        &self.config
    }

    /// Number of discrete actions.
    pub fn action_space(&self) -> usize {
        Action::ALL.len()
    }

    /// Size of each observation dimension, (rows, cols).
    pub fn observation_space(&self) -> (usize, usize) {
        (HEIGHT, WIDTH)
    }

    /// Begin a new episode: put the agent back on the start cell and return the start position.
    pub fn reset(&mut self) -> Position {
        self.position = Position::START;
        self.at_goal = false;
        self.cliff_falls = 0;
        debug!(position = %self.position, "reset");
        self.position
    }

    /// Move the agent one cell.
    ///
    /// Moving into a wall leaves the agent against it. Landing on the cliff resets the agent to
    /// the start cell within the same call, so the returned observation is the start cell. The
    /// environment stays on the goal after reaching it; call `reset` to begin a new episode.
    pub fn step(&mut self, action: Action) -> Result<Step<Position, i32>, CliffWorldError> {
        if self.at_goal {
            if self.config.strict_terminal {
                return Err(CliffWorldError::PostTerminalStep);
            }
            warn!(%action, "step after the episode reached the goal");
        }

        let from = self.position;
        self.position = from.moved(action);
        trace!(%from, %action, to = %self.position, "step");

        if self.position.is_goal() {
            self.at_goal = true;
            debug!(position = %self.position, "reached goal");
            return Ok(Step::new(self.position, STEP_REWARD, true));
        }
        self.at_goal = false;

        if self.position.is_cliff() {
            self.cliff_falls += 1;
            debug!(cliff = %self.position, falls = self.cliff_falls, "fell off the cliff");
            self.position = Position::START;
            return Ok(Step::new(self.position, CLIFF_REWARD, false));
        }

        Ok(Step::new(self.position, STEP_REWARD, false))
    }

    /// Step with a raw discrete action id, e.g. from an external controller.
    pub fn step_id(&mut self, id: usize) -> Result<Step<Position, i32>, CliffWorldError> {
        let action = Action::try_from(id)?;
        self.step(action)
    }

    /// Render the grid. `Human` prints it and returns None, `Ansi` returns the text.
    pub fn render(&self, mode: RenderMode) -> Result<Option<String>, CliffWorldError> {
        match mode {
            RenderMode::Human => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                self.render_to(&mut handle)?;
                Ok(None)
            }
            RenderMode::Ansi => Ok(Some(self.to_string())),
        }
    }

    /// Write the rendered grid to `writer`.
    pub fn render_to<W: Write>(&self, writer: &mut W) -> Result<(), CliffWorldError> {
        write!(writer, "{}", self).map_err(|e| CliffWorldError::Render(e.to_string()))
    }
}

// x is the agent, T is the goal, o is everything else. Cells are two spaces apart.
impl std::fmt::Display for CliffWorldEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::with_capacity(HEIGHT * (WIDTH * 3));
        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                let cell = Position::new(row, col);
                let c = if cell == self.position {
                    'x'
                } else if cell.is_goal() {
                    'T'
                } else {
                    'o'
                };
                if col > 0 {
                    s.push_str("  ");
                }
                s.push(c);
            }
            s.push('\n');
        }
        write!(f, "{}", s)
    }
}

impl Environment for CliffWorldEnvironment {
    type Action = Action;
    type Observation = Position;
    type Reward = i32;
    type Error = CliffWorldError;

    fn reset(&mut self) -> Self::Observation {
        CliffWorldEnvironment::reset(self)
    }

    fn step(
        &mut self,
        action: &Self::Action,
    ) -> Result<Step<Self::Observation, Self::Reward>, Self::Error> {
        CliffWorldEnvironment::step(self, *action)
    }
}

/// Picks one of the four actions uniformly at random, ignoring what it observes. It does not
/// learn; it exists to drive the environment.
pub struct RandomAgent {
    rng: rand_pcg::Pcg64,
}

impl RandomAgent {
    /// Create an agent whose choices are fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: rand_pcg::Pcg64::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    type Action = Action;
    type Observation = Position;

    fn act(&mut self, _observation: &Self::Observation) -> Self::Action {
        Action::ALL[self.rng.gen_range(0..Action::ALL.len())]
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn env_at(row: usize, col: usize) -> CliffWorldEnvironment {
        let mut env = CliffWorldEnvironment::new();
        env.position = Position::new(row, col);
        env
    }

    fn render_text(env: &CliffWorldEnvironment) -> String {
        env.render(RenderMode::Ansi)
            .expect("render failed")
            .expect("ansi mode returns text")
    }

    #[test]
    fn test_new_environment_starts_on_start_cell() {
        let env = CliffWorldEnvironment::new();
        assert_eq!(env.position(), Position::new(3, 0));
        assert!(env.position().is_start());
        assert!(!env.is_terminal());
        assert_eq!(env.action_space(), 4);
        assert_eq!(env.observation_space(), (4, 12));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut env = env_at(1, 5);
        for _ in 0..3 {
            assert_eq!(env.reset(), Position::START);
            assert_eq!(env.position(), Position::START);
        }
    }

    #[test]
    fn test_walls_clamp_position() {
        let mut env = env_at(0, 0);
        let step = env.step(Action::Up).expect("step failed");
        assert_eq!(step, Step::new(Position::new(0, 0), -1, false));
        let step = env.step(Action::Left).expect("step failed");
        assert_eq!(step, Step::new(Position::new(0, 0), -1, false));

        let mut env = env_at(0, 11);
        let step = env.step(Action::Right).expect("step failed");
        assert_eq!(step.observation, Position::new(0, 11));
    }

    #[test]
    fn test_step_into_cliff_resets_to_start() {
        let mut env = CliffWorldEnvironment::new();
        let step = env.step(Action::Right).expect("step failed");
        assert_eq!(step.observation, Position::START);
        assert_eq!(step.reward, -100);
        assert!(!step.done);
        assert!(step.info.is_empty());
        assert_eq!(env.position(), Position::START);
        assert_eq!(env.cliff_falls(), 1);
    }

    #[test]
    fn test_cliff_fall_keeps_episode_count_until_reset() {
        let mut env = CliffWorldEnvironment::new();
        for falls in 1..=3 {
            let step = env.step(Action::Right).expect("step failed");
            assert_eq!(step, Step::new(Position::START, CLIFF_REWARD, false));
            assert_eq!(env.cliff_falls(), falls);
        }
        env.reset();
        assert_eq!(env.cliff_falls(), 0);
    }

    #[test]
    fn test_step_down_into_cliff_from_above() {
        let mut env = env_at(2, 10);
        let step = env.step(Action::Down).expect("step failed");
        assert_eq!(step.observation, Position::START);
        assert_eq!(step.reward, CLIFF_REWARD);
        assert!(!step.done);
    }

    #[test]
    fn test_step_into_goal_ends_episode() {
        let mut env = env_at(2, 11);
        let step = env.step(Action::Down).expect("step failed");
        assert_eq!(step, Step::new(Position::new(3, 11), -1, true));
        assert!(env.is_terminal());
        assert_eq!(env.position(), Position::GOAL);
    }

    #[test]
    fn test_safe_move_has_empty_info() {
        let mut env = CliffWorldEnvironment::new();
        let step = env.step(Action::Up).expect("step failed");
        assert_eq!(step, Step::new(Position::new(2, 0), -1, false));
        assert!(step.info.is_empty());
    }

    #[test]
    fn test_step_id_rejects_unknown_action() {
        let mut env = CliffWorldEnvironment::new();
        assert_eq!(env.step_id(4), Err(CliffWorldError::InvalidAction(4)));
        assert_eq!(env.position(), Position::START);

        let step = env.step_id(0).expect("step failed");
        assert_eq!(step.observation, Position::new(2, 0));
    }

    #[test]
    fn test_action_ids_round_trip() {
        for (id, action) in Action::ALL.iter().enumerate() {
            assert_eq!(action.id(), id);
            assert_eq!(Action::try_from(id), Ok(*action));
        }
    }

    #[test]
    fn test_permissive_mode_keeps_moving_after_goal() {
        let mut env = env_at(2, 11);
        env.step(Action::Down).expect("step failed");

        let step = env.step(Action::Right).expect("step failed");
        assert_eq!(step, Step::new(Position::GOAL, -1, true));

        let step = env.step(Action::Up).expect("step failed");
        assert_eq!(step, Step::new(Position::new(2, 11), -1, false));
        assert!(!env.is_terminal());
    }

    #[test]
    fn test_permissive_mode_can_fall_off_cliff_from_goal() {
        let mut env = env_at(2, 11);
        env.step(Action::Down).expect("step failed");
        let step = env.step(Action::Left).expect("step failed");
        assert_eq!(step.observation, Position::START);
        assert_eq!(step.reward, CLIFF_REWARD);
    }

    #[test]
    fn test_strict_mode_rejects_step_after_goal_until_reset() {
        let mut env = CliffWorldEnvironment::with_config(CliffWorldConfig::new(true));
        env.position = Position::new(2, 11);
        env.step(Action::Down).expect("step failed");

        assert_eq!(env.step(Action::Up), Err(CliffWorldError::PostTerminalStep));
        assert_eq!(env.position(), Position::GOAL);

        env.reset();
        let step = env.step(Action::Up).expect("step failed");
        assert_eq!(step.observation, Position::new(2, 0));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CliffWorldConfig = serde_json::from_str("{}").expect("parse failed");
        assert_eq!(config, CliffWorldConfig::default());
        assert!(!config.strict_terminal);

        let config: CliffWorldConfig =
            serde_json::from_str(r#"{"strict_terminal": true}"#).expect("parse failed");
        assert!(config.strict_terminal);
    }

    #[test]
    fn test_render_after_reset() {
        let env = CliffWorldEnvironment::new();
        let expected = concat!(
            "o  o  o  o  o  o  o  o  o  o  o  o\n",
            "o  o  o  o  o  o  o  o  o  o  o  o\n",
            "o  o  o  o  o  o  o  o  o  o  o  o\n",
            "x  o  o  o  o  o  o  o  o  o  o  T\n",
        );
        assert_eq!(render_text(&env), expected);
    }

    #[test]
    fn test_render_agent_on_goal_hides_terminal_marker() {
        let env = env_at(3, 11);
        let text = render_text(&env);
        assert_eq!(text.matches('x').count(), 1);
        assert_eq!(text.matches('T').count(), 0);
        assert_eq!(text.lines().last(), Some("o  o  o  o  o  o  o  o  o  o  o  x"));
    }

    #[test]
    fn test_render_to_writer_matches_ansi() {
        let env = env_at(1, 4);
        let mut buffer = Vec::new();
        env.render_to(&mut buffer).expect("render failed");
        let text = String::from_utf8(buffer).expect("render wrote invalid utf-8");
        assert_eq!(text, render_text(&env));
        assert_eq!(text.lines().nth(1), Some("o  o  o  o  x  o  o  o  o  o  o  o"));
    }

    #[test]
    fn test_human_render_returns_nothing() {
        let env = CliffWorldEnvironment::new();
        assert_eq!(env.render(RenderMode::Human), Ok(None));
    }

    #[test]
    fn test_random_agent_is_reproducible() {
        let mut a = RandomAgent::new(7);
        let mut b = RandomAgent::new(7);
        let observation = Position::START;
        let a_actions: Vec<Action> = (0..50).map(|_| a.act(&observation)).collect();
        let b_actions: Vec<Action> = (0..50).map(|_| b.act(&observation)).collect();
        assert_eq!(a_actions, b_actions);
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Up),
            Just(Action::Right),
            Just(Action::Down),
            Just(Action::Left)
        ]
    }

    proptest! {
        #[test]
        fn test_position_stays_in_bounds_and_off_cliff(
            actions in prop::collection::vec(action(), 1..200),
        ) {
            let mut env = CliffWorldEnvironment::new();
            for action in actions {
                let step = env.step(action).expect("step failed");
                prop_assert!(step.observation.row < HEIGHT);
                prop_assert!(step.observation.col < WIDTH);
                prop_assert!(!step.observation.is_cliff());
                prop_assert_eq!(step.observation, env.position());
            }
        }

        #[test]
        fn test_rewards_match_transition_kind(
            row in 0..HEIGHT,
            col in 0..WIDTH,
            action in action(),
        ) {
            let start = Position::new(row, col);
            prop_assume!(!start.is_cliff());
            let mut env = env_at(row, col);
            let step = env.step(action).expect("step failed");

            let target = start.moved(action);
            if target.is_goal() {
                prop_assert_eq!(step.reward, STEP_REWARD);
                prop_assert!(step.done);
                prop_assert_eq!(step.observation, Position::GOAL);
            } else if target.is_cliff() {
                prop_assert_eq!(step.reward, CLIFF_REWARD);
                prop_assert!(!step.done);
                prop_assert_eq!(step.observation, Position::START);
            } else {
                prop_assert_eq!(step.reward, STEP_REWARD);
                prop_assert!(!step.done);
                prop_assert_eq!(step.observation, target);
            }
        }

        #[test]
        fn test_render_has_one_agent_marker(
            row in 0..HEIGHT,
            col in 0..WIDTH,
        ) {
            let env = env_at(row, col);
            let text = render_text(&env);
            prop_assert_eq!(text.lines().count(), HEIGHT);
            prop_assert_eq!(text.matches('x').count(), 1);
            let expected_goal_markers = if env.position().is_goal() { 0 } else { 1 };
            prop_assert_eq!(text.matches('T').count(), expected_goal_markers);
            for line in text.lines() {
                prop_assert_eq!(line.split("  ").count(), WIDTH);
                prop_assert_eq!(line.trim(), line);
            }
        }
    }
}
