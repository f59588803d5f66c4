//! Waypoint plan and move/hold/stop state machine
//!
//! The plan is a fixed ordered sequence of curvature-center targets, each
//! paired with a stop heading. The machine cycles move -> hold -> stop for
//! each waypoint after an initial pre-roll stop, then halts.
//!
//! States are encoded as integer codes `k * 10 + phase` with phase 0 = move,
//! 1 = hold, 2 = stop; `-1` is the initial pre-roll stop and `N * 10` (for N
//! waypoints) is terminal. During a move the target interpolates linearly
//! from the previous waypoint; during the stop phase the motor is halted the
//! first moment the extrapolated heading enters the stop window, which sets
//! a latch that suppresses PID work until the next move begins.

use std::f32::consts::FRAC_PI_2;

/// One waypoint: curvature-center target and the heading to stop at
#[derive(Debug, Clone, Copy)]
pub struct Waypoint {
    pub x: f32,
    pub y: f32,
    /// Heading at which to halt the wheel during this waypoint's stop phase
    pub stop_angle: f32,
}

/// Read-only waypoint schedule
#[derive(Debug, Clone)]
pub struct WaypointPlan {
    pub waypoints: Vec<Waypoint>,
    /// Duration of each move phase, microseconds
    pub move_time_us: i64,
    /// Duration of each hold phase, microseconds
    pub hold_time_us: i64,
    /// Duration of each stop phase (and the initial pre-roll), microseconds
    pub stop_time_us: i64,
}

impl Default for WaypointPlan {
    fn default() -> Self {
        Self {
            waypoints: vec![
                Waypoint { x: -0.90, y: 0.75, stop_angle: -FRAC_PI_2 },
                Waypoint { x: -0.90, y: 2.00, stop_angle: FRAC_PI_2 },
                Waypoint { x: 0.50, y: 0.75, stop_angle: -FRAC_PI_2 },
                Waypoint { x: 0.50, y: 2.00, stop_angle: FRAC_PI_2 },
            ],
            move_time_us: 120_000_000,
            hold_time_us: 50_000_000,
            stop_time_us: 25_000_000,
        }
    }
}

/// Half-width bounds of the stop window below the stop angle, radians
const STOP_WINDOW_LOW: f32 = 0.35;
const STOP_WINDOW_HIGH: f32 = 0.15;

/// What the controller must do after a tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsmTick {
    /// Command the motor to zero velocity now
    pub stop_motor: bool,
    /// Reset controller scratch state before the next PID pass
    pub clear: bool,
    /// The plan is exhausted; halt and return
    pub finished: bool,
}

/// Move/hold/stop waypoint state machine
#[derive(Debug)]
pub struct WaypointFsm {
    plan: WaypointPlan,
    state: i32,
    state_start_us: Option<i64>,
    stopped: bool,
    target_x: f32,
    target_y: f32,
}

impl WaypointFsm {
    pub fn new(plan: WaypointPlan) -> Self {
        assert!(!plan.waypoints.is_empty(), "waypoint plan is empty");
        let first = plan.waypoints[0];
        Self {
            plan,
            state: -1,
            state_start_us: None,
            stopped: true,
            target_x: first.x,
            target_y: first.y,
        }
    }

    /// Integer state code: -1, k*10+phase, or N*10 when terminal
    pub fn state_code(&self) -> i32 {
        self.state
    }

    /// Whether the stop latch is set (PID work is suppressed)
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Current curvature-center target
    pub fn target(&self) -> (f32, f32) {
        (self.target_x, self.target_y)
    }

    /// Advance the machine. `heading` is the most recent extrapolated
    /// heading, used only by the stop-window check.
    pub fn tick(&mut self, now_us: i64, heading: f32) -> FsmTick {
        let start = *self.state_start_us.get_or_insert(now_us);
        let elapsed = now_us - start;
        let mut out = FsmTick::default();

        let n = self.plan.waypoints.len() as i32;
        if self.state >= n * 10 {
            out.stop_motor = true;
            out.finished = true;
            return out;
        }

        match self.state {
            -1 => {
                if elapsed <= self.plan.stop_time_us {
                    self.target_x = self.plan.waypoints[0].x;
                    self.target_y = self.plan.waypoints[0].y;
                } else {
                    self.enter(10, now_us);
                    self.stopped = false;
                }
            }
            s if s % 10 == 0 => {
                let k = (s / 10) as usize;
                if elapsed <= self.plan.move_time_us {
                    let ratio = elapsed as f32 / self.plan.move_time_us as f32;
                    let from = self.plan.waypoints[k - 1];
                    let to = self.plan.waypoints[k];
                    self.target_x = (1.0 - ratio) * from.x + ratio * to.x;
                    self.target_y = (1.0 - ratio) * from.y + ratio * to.y;
                } else {
                    self.enter(s + 1, now_us);
                }
            }
            s if s % 10 == 1 => {
                let k = (s / 10) as usize;
                if elapsed <= self.plan.hold_time_us {
                    self.target_x = self.plan.waypoints[k].x;
                    self.target_y = self.plan.waypoints[k].y;
                } else {
                    self.enter(s + 1, now_us);
                }
            }
            s => {
                // stop phase
                let k = (s / 10) as usize;
                if elapsed <= self.plan.stop_time_us {
                    let stop_angle = self.plan.waypoints[k].stop_angle;
                    if !self.stopped
                        && stop_angle - STOP_WINDOW_LOW <= heading
                        && heading <= stop_angle - STOP_WINDOW_HIGH
                    {
                        out.stop_motor = true;
                        self.stopped = true;
                    }
                } else {
                    // next waypoint's move phase; restart the controller clean
                    self.enter(s + 8, now_us);
                    self.stopped = false;
                    out.clear = true;
                }
            }
        }

        if self.state >= n * 10 {
            out.stop_motor = true;
            out.finished = true;
        }
        out
    }

    fn enter(&mut self, state: i32, now_us: i64) {
        log::info!("waypoint state {} -> {}", self.state, state);
        self.state = state;
        self.state_start_us = Some(now_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micro_plan() -> WaypointPlan {
        WaypointPlan {
            move_time_us: 1_000,
            hold_time_us: 1_000,
            stop_time_us: 1_000,
            ..WaypointPlan::default()
        }
    }

    /// Drive the machine with a fixed tick step, recording each state
    /// transition as (code, time). Heading is always inside the stop window.
    fn traverse(plan: WaypointPlan, step_us: i64) -> (Vec<(i32, i64)>, i64) {
        let mut fsm = WaypointFsm::new(plan);
        let mut transitions = vec![(fsm.state_code(), 0)];
        let mut now = 0i64;
        loop {
            let heading = {
                // stay inside the current waypoint's stop window
                let k = (fsm.state_code().max(0) / 10) as usize;
                let idx = k.min(3);
                WaypointPlan::default().waypoints[idx].stop_angle - 0.25
            };
            let out = fsm.tick(now, heading);
            if transitions.last().unwrap().0 != fsm.state_code() {
                transitions.push((fsm.state_code(), now));
            }
            if out.finished {
                return (transitions, now);
            }
            now += step_us;
            assert!(now < 1_000_000_000, "machine failed to terminate");
        }
    }

    #[test]
    fn test_full_traversal_order() {
        let (transitions, _) = traverse(micro_plan(), 250);
        let codes: Vec<i32> = transitions.iter().map(|&(c, _)| c).collect();
        assert_eq!(codes, vec![-1, 10, 11, 12, 20, 21, 22, 30, 31, 32, 40]);
    }

    #[test]
    fn test_transition_times() {
        let plan = WaypointPlan {
            move_time_us: 1_000,
            hold_time_us: 1_000,
            stop_time_us: 1_000,
            ..WaypointPlan::default()
        };
        let (transitions, _) = traverse(plan, 100);
        // each phase lasts its dwell, so transition k happens near k * 1 ms
        for (i, &(_, t)) in transitions.iter().enumerate().skip(1) {
            let expected = i as i64 * 1_000;
            assert!(
                (t - expected).abs() <= 1_000,
                "transition {i} at {t}, expected about {expected}"
            );
        }
    }

    #[test]
    fn test_sub_millisecond_dwells_terminate() {
        let plan = WaypointPlan {
            move_time_us: 100,
            hold_time_us: 100,
            stop_time_us: 100,
            ..WaypointPlan::default()
        };
        let (transitions, _) = traverse(plan, 50);
        assert_eq!(transitions.last().unwrap().0, 40);
    }

    #[test]
    fn test_move_phase_interpolates_target() {
        let mut fsm = WaypointFsm::new(micro_plan());
        // pre-roll: target is the first waypoint
        fsm.tick(0, 0.0);
        assert_eq!(fsm.target(), (-0.90, 0.75));
        assert!(fsm.is_stopped());

        // enter the first move
        fsm.tick(1_001, 0.0);
        assert_eq!(fsm.state_code(), 10);
        assert!(!fsm.is_stopped());

        // halfway through the move the target is the midpoint
        fsm.tick(1_501, 0.0);
        let (tx, ty) = fsm.target();
        assert!((tx - -0.90).abs() < 1e-6);
        assert!((ty - (0.75 + 2.00) / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_stop_latch_requires_window() {
        let mut fsm = WaypointFsm::new(micro_plan());
        fsm.tick(0, 0.0);
        fsm.tick(1_001, 0.0); // -> 10
        fsm.tick(2_002, 0.0); // -> 11
        fsm.tick(3_003, 0.0); // -> 12
        assert_eq!(fsm.state_code(), 12);

        // heading outside the window: no stop command, latch stays clear
        let out = fsm.tick(3_100, 0.0);
        assert!(!out.stop_motor);
        assert!(!fsm.is_stopped());

        // window is [stop_angle - 0.35, stop_angle - 0.15] around waypoint 1
        let in_window = FRAC_PI_2 - 0.25;
        let out = fsm.tick(3_200, in_window);
        assert!(out.stop_motor);
        assert!(fsm.is_stopped());

        // latch holds; the stop command is not repeated
        let out = fsm.tick(3_300, in_window);
        assert!(!out.stop_motor);

        // leaving the stop phase clears the latch and requests a reset
        let out = fsm.tick(4_100, in_window);
        assert_eq!(fsm.state_code(), 20);
        assert!(out.clear);
        assert!(!fsm.is_stopped());
    }

    #[test]
    fn test_terminal_state_keeps_commanding_stop() {
        let (_, end) = traverse(micro_plan(), 250);
        let mut fsm = WaypointFsm::new(micro_plan());
        // fast-forward a fresh machine to terminal
        let mut now = 0;
        loop {
            let out = fsm.tick(now, -FRAC_PI_2 - 0.25);
            if out.finished {
                break;
            }
            now += 250;
        }
        assert!(now <= end + 250);
        let out = fsm.tick(now + 10_000, 0.0);
        assert!(out.stop_motor && out.finished);
    }
}
