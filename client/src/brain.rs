//! Decision making of the reference agent
//!
//! Everything happens in the agent's local frame: `+y` is straight ahead.
//! The brain chases the closest visible agent and shoots at it when the gun
//! allows, turns away from walls that get too close, and wanders otherwise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{AgentAction, AgentPerception, AgentSpecs, VisionItem, VisionTag, Vector2};

/// Obstacles closer than this (agent units) are avoided
pub const AVOID_DISTANCE: f64 = 3.0;
/// Max heading change of the wander behaviour per perception, in radians
pub const WANDER_JITTER: f64 = 0.3;

const FALLBACK_MAX_SPEED: f64 = 0.75;

pub struct Brain {
    specs: Option<AgentSpecs>,
    rng: StdRng,
    wander_angle: f64,
}

impl Brain {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            specs: None,
            rng,
            wander_angle: 0.0,
        }
    }

    pub fn set_specs(&mut self, specs: AgentSpecs) {
        self.specs = Some(specs);
    }

    fn max_speed(&self) -> f64 {
        self.specs.as_ref().map_or(FALLBACK_MAX_SPEED, |s| s.maxspeed)
    }

    fn can_shoot(&self, perception: &AgentPerception) -> bool {
        let cost = self
            .specs
            .as_ref()
            .and_then(|s| s.gear.get("gun"))
            .map_or(0.0, |gun| gun.specs.shootcost);

        perception.shootcooldown == 0 && perception.shootenergy >= cost
    }

    pub fn decide(&mut self, perception: &AgentPerception) -> Vec<AgentAction> {
        let mut actions = Vec::with_capacity(2);
        let max_speed = self.max_speed();

        if let Some(wall) = closest(&perception.vision, VisionTag::Obstacle)
            .filter(|item| item.center.mag() < AVOID_DISTANCE && item.center.y > 0.0)
        {
            // Ahead and to the right means turn left, and the other way around
            let side = if wall.center.x >= 0.0 { -1.0 } else { 1.0 };
            actions.push(AgentAction::steer(Vector2::new(side, 0.2).set_mag(max_speed)));
            return actions;
        }

        match closest(&perception.vision, VisionTag::Agent) {
            Some(target) => {
                if self.can_shoot(perception) && !target.center.is_null() {
                    actions.push(AgentAction::shoot(target.center));
                }
                actions.push(AgentAction::steer(target.center.set_mag(max_speed)));
            }
            None => {
                self.wander_angle += self.rng.gen_range(-WANDER_JITTER..WANDER_JITTER);
                let heading = Vector2::new(self.wander_angle.sin(), self.wander_angle.cos());
                actions.push(AgentAction::steer(heading.set_mag(max_speed)));
            }
        }

        actions
    }
}

impl Default for Brain {
    fn default() -> Self {
        Self::new()
    }
}

fn closest(vision: &[VisionItem], tag: VisionTag) -> Option<&VisionItem> {
    vision
        .iter()
        .filter(|item| item.tag == tag)
        .min_by(|a, b| a.center.mag_sq().total_cmp(&b.center.mag_sq()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::protocol::{ACTION_SHOOT, ACTION_STEER};

    fn item(tag: VisionTag, center: Vector2) -> VisionItem {
        VisionItem {
            tag,
            nearedge: center,
            center,
            faredge: center,
            velocity: Vector2::ZERO,
            entityid: 1,
            segmentnum: 0,
        }
    }

    fn perception(vision: Vec<VisionItem>) -> AgentPerception {
        AgentPerception {
            shootenergy: 100.0,
            vision,
            ..AgentPerception::default()
        }
    }

    #[test]
    fn test_chases_and_shoots_closest_agent() {
        let mut brain = Brain::with_seed(1);
        let actions = brain.decide(&perception(vec![
            item(VisionTag::Agent, Vector2::new(0.0, 20.0)),
            item(VisionTag::Agent, Vector2::new(5.0, 5.0)),
        ]));

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].method, ACTION_SHOOT);
        assert_eq!(actions[0].vector_argument(), Some(Vector2::new(5.0, 5.0)));

        let steer = actions[1].vector_argument().unwrap();
        assert_eq!(actions[1].method, ACTION_STEER);
        assert_approx_eq!(steer.mag(), FALLBACK_MAX_SPEED);
        assert_approx_eq!(steer.x, steer.y);
    }

    #[test]
    fn test_holds_fire_during_cooldown() {
        let mut brain = Brain::with_seed(1);
        let mut p = perception(vec![item(VisionTag::Agent, Vector2::new(0.0, 5.0))]);
        p.shootcooldown = 2;

        let actions = brain.decide(&p);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].method, ACTION_STEER);
    }

    #[test]
    fn test_turns_away_from_close_wall() {
        let mut brain = Brain::with_seed(1);
        let actions = brain.decide(&perception(vec![
            item(VisionTag::Obstacle, Vector2::new(1.0, 1.0)),
            item(VisionTag::Agent, Vector2::new(0.0, 5.0)),
        ]));

        assert_eq!(actions.len(), 1);
        assert!(actions[0].vector_argument().unwrap().x < 0.0);
    }

    #[test]
    fn test_wanders_when_alone() {
        let mut brain = Brain::with_seed(42);
        for _ in 0..20 {
            let actions = brain.decide(&perception(Vec::new()));
            assert_eq!(actions.len(), 1);
            assert_approx_eq!(actions[0].vector_argument().unwrap().mag(), FALLBACK_MAX_SPEED);
        }
    }
}
