//! Server-side seasonal event state

use tracing::info;

use crate::config::PhaseConfig;
use crate::protocol::xmas::{XmasPhase, XmasPhaseModifications, XmasServerEventStatusPacket};

/// Current phases of the seasonal event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmasEventState {
    phases: Vec<XmasPhase>,
}

impl XmasEventState {
    /// Seed the event from configured phases; the first phase starts active
    pub fn from_config(phases: &[PhaseConfig]) -> Self {
        let phases = phases
            .iter()
            .enumerate()
            .map(|(index, config)| XmasPhase {
                active: index == 0,
                gifts_collected: 0,
                gifts_goal: config.gifts_goal,
                activate_phase_automatically: config.activate_automatically,
            })
            .collect();
        Self { phases }
    }

    pub fn phases(&self) -> &[XmasPhase] {
        &self.phases
    }

    /// Apply modifications index by index. Modifications past the last
    /// phase create new default phases before being applied.
    pub fn apply(&mut self, modifications: &[XmasPhaseModifications]) {
        if modifications.len() > self.phases.len() {
            self.phases.resize(modifications.len(), XmasPhase::default());
        }
        for (phase, modification) in self.phases.iter_mut().zip(modifications) {
            modification.apply_to(phase);
        }
    }

    /// Count a collected gift toward the first active phase.
    ///
    /// A phase that reaches its goal deactivates and hands over to the next
    /// phase if that phase activates automatically. Returns false if no
    /// phase is active.
    pub fn collect_gift(&mut self) -> bool {
        let Some(index) = self.phases.iter().position(|p| p.active) else {
            return false;
        };

        let phase = &mut self.phases[index];
        phase.gifts_collected = phase.gifts_collected.saturating_add(1);
        if !phase.is_complete() {
            return true;
        }

        phase.active = false;
        info!(phase = index, goal = phase.gifts_goal, "Event phase completed");

        if let Some(next) = self.phases.get_mut(index + 1) {
            if next.activate_phase_automatically {
                next.active = true;
                info!(phase = index + 1, "Event phase activated");
            }
        }
        true
    }

    /// Snapshot packet sent to clients
    pub fn status_packet(&self) -> XmasServerEventStatusPacket {
        XmasServerEventStatusPacket {
            phases: self.phases.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_phase_event() -> XmasEventState {
        XmasEventState::from_config(&[
            PhaseConfig {
                gifts_goal: 2,
                activate_automatically: false,
            },
            PhaseConfig {
                gifts_goal: 5,
                activate_automatically: true,
            },
        ])
    }

    #[test]
    fn test_from_config() {
        let event = two_phase_event();
        assert_eq!(event.phases().len(), 2);
        assert!(event.phases()[0].active);
        assert!(!event.phases()[1].active);
        assert!(event.phases()[1].activate_phase_automatically);
    }

    #[test]
    fn test_collect_gift_advances_phase() {
        let mut event = two_phase_event();

        assert!(event.collect_gift());
        assert_eq!(event.phases()[0].gifts_collected, 1);
        assert!(event.phases()[0].active);

        assert!(event.collect_gift());
        assert!(!event.phases()[0].active);
        assert!(event.phases()[1].active);

        assert!(event.collect_gift());
        assert_eq!(event.phases()[1].gifts_collected, 1);
    }

    #[test]
    fn test_collect_gift_without_auto_activation() {
        let mut event = XmasEventState::from_config(&[
            PhaseConfig {
                gifts_goal: 1,
                activate_automatically: false,
            },
            PhaseConfig {
                gifts_goal: 1,
                activate_automatically: false,
            },
        ]);

        assert!(event.collect_gift());
        assert!(event.phases().iter().all(|p| !p.active));
        assert!(!event.collect_gift());
    }

    #[test]
    fn test_apply_is_per_field() {
        let mut event = two_phase_event();
        event.apply(&[XmasPhaseModifications {
            modify_gifts_goal: true,
            phase: XmasPhase {
                active: false,
                gifts_collected: 77,
                gifts_goal: 10,
                activate_phase_automatically: true,
            },
            ..Default::default()
        }]);

        let first = event.phases()[0];
        assert_eq!(first.gifts_goal, 10);
        assert!(first.active);
        assert_eq!(first.gifts_collected, 0);
        assert!(!first.activate_phase_automatically);
        // untouched
        assert_eq!(event.phases()[1].gifts_goal, 5);
    }

    #[test]
    fn test_apply_extends_phases() {
        let mut event = XmasEventState::default();
        event.apply(&[
            XmasPhaseModifications::default(),
            XmasPhaseModifications {
                modify_active: true,
                phase: XmasPhase {
                    active: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        ]);

        assert_eq!(
            event.phases(),
            &[
                XmasPhase::default(),
                XmasPhase {
                    active: true,
                    ..Default::default()
                }
            ]
        );
    }

    #[test]
    fn test_status_packet() {
        let event = two_phase_event();
        assert_eq!(event.status_packet().phases, event.phases().to_vec());
    }
}
