use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use operant_core::fault::ComponentFault;

use crate::hopper::Hopper;
use crate::lights::{CueLight, HouseLight};
use crate::peck_port::PeckPort;
use crate::speaker::Speaker;

/// Role-addressing errors at the panel surface.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel {panel} has no component in role {role:?}")]
    UnknownRole { panel: String, role: String },
    #[error("role {role:?} is a {actual}, expected a {expected}")]
    RoleKindMismatch {
        role: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("component {role:?} was marked unusable for this session")]
    ComponentUnusable { role: String },
}

/// One physical device slotted into a panel role.
pub enum ComponentHandle {
    Hopper(Hopper),
    PeckPort(PeckPort),
    HouseLight(HouseLight),
    CueLight(CueLight),
    Speaker(Speaker),
}

impl ComponentHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentHandle::Hopper(_) => "hopper",
            ComponentHandle::PeckPort(_) => "peck_port",
            ComponentHandle::HouseLight(_) => "house_light",
            ComponentHandle::CueLight(_) => "cue_light",
            ComponentHandle::Speaker(_) => "speaker",
        }
    }

    /// Drive the device to its safe/idle state: hopper down, key light off,
    /// cue dark, house light on, playback stopped.
    fn safe_state(&mut self) -> Result<(), ComponentFault> {
        match self {
            ComponentHandle::Hopper(hopper) => hopper.reset(),
            ComponentHandle::PeckPort(port) => port.off(),
            ComponentHandle::HouseLight(light) => light.on(),
            ComponentHandle::CueLight(cue) => cue.off(),
            ComponentHandle::Speaker(speaker) => speaker.stop(),
        }
    }

    /// Everything dark for overnight shutdown.
    fn dark_state(&mut self) -> Result<(), ComponentFault> {
        match self {
            ComponentHandle::Hopper(hopper) => hopper.reset(),
            ComponentHandle::PeckPort(port) => port.off(),
            ComponentHandle::HouseLight(light) => light.off(),
            ComponentHandle::CueLight(cue) => cue.off(),
            ComponentHandle::Speaker(speaker) => speaker.stop(),
        }
    }

    /// Exercise the device's primary operation once, for the self-test
    /// report.
    fn exercise(&mut self) -> Result<(), ComponentFault> {
        match self {
            ComponentHandle::Hopper(hopper) => {
                hopper.feed(Duration::from_millis(500)).map(|_| ())
            }
            ComponentHandle::PeckPort(port) => {
                port.flash(Duration::from_millis(400), Duration::from_millis(100))
            }
            ComponentHandle::HouseLight(light) => {
                light.off()?;
                light.on()
            }
            ComponentHandle::CueLight(cue) => {
                cue.red()?;
                cue.off()
            }
            ComponentHandle::Speaker(speaker) => speaker.stop(),
        }
    }
}

/// Faults collected by a best-effort panel sweep.
#[derive(Debug, Default)]
pub struct PanelReport {
    pub faults: Vec<(String, ComponentFault)>,
}

impl PanelReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfTestEntry {
    pub role: String,
    pub kind: &'static str,
    pub passed: bool,
    pub fault: Option<String>,
}

/// One physical experiment box: an ordered role → component mapping with
/// panel-wide lifecycle operations. Components are owned here and nowhere
/// else.
pub struct Panel {
    id: String,
    components: Vec<(String, ComponentHandle)>,
    unusable: BTreeSet<String>,
}

impl std::fmt::Debug for Panel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panel")
            .field("id", &self.id)
            .field(
                "components",
                &self
                    .components
                    .iter()
                    .map(|(role, handle)| (role.as_str(), handle.kind()))
                    .collect::<Vec<_>>(),
            )
            .field("unusable", &self.unusable)
            .finish()
    }
}

impl Panel {
    pub fn new(id: impl Into<String>, components: Vec<(String, ComponentHandle)>) -> Self {
        Self {
            id: id.into(),
            components,
            unusable: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|(role, _)| role.as_str())
    }

    /// Take a component out of service for the rest of the session
    /// (unaddressable channel, repeated interlock faults).
    pub fn mark_unusable(&mut self, role: &str) {
        warn!(panel = %self.id, role, "component marked unusable");
        self.unusable.insert(role.to_string());
    }

    pub fn is_usable(&self, role: &str) -> bool {
        !self.unusable.contains(role)
    }

    fn handle_mut(&mut self, role: &str) -> Result<&mut ComponentHandle, PanelError> {
        if self.unusable.contains(role) {
            return Err(PanelError::ComponentUnusable {
                role: role.to_string(),
            });
        }
        let id = self.id.clone();
        self.components
            .iter_mut()
            .find(|(r, _)| r == role)
            .map(|(_, handle)| handle)
            .ok_or(PanelError::UnknownRole {
                panel: id,
                role: role.to_string(),
            })
    }

    pub fn hopper(&mut self, role: &str) -> Result<&mut Hopper, PanelError> {
        match self.handle_mut(role)? {
            ComponentHandle::Hopper(hopper) => Ok(hopper),
            other => Err(PanelError::RoleKindMismatch {
                role: role.to_string(),
                expected: "hopper",
                actual: other.kind(),
            }),
        }
    }

    pub fn peck_port(&mut self, role: &str) -> Result<&mut PeckPort, PanelError> {
        match self.handle_mut(role)? {
            ComponentHandle::PeckPort(port) => Ok(port),
            other => Err(PanelError::RoleKindMismatch {
                role: role.to_string(),
                expected: "peck_port",
                actual: other.kind(),
            }),
        }
    }

    pub fn house_light(&mut self, role: &str) -> Result<&mut HouseLight, PanelError> {
        match self.handle_mut(role)? {
            ComponentHandle::HouseLight(light) => Ok(light),
            other => Err(PanelError::RoleKindMismatch {
                role: role.to_string(),
                expected: "house_light",
                actual: other.kind(),
            }),
        }
    }

    pub fn cue_light(&mut self, role: &str) -> Result<&mut CueLight, PanelError> {
        match self.handle_mut(role)? {
            ComponentHandle::CueLight(cue) => Ok(cue),
            other => Err(PanelError::RoleKindMismatch {
                role: role.to_string(),
                expected: "cue_light",
                actual: other.kind(),
            }),
        }
    }

    pub fn speaker(&mut self, role: &str) -> Result<&mut Speaker, PanelError> {
        match self.handle_mut(role)? {
            ComponentHandle::Speaker(speaker) => Ok(speaker),
            other => Err(PanelError::RoleKindMismatch {
                role: role.to_string(),
                expected: "speaker",
                actual: other.kind(),
            }),
        }
    }

    /// Drive every component to its safe state. Best-effort: individual
    /// faults are collected, not propagated, and fatal faults take the
    /// component out of service.
    pub fn reset(&mut self) -> PanelReport {
        let mut report = PanelReport::default();
        let mut newly_unusable = Vec::new();
        for (role, handle) in &mut self.components {
            if let Err(fault) = handle.safe_state() {
                warn!(panel = %self.id, role = %role, %fault, "reset fault");
                if fault.is_fatal() {
                    newly_unusable.push(role.clone());
                }
                report.faults.push((role.clone(), fault));
            }
        }
        for role in newly_unusable {
            self.unusable.insert(role);
        }
        report
    }

    /// Overnight shutdown: hopper down, every light off.
    pub fn sleep(&mut self) -> PanelReport {
        let mut report = PanelReport::default();
        for (role, handle) in &mut self.components {
            if let Err(fault) = handle.dark_state() {
                report.faults.push((role.clone(), fault));
            }
        }
        report
    }

    /// Key light on: the box is accepting responses.
    pub fn ready(&mut self) -> Result<(), ComponentFault> {
        for (_, handle) in &mut self.components {
            if let ComponentHandle::PeckPort(port) = handle {
                port.on()?;
            }
        }
        Ok(())
    }

    /// Key light off between trials.
    pub fn idle(&mut self) -> Result<(), ComponentFault> {
        for (_, handle) in &mut self.components {
            if let ComponentHandle::PeckPort(port) = handle {
                port.off()?;
            }
        }
        Ok(())
    }

    /// Exercise every component's primary operation once. Used by the bench
    /// harness, never by a running trial engine.
    pub fn self_test(&mut self) -> Vec<SelfTestEntry> {
        info!(panel = %self.id, "self test");
        let mut entries = Vec::new();
        for (role, handle) in &mut self.components {
            let outcome = handle.exercise();
            entries.push(SelfTestEntry {
                role: role.clone(),
                kind: handle.kind(),
                passed: outcome.is_ok(),
                fault: outcome.err().map(|f| f.to_string()),
            });
        }
        entries
    }
}
