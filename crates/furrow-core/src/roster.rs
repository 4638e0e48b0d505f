//! The closed set of capability agents the controller dispatches to.

use std::sync::Arc;

use furrow_contracts::{
    capability::CapabilityKind,
    error::{FurrowError, FurrowResult},
};

use crate::traits::CapabilityAgent;

/// One agent per capability variant. Lookup is an exhaustive match, so a new
/// capability cannot be added without giving it an agent here.
#[derive(Clone)]
pub struct AgentRoster {
    geospatial: Arc<dyn CapabilityAgent>,
    regulatory: Arc<dyn CapabilityAgent>,
    simulation: Arc<dyn CapabilityAgent>,
}

impl AgentRoster {
    /// Build the roster, checking each agent serves the slot it is put in.
    pub fn new(
        geospatial: Arc<dyn CapabilityAgent>,
        regulatory: Arc<dyn CapabilityAgent>,
        simulation: Arc<dyn CapabilityAgent>,
    ) -> FurrowResult<Self> {
        for (expected, agent) in [
            (CapabilityKind::Geospatial, &geospatial),
            (CapabilityKind::Regulatory, &regulatory),
            (CapabilityKind::Simulation, &simulation),
        ] {
            if agent.kind() != expected {
                return Err(FurrowError::ConfigError {
                    reason: format!("agent for '{}' reports kind '{}'", expected, agent.kind()),
                });
            }
        }
        Ok(Self { geospatial, regulatory, simulation })
    }

    pub fn get(&self, kind: CapabilityKind) -> &Arc<dyn CapabilityAgent> {
        match kind {
            CapabilityKind::Geospatial => &self.geospatial,
            CapabilityKind::Regulatory => &self.regulatory,
            CapabilityKind::Simulation => &self.simulation,
        }
    }
}
