//! Sensor module - source interfaces and simulation

mod simulator;
mod traits;

pub use simulator::{Scenario, ScenarioPhase, SensorSimulator};
pub use traits::{
    AccelSample, AccelerometerSource, ActivityEvent, ActivitySource, LocationWakeSource,
    SensorSuite, StepReading, StepSource, WakeEvent,
};
