pub mod scheduler;
pub mod network;
pub mod event;
pub mod session;
pub mod metrics;
pub mod simulation;

pub use event::Event;
pub use scheduler::{EventScheduler, SimTime};
pub use network::Segment;
pub use simulation::{RunReport, SimConfig, Simulation};
pub use metrics::SimMetrics;

pub mod prelude {
    pub use crate::event::Event;
    pub use crate::scheduler::{EventScheduler, SimTime};
    pub use crate::network::{Endpoint, NetworkLink, ScriptedLoss, Segment};
    pub use crate::session::{LineSource, MessageSource, ReceiverSession, ScriptedSource, SenderSession};
    pub use crate::simulation::{RunReport, SimConfig, Simulation};
    pub use crate::metrics::SimMetrics;
}
