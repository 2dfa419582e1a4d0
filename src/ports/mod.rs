//! Port traits. API boundaries for the hexagon.
//!
//! - Inbound: Called by UI/adapter into the application
//! - Outbound: Called by application into infrastructure

pub mod announcer;
pub mod inbound;
pub mod outbound;

pub use announcer::AnnouncerPort;
pub use inbound::InputPort;
pub use outbound::{Clock, ConfigRepo, CouncilRepo, MotionStore, WeightRepo, WeightResolver};
