pub mod builder;
pub mod hopper;
pub mod lights;
pub mod panel;
pub mod peck_port;
pub mod speaker;

#[cfg(test)]
mod tests;

pub use builder::{build_panel, standard_registry};
pub use hopper::{FeedSummary, Hopper, HopperState};
pub use lights::{CueLight, HouseLight};
pub use panel::{ComponentHandle, Panel, PanelError, PanelReport, SelfTestEntry};
pub use peck_port::PeckPort;
pub use speaker::Speaker;
