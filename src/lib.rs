pub mod bridge;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod icons;
pub mod media;
pub mod metrics;
pub mod models;
pub mod options;
pub mod parser;
pub mod resolver;
pub mod run;
pub mod surface;
pub mod timing;
pub mod tracking;
pub mod unit;
pub mod viewability;
pub mod waterfall;

#[cfg(test)]
mod test_support;

pub use chain::{ResolutionChain, ResolutionRecord, VastDocument};
pub use error::{ErrorCode, Result, VastError};
pub use events::AdEvent;
pub use options::{Hooks, RequestOptions, UnitOptions};
pub use resolver::{request_ad, request_next_ad, Resolver};
pub use run::{run, RunOptions};
pub use unit::{AdUnit, UnitKind};
pub use waterfall::{run_waterfall, CancelSwitch, Waterfall, WaterfallHandle, WaterfallOptions};
