//! Daily note rotation and Web Push delivery.
//!
//! One run: pick today's note per user (`selector`), turn it into a
//! notification (`payload`), push it to every registered device
//! (`delivery`), and prune endpoints the push service reports as gone
//! (`orchestrator`). Nothing here schedules itself; callers decide when
//! `DailyNotifier::run_once` happens.

pub mod config;
pub mod delivery;
pub mod orchestrator;
pub mod payload;
pub mod selector;

pub use config::{PushConfig, VapidConfigError};
pub use delivery::{DeliveryOutcome, PushTransport, WebPushTransport};
pub use orchestrator::{DailyNotifier, NotificationStore, RunReport};
