pub mod config;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod payload;
pub mod session;

pub use config::{Config, Policy};
pub use fetch::{AuditSource, FetchError, HttpAuditSource, ReportQuery};
pub use model::AuditViewModel;
pub use normalize::normalize;
pub use payload::RawAuditPayload;
pub use session::{LoadOutcome, ReportSession, ReportState};
