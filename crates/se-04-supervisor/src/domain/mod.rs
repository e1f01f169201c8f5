//! Supervisor domain: dataset records, broker hops, routing and the stop
//! gap.

pub mod broker;
pub mod committee;
pub mod dataset;
pub mod errors;
pub mod stop;

pub use broker::BrokerBook;
pub use committee::{Committee, Injection};
pub use dataset::parse_record;
pub use errors::{SupervisorError, SupervisorResult};
pub use stop::StopSignal;
