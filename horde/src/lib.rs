#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod aggregator;
pub mod classify;
pub mod error;
pub mod executor;
pub mod http;
pub mod pacer;
pub mod profile;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod session;
pub mod task;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use horde_core::{
    ConfigError, Outcome, PopulationSnapshot, RunConfig, RunStatistics, StatsSnapshot, TaskStats,
    UserClassConfig,
};

pub mod prelude {
    pub use crate::classify::{AcceptStatus, Classifier, StatusRange, Verdict};
    pub use crate::error::{ActionError, HordeError, SessionError, TransportError};
    pub use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};
    pub use crate::profile::UserClassProfile;
    pub use crate::registry::TaskRegistry;
    pub use crate::reporter::{ConsoleSink, LogSink, ReportSink};
    pub use crate::scheduler::{stop_on, stop_on_ctrl_c, RunHandle, Scheduler, StopHandle};
    pub use crate::session::Session;
    pub use crate::task::{TaskRequest, TaskSpec};

    #[cfg(feature = "reqwest")]
    pub use crate::http::ReqwestClient;

    pub use horde_core::{ConfigError, RunConfig, RunStatistics, StatsSnapshot};
}
