pub mod command;
pub mod config;
pub mod listener;
pub mod replay;
pub mod resolver;
pub mod session;
pub mod types;

pub use command::CommandFramework;
pub use config::{ConfigError, ConfigResult, RunConfig, DEFAULT_RUN_TIMEOUT};
pub use listener::{Listener, ListenerHandle};
pub use replay::{ReplayFixture, ReplayFramework, ReplayTarget};
pub use resolver::PathSourceResolver;
pub use session::{
    FrameworkError, FrameworkResult, ResolveError, ResolveResult, RunOptions, SignalSender,
    SourceResolver, TestFramework,
};
pub use types::{
    CancelledTest, FailedTest, FailureDetail, Fields, PassedTest, ResultBundle, RunToken, Signal,
    SourceLocation, TestEvent, TestStatus,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::listener::*;
    pub use crate::session::*;
    pub use crate::types::*;
}
