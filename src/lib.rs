pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod project;
pub mod report;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod storage;

pub use error::{Result, SplitError};
pub use service::SplitService;
