//! Appforge — build orchestration engine.
//!
//! Turns free-form AI model output into a working, booted project inside
//! a live sandbox filesystem, one ticket at a time:
//!
//! - [`parser`] recovers files, packages and commands from raw text
//! - [`paths`] + [`write_order`] decide what to write and in what order
//! - [`apply`] drives the sequential write pipeline, emitting a strictly
//!   ordered [`progress`] event stream
//! - [`entrypoint`] and [`placeholder`] run as a self-healing post-pass
//! - [`ticket`] + [`planner`] sequence many builds into a multi-feature
//!   plan with dependency ordering, retries and manual mode
//!
//! The outside world is reached only through the [`sandbox::Sandbox`]
//! capability trait; all per-sandbox mutable state lives in an explicit
//! [`session::SandboxSession`].

pub mod apply;
pub mod config;
pub mod entrypoint;
pub mod error;
pub mod parser;
pub mod paths;
pub mod pkg_cache;
pub mod placeholder;
pub mod planner;
pub mod progress;
pub mod sandbox;
pub mod session;
pub mod ticket;
pub mod write_order;

pub use apply::apply_response;
pub use config::EngineConfig;
pub use error::{EngineError, ErrorCode};
pub use parser::{parse_response, ParsedArtifacts, ParsedFile};
pub use paths::TemplateTarget;
pub use planner::{create_plan, DraftTicket};
pub use progress::{ApplyResults, ProgressEvent};
pub use sandbox::{DirSandbox, Sandbox, SandboxInfo};
pub use session::SandboxSession;
pub use ticket::{BuildMode, BuildPlan, Ticket, TicketStatus};
