//! Campaign dispatch pipeline.
//!
//! A [`TriggerHandler`] takes one trigger message, claims the campaign
//! (`draft -> sending`), renders its template once, then walks every
//! targeted subscriber in keyset pages. Each subscriber is turned into a
//! [`SendRequest`](campaigner_types::messages::SendRequest) and published to
//! the outbound queue under a strictly increasing correlation id.
//!
//! ```text
//! trigger ──▶ TriggerHandler ──▶ BatchWalker ──▶ prepare ──▶ OutboundPublisher ──▶ queue
//!                  │                                               │
//!                  └──────── campaign status ◀── store ──▶ send_logs ◀┘
//! ```
//!
//! Collaborators are reached only through the traits in [`ports`], bundled in
//! a [`DispatchContext`]. [`storage`] implements all of them on SQLite.

pub mod consumer;
pub mod correlation;
pub mod error;
pub mod handler;
pub mod policy;
pub mod ports;
pub mod preparer;
pub mod publisher;
pub mod storage;
pub mod template;
pub mod walker;

pub use consumer::{Consumer, ConsumerConfig, ConsumerHandle, MessageHandler, SubmitError};
pub use correlation::CorrelationSequence;
pub use error::{PrepareError, PublishError, RecipientError, SequenceError, TemplateError, WalkError};
pub use handler::{DispatchContext, DispatchSettings, Outcome, RunSummary, TriggerHandler};
pub use policy::{RecipientFailurePolicy, RetryPolicy};
pub use ports::{CampaignStore, Cursor, MessageQueue, PageRequest, TemplateSource};
pub use template::RenderedTemplate;
pub use walker::{BatchWalker, DEFAULT_PAGE_SIZE};
