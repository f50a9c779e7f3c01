//! # telemetry-dispatch
//!
//! Client-side telemetry pipeline: accepts discrete application events from
//! arbitrary caller tasks, buffers them in memory, and asynchronously ships
//! them in size- and time-bounded batches to a remote analytics collector
//! over HTTPS, with bounded-concurrency retry-with-backoff delivery.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   enqueue   ┌───────────────────┐   batches   ┌─────────────┐
//! │  Client    │────────────▶│  FlushScheduler   │────────────▶│  Dispatcher │──▶ collector
//! │ capture /  │             │  queue + triggers │             │  POST /batch│    (HTTPS)
//! │ identify / │             │  (timer, depth,   │             │  + Backoff  │
//! │ alias/page │             │   explicit flush) │             └──────┬──────┘
//! └────────────┘             └───────────────────┘                    │
//!                                                              ┌──────▼──────┐
//!                                                              │ OutcomeSink │
//!                                                              │ counters +  │
//!                                                              │ callbacks   │
//!                                                              └─────────────┘
//! ```
//!
//! ## Key behaviors
//!
//! - **Fire-and-forget capture**: client calls never block on and never
//!   surface delivery failures; outcomes are reported through counters and
//!   per-action callbacks.
//! - **Three flush triggers**: a periodic timer, a queue-depth threshold, and
//!   an explicit [`Client::flush`], all routed through one coordinator task.
//! - **Bounded worker pool**: at most `threads` concurrent flush workers;
//!   triggers that find no free slot are shed, not queued.
//! - **Two-limit batch packing**: batches are capped both by action count
//!   (`flush_at`) and by serialized bytes, with per-action margin below the
//!   collector's request limit. Actions over the per-action ceiling are
//!   dropped at enqueue.
//! - **Retry with backoff**: transport errors, 5xx, and 429 are retried with
//!   exponential backoff plus jitter; other non-200 responses fail the batch
//!   immediately. A batch's actions all succeed or all fail together.
//! - **Not durable**: the queue is in-memory only; buffered events are lost
//!   on process termination.
//!
//! ## Example
//!
//! ```ignore
//! use telemetry_dispatch::{Client, Config, Properties};
//!
//! let client = Client::new("phc_project_key", Config::default());
//!
//! client.capture(
//!     "user-42",
//!     "level_completed",
//!     Some(Properties::new().set_event_property("level", 3)),
//!     None,
//! );
//!
//! // On an orderly exit, drain what is buffered
//! client.flush().await;
//! client.shutdown();
//! ```

mod backoff;
mod client;
mod config;
mod dispatch;
mod error;
mod model;
mod scheduler;
mod stats;

pub use backoff::Backoff;
pub use client::Client;
pub use config::Config;
pub use dispatch::{BatchDispatcher, HttpBatchDispatcher};
pub use error::DeliveryError;
pub use model::{
    Action, ActionKind, Batch, Properties, Value, MAX_ACTION_BYTES, MAX_BATCH_BYTES,
};
pub use scheduler::FlushScheduler;
pub use stats::{FailureCallback, OutcomeSink, Statistics, SuccessCallback};
