//! Chatlink — a real-time messaging client.
//!
//! Maintains a persistent WebSocket channel per conversation, with
//! exponential-backoff reconnection, an outbound queue that survives
//! disconnects, a REST fallback path for sends, and local bookkeeping
//! for delivery status, typing state, and peer presence.
//!
//! Layers, bottom up:
//! - [`transport`] — the [`transport::Channel`] trait, its WebSocket
//!   implementation, and an in-process loopback for tests
//! - [`reconnect`] — backoff schedule and retry bookkeeping
//! - [`queue`] — FIFO buffering of outbound payloads while offline
//! - [`fallback`] — one-shot REST delivery when the channel is down
//! - [`reconcile`] — local message log and delivery-status tracking
//! - [`presence`] — typing debounce and peer online/typing state
//! - [`session`] — ties the above into one driver task per conversation

pub mod config;
pub mod fallback;
pub mod presence;
pub mod queue;
pub mod reconcile;
pub mod reconnect;
pub mod session;
pub mod transport;
