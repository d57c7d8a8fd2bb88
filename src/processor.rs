//! Poller orchestration covering the fetch and dispatch loops, the hand-off
//! channel between them, offset tracking, and run lifecycle.

pub mod poller;

pub(crate) mod backoff;
pub(crate) mod dispatch_loop;
pub(crate) mod fetch_loop;
pub(crate) mod handoff;
pub(crate) mod lifecycle;
pub(crate) mod offset;
