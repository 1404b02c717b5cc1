//! Actor-based monitor loop
//!
//! Each monitor runs as an independent tokio task controlled through a
//! cloneable [`ticker::MonitorHandle`].
//!
//! ## Architecture Overview
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Scheduler   │── watch: shutdown
//!                      └──────┬───────┘
//!                             │ spawns
//!          ┌──────────────────┼───────────────────┐
//!          │                  │                   │
//!  ┌───────▼───────┐  ┌───────▼───────┐  ┌────────▼───────┐
//!  │ heap_used     │  │ thread_count  │  │ release_tag    │
//!  │ KindMonitor   │  │ KindMonitor   │  │ ReleaseMonitor │
//!  └───────┬───────┘  └───────┬───────┘  └────────┬───────┘
//!          │ sample / history / detect            │ forge
//!          └──────────────────┼───────────────────┘
//!                             │ direct call
//!                     ┌───────▼────────┐
//!                     │AlertDispatcher │──► Notifiers (spawned)
//!                     └────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel (`TickNow`,
//!    `UpdateInterval`, `Shutdown`)
//! 2. **Request/Response**: oneshot channels carry tick outcomes back
//! 3. **Broadcast shutdown**: one `watch` channel stops every actor

pub mod context;
pub mod messages;
pub mod metric_monitor;
pub mod release_monitor;
pub mod scheduler;
pub mod ticker;
