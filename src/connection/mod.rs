//! Transport lifecycle supervision
//!
//! # State Machine
//!
//! ```text
//! Closed ──open ok──► Open ──fault──► Faulted
//!   ▲   └─open err──────────────────►   │
//!   │                                   │ (retry policy)
//!   └────────────── shutdown ◄──────────┘
//! ```
//!
//! Leaving `Open` for any reason closes the transport right away. The
//! supervisor never holds a transport outside the `Open` state.

pub mod retry;
pub mod supervisor;

pub use retry::{NeverRetry, RetryEveryTicks, RetryPolicy};
pub use supervisor::{ConnectionState, ConnectionSupervisor};
