//! Acquisition, handoff and dispatch pipeline.
//!
//! Data flows one way, from the receiver's data pin to the message bus:
//!
//! ```text
//! [PinInterface] ──► [EdgeSampler] ──► [HandoffSlot] ──► [Dispatcher] ──► [BusClient]
//!                     │  edge-sampler thread              main thread
//!                     └──► [FrameDecoder]
//! ```
//!
//! Control flows the other way only for shutdown: the [`RunFlag`] is cleared
//! by the signal handler and observed by both loops.
//!
//! # Design
//!
//! - **Two threads** - the high-priority sampler and the dispatch/lifecycle thread.
//! - **One lock** - the handoff slot's mutex, held only for O(1) copies.
//! - **Overwrite on full** - the sampler never waits for the dispatcher.
//! - **Bounded I/O** - every publish waits at most the bus client's timeout.

pub mod dispatcher;
pub mod handoff;
pub mod lifecycle;
pub mod realtime;
pub mod sampler;

pub use dispatcher::{
    outbound_messages, topic_for, DispatchStats, Dispatcher, DispatcherOptions, OutboundMessage,
};
pub use handoff::{HandoffSlot, HandoffStats};
pub use lifecycle::{install_signal_handler, Relay, RelayOptions, RelayReport, RunFlag};
pub use sampler::{
    EdgeSampler, EdgeTracker, SamplerCounters, SamplerOptions, SamplerStats, SAMPLER_THREAD_NAME,
};
