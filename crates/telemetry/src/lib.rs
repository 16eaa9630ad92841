//! Infrastructure adapters for the [`compilation`] core.
//!
//! Implements the core's output ports against real sinks:
//!
//! | Adapter | Port | Destination |
//! |---------|------|-------------|
//! | [`Console`] / [`StdoutConsole`] | `ConsoleSink` | any `Write`, stdout by default |
//! | [`JsonLinesEventSink`] | `EventSink` | one JSON object per line |
//! | [`TracingEventSink`] | `EventSink` | `tracing` events on the `jit_events` target |
//! | [`FileDumpHandler`] | `DumpHandler` | one text file per dump |
//!
//! [`init_logging`] installs the process-wide `tracing` subscriber.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File handles, stdout, and subscriber configuration live
//! here. The `compilation` crate sees only its port traits.

pub mod console;
pub mod dumps;
pub mod events;
pub mod observability;

pub use console::{Console, StdoutConsole};
pub use dumps::FileDumpHandler;
pub use events::{JsonLinesEventSink, TracingEventSink, EVENT_TARGET};
pub use observability::{init_logging, init_test_logging, LogFormat, UnknownLogFormat};
