//! A reusable multi-threaded pipeline runtime for streaming data processing.
//!
//! A [`pipeline::Pipeline`] wires one source, zero or more internal stages,
//! and one sink together over a chain of [`pipe::Pipe`]s. Each stage runs on
//! its own OS thread; buffers (client-owned, opaque handles) are passed
//! between adjacent stages through a pipe's free-pool and ready-FIFO rather
//! than copied.
//!
//! ```no_run
//! use pipeflow::pipeline::Pipeline;
//! use pipeflow::stage::{Sink, SinkContext, Source, SourceContext};
//!
//! struct Counter(i32);
//! impl Source<i32> for Counter {
//!     fn process(&mut self, ctx: &mut SourceContext<i32>) {
//!         if self.0 == 0 {
//!             ctx.finish();
//!             return;
//!         }
//!         if let Some(slot) = ctx.output.as_mut() {
//!             *slot = self.0;
//!         }
//!         self.0 -= 1;
//!         ctx.request_push();
//!     }
//! }
//!
//! struct Printer;
//! impl Sink<i32> for Printer {
//!     fn process(&mut self, ctx: &mut SinkContext<i32>) {
//!         if let Some(v) = ctx.input {
//!             println!("{v}");
//!         }
//!         ctx.request_pull();
//!     }
//! }
//!
//! let mut pipeline = Pipeline::new(0);
//! pipeline.pipe(0).unwrap().configure_buffers(vec![0; 4]).unwrap();
//! pipeline.set_source(Counter(10));
//! pipeline.set_sink(Printer);
//! pipeline.enable().unwrap();
//! pipeline.start().unwrap();
//! pipeline.wait().unwrap();
//! pipeline.disable().unwrap();
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod errno;
pub mod pipe;
pub mod pipeline;
pub mod stage;
pub mod sync;
mod worker;

pub use config::PipelineConfig;
pub use error::{ErrorCode, PipelineError};
pub use errno::errno;
pub use pipe::Pipe;
pub use pipeline::Pipeline;
pub use stage::{Sink, SinkContext, Source, SourceContext, Stage, StageContext};
