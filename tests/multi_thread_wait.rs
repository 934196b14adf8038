//! `wait()` must be safely callable from several threads at once and all
//! callers must return once the source finishes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pipeflow::{Pipeline, Sink, SinkContext, Source, SourceContext};

struct BoundedSource {
    deadline: Instant,
}
impl Source<u64> for BoundedSource {
    fn process(&mut self, ctx: &mut SourceContext<u64>) {
        if Instant::now() >= self.deadline {
            ctx.finish();
            return;
        }
        if let Some(slot) = ctx.output.as_mut() {
            *slot = 1;
        }
        ctx.request_push();
    }
}

struct DrainSink;
impl Sink<u64> for DrainSink {
    fn process(&mut self, ctx: &mut SinkContext<u64>) {
        ctx.request_pull();
    }
}

#[test]
fn wait_from_multiple_threads_all_return() {
    let mut pipeline: Pipeline<u64> = Pipeline::new(0);
    pipeline.pipe(0).unwrap().configure_buffers(vec![0; 8]).unwrap();
    pipeline.set_source(BoundedSource {
        deadline: Instant::now() + Duration::from_millis(100),
    });
    pipeline.set_sink(DrainSink);

    pipeline.enable().unwrap();
    pipeline.start().unwrap();
    let pipeline = Arc::new(pipeline);

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let p = Arc::clone(&pipeline);
            std::thread::spawn(move || p.wait().unwrap())
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}
