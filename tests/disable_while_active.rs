//! Disabling an active pipeline must join every thread and return every
//! buffer to its originating pipe's pool, even buffers a stage was holding
//! mid-processing.

use pipeflow::{Pipeline, Sink, SinkContext, Source, SourceContext, Stage, StageContext};

struct BusySource;
impl Source<u64> for BusySource {
    fn process(&mut self, ctx: &mut SourceContext<u64>) {
        if let Some(slot) = ctx.output.as_mut() {
            *slot = 1;
        }
        ctx.request_push();
    }
}

struct BusyStage;
impl Stage<u64> for BusyStage {
    fn process(&mut self, ctx: &mut StageContext<u64>) {
        if let Some(output) = ctx.output.as_mut() {
            *output = ctx.input.unwrap_or(0);
        }
        ctx.request_push();
        ctx.request_pull();
    }
}

struct BusySink;
impl Sink<u64> for BusySink {
    fn process(&mut self, ctx: &mut SinkContext<u64>) {
        ctx.request_pull();
    }
}

#[test]
fn disable_while_active_returns_every_buffer() {
    let mut pipeline: Pipeline<u64> = Pipeline::new(1);
    pipeline.pipe(0).unwrap().configure_buffers(vec![0; 6]).unwrap();
    pipeline.pipe(1).unwrap().configure_buffers(vec![0; 6]).unwrap();

    pipeline.set_source(BusySource);
    pipeline.set_stage(0, BusyStage).unwrap();
    pipeline.set_sink(BusySink);

    pipeline.enable().unwrap();
    pipeline.start().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    pipeline.disable().unwrap();

    assert_eq!(pipeline.pipe(0).unwrap().pool_size(), 6);
    assert_eq!(pipeline.pipe(1).unwrap().pool_size(), 6);
    assert_eq!(pipeline.pipe(0).unwrap().fifo_size(), 0);
    assert_eq!(pipeline.pipe(1).unwrap().fifo_size(), 0);
}
