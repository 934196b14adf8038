//! The lifecycle controller that wires a source, stages, and a sink
//! together over a chain of pipes and coordinates their worker threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{info_span, instrument};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::errno;
use crate::pipe::Pipe;
use crate::stage::{InternalDriver, Sink, SinkDriver, Source, SourceDriver, Stage};
use crate::sync::FutexWord;
use crate::worker::{spawn_worker, Worker};

struct DriverHandle<T> {
    driver: Arc<Mutex<InternalDriver<T>>>,
    worker: Arc<Worker>,
    done: Arc<FutexWord>,
    join: Option<JoinHandle<()>>,
}

struct SourceHandle<T> {
    driver: Arc<Mutex<SourceDriver<T>>>,
    worker: Arc<Worker>,
    done: Arc<FutexWord>,
    join: Option<JoinHandle<()>>,
}

struct SinkHandle<T> {
    driver: Arc<Mutex<SinkDriver<T>>>,
    worker: Arc<Worker>,
    done: Arc<FutexWord>,
    join: Option<JoinHandle<()>>,
}

/// A linear source → stages → sink pipeline and its worker threads.
///
/// Follows the state machine `Disabled → Enabled → Active → Enabled →
/// Disabled`. Configure pipes and assign the source/stages/sink while
/// `Disabled`; call [`enable`](Self::enable) to spawn worker threads (parked),
/// then [`start`](Self::start) to let them run.
pub struct Pipeline<T> {
    config: PipelineConfig,
    pipes: Vec<Arc<Pipe<T>>>,
    source: Option<Box<dyn Source<T>>>,
    stages: Vec<Option<Box<dyn Stage<T>>>>,
    sink: Option<Box<dyn Sink<T>>>,
    source_handle: Option<SourceHandle<T>>,
    stage_handles: Vec<Option<DriverHandle<T>>>,
    sink_handle: Option<SinkHandle<T>>,
    enabled: AtomicBool,
    active: AtomicBool,
    destroying: Arc<FutexWord>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates a pipeline with `internal_stages` stage slots (0 is valid: a
    /// bare source→pipe→sink pipeline) and `internal_stages + 1` pipes, all
    /// with zero buffer capacity until configured.
    #[must_use]
    pub fn new(internal_stages: usize) -> Self {
        Self::with_config(internal_stages, PipelineConfig::default())
    }

    /// As [`new`](Self::new), with an explicit [`PipelineConfig`].
    #[must_use]
    pub fn with_config(internal_stages: usize, config: PipelineConfig) -> Self {
        let pipes = (0..=internal_stages).map(|_| Arc::new(Pipe::new())).collect();
        let stages = (0..internal_stages).map(|_| None).collect();
        let stage_handles = (0..internal_stages).map(|_| None).collect();
        Self {
            config,
            pipes,
            source: None,
            stages,
            sink: None,
            source_handle: None,
            stage_handles,
            sink_handle: None,
            enabled: AtomicBool::new(false),
            active: AtomicBool::new(false),
            destroying: Arc::new(FutexWord::new()),
        }
    }

    /// Number of internal stages (and of pipes, minus one).
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Assigns the source callback.
    pub fn set_source(&mut self, source: impl Source<T> + 'static) {
        self.source = Some(Box::new(source));
    }

    /// Assigns the sink callback.
    pub fn set_sink(&mut self, sink: impl Sink<T> + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// Assigns an internal stage's callback.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BadPtr`] if `index` is out of range.
    pub fn set_stage(&mut self, index: usize, stage: impl Stage<T> + 'static) -> Result<(), PipelineError> {
        let slot = self.stages.get_mut(index).ok_or(PipelineError::BadPtr);
        errno::record(slot.map(|s| *s = Some(Box::new(stage))))
    }

    /// Accesses pipe `index` (`0..=stage_count()`) to configure its buffers
    /// or resize it before enabling.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BadPtr`] if `index` is out of range.
    pub fn pipe(&self, index: usize) -> Result<&Arc<Pipe<T>>, PipelineError> {
        errno::record(self.pipes.get(index).ok_or(PipelineError::BadPtr))
    }

    #[must_use]
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[must_use]
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawns one parked worker thread per stage (sink, stages in reverse,
    /// then source), so that by the time the source's thread starts every
    /// downstream consumer already exists and can accept its first buffer.
    ///
    /// If a later slot fails (a missing `set_stage`/`set_sink`/`set_source`,
    /// or a thread that failed to spawn), every thread already spawned in
    /// this call is destroyed and joined, and its user callback is handed
    /// back to its slot, leaving the pipeline exactly as `Disabled` as before
    /// the call — safe to fix the missing slot and call `enable()` again.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Enabled`] if already enabled,
    /// [`PipelineError::BadPtr`] if the source, a stage, or the sink was
    /// never assigned, or [`PipelineError::ThrdError`] if a thread failed to
    /// spawn.
    #[instrument(skip(self), name = "pipeline.enable")]
    pub fn enable(&mut self) -> Result<(), PipelineError> {
        if self.is_enabled() {
            return errno::record(Err(PipelineError::Enabled));
        }
        let result = (|| {
            let sink_user = self.sink.take().ok_or(PipelineError::BadPtr)?;
            let sink_done = Arc::new(FutexWord::new());
            let sink_driver = Arc::new(Mutex::new(SinkDriver::new(
                sink_user,
                Arc::clone(self.pipes.last().expect("at least one pipe")),
                Arc::new(Worker::new()),
                Arc::clone(&sink_done),
                self.config.consumer_timeout,
            )));
            let (sink_worker, sink_join) = {
                let driver = Arc::clone(&sink_driver);
                spawn_worker("pipeline-sink", move || {
                    driver.lock().unwrap_or_else(std::sync::PoisonError::into_inner).step();
                })?
            };
            self.sink_handle = Some(SinkHandle {
                driver: sink_driver,
                worker: sink_worker,
                done: sink_done,
                join: Some(sink_join),
            });

            for i in (0..self.stages.len()).rev() {
                let user = self.stages[i].take().ok_or(PipelineError::BadPtr)?;
                let done = Arc::new(FutexWord::new());
                let driver = Arc::new(Mutex::new(InternalDriver::new(
                    user,
                    Arc::clone(&self.pipes[i]),
                    Arc::clone(&self.pipes[i + 1]),
                    Arc::new(Worker::new()),
                    Arc::clone(&done),
                    self.config.consumer_timeout,
                )));
                let (worker, join) = {
                    let driver = Arc::clone(&driver);
                    spawn_worker(&format!("pipeline-stage-{i}"), move || {
                        driver.lock().unwrap_or_else(std::sync::PoisonError::into_inner).step();
                    })?
                };
                self.stage_handles[i] = Some(DriverHandle {
                    driver,
                    worker,
                    done,
                    join: Some(join),
                });
            }

            let source_user = self.source.take().ok_or(PipelineError::BadPtr)?;
            let source_done = Arc::new(FutexWord::new());
            let source_driver = Arc::new(Mutex::new(SourceDriver::new(
                source_user,
                Arc::clone(&self.pipes[0]),
                Arc::new(Worker::new()),
                Arc::clone(&source_done),
            )));
            let (source_worker, source_join) = {
                let driver = Arc::clone(&source_driver);
                spawn_worker("pipeline-source", move || {
                    driver.lock().unwrap_or_else(std::sync::PoisonError::into_inner).step();
                })?
            };
            self.source_handle = Some(SourceHandle {
                driver: source_driver,
                worker: source_worker,
                done: source_done,
                join: Some(source_join),
            });

            Ok(())
        })();

        if result.is_ok() {
            self.enabled.store(true, Ordering::SeqCst);
            self.active.store(false, Ordering::SeqCst);
        } else {
            self.unwind_partial_enable();
        }
        errno::record(result)
    }

    /// Tears down whatever threads a failed `enable()` already spawned and
    /// hands each user callback back to its slot, so the caller can fix the
    /// problem (e.g. call the missing `set_stage`) and retry `enable()`
    /// instead of leaking parked worker threads forever.
    fn unwind_partial_enable(&mut self) {
        if let Some(handle) = self.source_handle.take() {
            handle.worker.destroy();
            if let Some(join) = handle.join {
                let _ = join.join();
            }
            if let Ok(driver) = Arc::try_unwrap(handle.driver) {
                let driver = driver.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
                self.source = Some(driver.into_user());
            }
        }
        for i in 0..self.stage_handles.len() {
            if let Some(handle) = self.stage_handles[i].take() {
                handle.worker.destroy();
                if let Some(join) = handle.join {
                    let _ = join.join();
                }
                if let Ok(driver) = Arc::try_unwrap(handle.driver) {
                    let driver = driver.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
                    self.stages[i] = Some(driver.into_user());
                }
            }
        }
        if let Some(handle) = self.sink_handle.take() {
            handle.worker.destroy();
            if let Some(join) = handle.join {
                let _ = join.join();
            }
            if let Ok(driver) = Arc::try_unwrap(handle.driver) {
                let driver = driver.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
                self.sink = Some(driver.into_user());
            }
        }
    }

    /// Destroys source, stages (forward), then sink threads; joins them;
    /// drains every pipe back into its pool, returning any buffer a stage
    /// was holding; sets each stage's `done` word as it is destroyed so a
    /// blocked `wait()` wakes up even if that stage never saw its own
    /// consumer-timeout fire.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotEnabled`] if not currently enabled.
    #[instrument(skip(self), name = "pipeline.disable")]
    pub fn disable(&mut self) -> Result<(), PipelineError> {
        if !self.is_enabled() {
            return errno::record(Err(PipelineError::NotEnabled));
        }
        self.destroying.set();

        if let Some(handle) = self.source_handle.as_ref() {
            handle.worker.destroy();
            handle.done.set();
        }
        for handle in self.stage_handles.iter().flatten() {
            handle.worker.destroy();
            handle.done.set();
        }
        if let Some(handle) = self.sink_handle.as_ref() {
            handle.worker.destroy();
            handle.done.set();
        }

        if let Some(mut handle) = self.source_handle.take() {
            if let Some(join) = handle.join.take() {
                let _ = join.join();
            }
            let mut driver = handle.driver.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(output) = driver.take_output() {
                self.pipes[0].put_back(output);
            }
        }
        for (i, slot) in self.stage_handles.iter_mut().enumerate() {
            if let Some(mut handle) = slot.take() {
                if let Some(join) = handle.join.take() {
                    let _ = join.join();
                }
                let mut driver = handle.driver.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(input) = driver.take_input() {
                    self.pipes[i].put_back(input);
                }
                if let Some(output) = driver.take_output() {
                    self.pipes[i + 1].put_back(output);
                }
            }
        }
        if let Some(mut handle) = self.sink_handle.take() {
            if let Some(join) = handle.join.take() {
                let _ = join.join();
            }
            let mut driver = handle.driver.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(input) = driver.take_input() {
                self.pipes.last().expect("at least one pipe").put_back(input);
            }
        }

        for pipe in self.pipes.iter().rev() {
            pipe.clear();
        }

        self.active.store(false, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
        self.destroying.unset();
        errno::record(Ok(()))
    }

    /// Enables worker loops (sink, stages reverse, source) so buffers start
    /// flowing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotEnabled`] if `enable` has not been called,
    /// or [`PipelineError::Active`] if already started.
    #[instrument(skip(self), name = "pipeline.start")]
    pub fn start(&self) -> Result<(), PipelineError> {
        if !self.is_enabled() {
            return errno::record(Err(PipelineError::NotEnabled));
        }
        if self.is_active() {
            return errno::record(Err(PipelineError::Active));
        }
        let _span = info_span!("pipeline.start.wake").entered();
        if let Some(handle) = &self.sink_handle {
            handle.worker.enable();
        }
        for handle in self.stage_handles.iter().rev().flatten() {
            handle.worker.enable();
        }
        if let Some(handle) = &self.source_handle {
            handle.worker.enable();
        }
        self.active.store(true, Ordering::SeqCst);
        errno::record(Ok(()))
    }

    /// Parks worker loops (source, stages forward, sink); buffers in flight
    /// are retained, not drained.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotEnabled`] if not enabled, or
    /// [`PipelineError::Enabled`] if not currently active.
    #[instrument(skip(self), name = "pipeline.stop")]
    pub fn stop(&self) -> Result<(), PipelineError> {
        if !self.is_enabled() {
            return errno::record(Err(PipelineError::NotEnabled));
        }
        if !self.is_active() {
            return errno::record(Err(PipelineError::Enabled));
        }
        if let Some(handle) = &self.source_handle {
            handle.worker.disable();
        }
        for handle in self.stage_handles.iter().flatten() {
            handle.worker.disable();
        }
        if let Some(handle) = &self.sink_handle {
            handle.worker.disable();
        }
        self.active.store(false, Ordering::SeqCst);
        errno::record(Ok(()))
    }

    /// Blocks the calling thread until every stage has simultaneously
    /// reported idle. Safe to call from multiple threads at once.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotEnabled`] if not currently enabled.
    pub fn wait(&self) -> Result<(), PipelineError> {
        self.destroying.wait_while(1);
        if !self.is_enabled() {
            return errno::record(Err(PipelineError::NotEnabled));
        }
        loop {
            if let Some(handle) = &self.source_handle {
                handle.done.wait_while(0);
            }
            for handle in self.stage_handles.iter().flatten() {
                handle.done.wait_while(0);
            }
            if let Some(handle) = &self.sink_handle {
                handle.done.wait_while(0);
            }

            let mut all_done = self.source_handle.as_ref().is_none_or(|h| h.done.get() != 0);
            for handle in self.stage_handles.iter().flatten() {
                all_done &= handle.done.get() != 0;
            }
            all_done &= self.sink_handle.as_ref().is_none_or(|h| h.done.get() != 0);
            if all_done {
                break;
            }
        }
        errno::record(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{SinkContext, SourceContext, StageContext};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingSource {
        remaining: i32,
    }
    impl Source<i32> for CountingSource {
        fn process(&mut self, ctx: &mut SourceContext<i32>) {
            if self.remaining == 0 {
                ctx.finish();
                return;
            }
            if let Some(slot) = ctx.output.as_mut() {
                *slot = self.remaining;
            }
            self.remaining -= 1;
            ctx.request_push();
        }
    }

    struct Double;
    impl Stage<i32> for Double {
        fn process(&mut self, ctx: &mut StageContext<i32>) {
            if let (Some(input), Some(output)) = (ctx.input, ctx.output.as_mut()) {
                *output = input * 2;
            }
            ctx.request_push();
            ctx.request_pull();
        }
    }

    struct CountingSink {
        count: Arc<AtomicUsize>,
    }
    impl Sink<i32> for CountingSink {
        fn process(&mut self, ctx: &mut SinkContext<i32>) {
            if ctx.input.is_some() {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
            ctx.request_pull();
        }
    }

    #[test]
    fn finite_stream_drains_to_completion() {
        let mut pipeline: Pipeline<i32> = Pipeline::new(1);
        pipeline.pipe(0).unwrap().configure_buffers(vec![0; 4]).unwrap();
        pipeline.pipe(1).unwrap().configure_buffers(vec![0; 4]).unwrap();
        let sink_count = Arc::new(AtomicUsize::new(0));
        pipeline.set_source(CountingSource { remaining: 10 });
        pipeline.set_stage(0, Double).unwrap();
        pipeline.set_sink(CountingSink {
            count: Arc::clone(&sink_count),
        });

        pipeline.enable().unwrap();
        pipeline.start().unwrap();
        pipeline.wait().unwrap();
        pipeline.disable().unwrap();

        assert_eq!(sink_count.load(Ordering::SeqCst), 10);
        assert_eq!(pipeline.pipe(0).unwrap().pool_size(), 4);
        assert_eq!(pipeline.pipe(1).unwrap().pool_size(), 4);
    }

    #[test]
    fn start_without_enable_is_not_enabled() {
        let pipeline: Pipeline<i32> = Pipeline::new(0);
        assert_eq!(pipeline.start(), Err(PipelineError::NotEnabled));
    }

    #[test]
    fn double_start_reports_active() {
        let mut pipeline: Pipeline<i32> = Pipeline::new(0);
        pipeline.pipe(0).unwrap().configure_buffers(vec![0; 2]).unwrap();
        pipeline.set_source(CountingSource { remaining: 1 });
        pipeline.set_sink(CountingSink {
            count: Arc::new(AtomicUsize::new(0)),
        });
        pipeline.enable().unwrap();
        pipeline.start().unwrap();
        assert_eq!(pipeline.start(), Err(PipelineError::Active));
        pipeline.wait().unwrap();
        pipeline.disable().unwrap();
    }

    #[test]
    fn stop_then_start_resumes_without_loss() {
        let mut pipeline: Pipeline<i32> = Pipeline::new(0);
        pipeline.pipe(0).unwrap().configure_buffers(vec![0; 4]).unwrap();
        let sink_count = Arc::new(AtomicUsize::new(0));
        pipeline.set_source(CountingSource { remaining: 20 });
        pipeline.set_sink(CountingSink {
            count: Arc::clone(&sink_count),
        });
        pipeline.enable().unwrap();
        pipeline.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        pipeline.stop().unwrap();
        pipeline.start().unwrap();
        pipeline.wait().unwrap();
        pipeline.disable().unwrap();
        assert_eq!(sink_count.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn zero_stage_pipeline_passes_source_to_sink() {
        let mut pipeline: Pipeline<i32> = Pipeline::new(0);
        pipeline.pipe(0).unwrap().configure_buffers(vec![0; 2]).unwrap();
        let sink_count = Arc::new(AtomicUsize::new(0));
        pipeline.set_source(CountingSource { remaining: 5 });
        pipeline.set_sink(CountingSink {
            count: Arc::clone(&sink_count),
        });
        pipeline.enable().unwrap();
        pipeline.start().unwrap();
        pipeline.wait().unwrap();
        pipeline.disable().unwrap();
        assert_eq!(sink_count.load(Ordering::SeqCst), 5);
    }
}
