//! Stage contexts, user-facing traits, and the step-function drivers that
//! run on each worker thread.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::pipe::Pipe;
use crate::sync::FutexWord;
use crate::worker::Worker;

/// Context handed to a [`Source`] on every `init`/`process` call.
pub struct SourceContext<T> {
    /// The buffer currently being produced into, once claimed from the
    /// output pipe's pool.
    pub output: Option<T>,
    pub(crate) ready_to_push: bool,
    worker: Arc<Worker>,
    done: Arc<FutexWord>,
}

/// Context handed to a [`Sink`] on every `init`/`process` call.
pub struct SinkContext<T> {
    /// The buffer currently being consumed, once claimed from the input
    /// pipe's FIFO.
    pub input: Option<T>,
    pub(crate) ready_to_pull: bool,
    worker: Arc<Worker>,
}

/// Context handed to a [`Stage`] on every `init`/`process` call.
pub struct StageContext<T> {
    /// The buffer currently being consumed.
    pub input: Option<T>,
    /// The buffer currently being produced into.
    pub output: Option<T>,
    pub(crate) ready_to_pull: bool,
    pub(crate) ready_to_push: bool,
    worker: Arc<Worker>,
}

impl<T> SourceContext<T> {
    /// True if the worker is being stopped or destroyed and the callback
    /// should wrap up promptly.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.worker.is_destroyed() || !self.worker.is_enabled()
    }

    /// Marks the stream as finished: the source worker is torn down and its
    /// done word is set so that downstream quiescence detection can proceed
    /// once the rest of the pipeline drains.
    pub fn finish(&mut self) {
        self.done.set();
        self.worker.destroy();
    }

    /// Requests that `output` be pushed downstream on the next loop
    /// iteration.
    pub fn request_push(&mut self) {
        self.ready_to_push = true;
    }
}

impl<T> SinkContext<T> {
    /// True if the worker is being stopped or destroyed.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.worker.is_destroyed() || !self.worker.is_enabled()
    }

    /// Requests a new input buffer be pulled on the next loop iteration.
    pub fn request_pull(&mut self) {
        self.ready_to_pull = true;
    }
}

impl<T> StageContext<T> {
    /// True if the worker is being stopped or destroyed.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.worker.is_destroyed() || !self.worker.is_enabled()
    }

    /// Requests a new input buffer on the next loop iteration.
    pub fn request_pull(&mut self) {
        self.ready_to_pull = true;
    }

    /// Requests that `output` be pushed downstream on the next loop
    /// iteration.
    pub fn request_push(&mut self) {
        self.ready_to_push = true;
    }
}

/// User-supplied logic that produces buffers into a pipeline.
pub trait Source<T>: Send {
    /// Called once, the first time this source has a claimed output buffer.
    fn init(&mut self, _ctx: &mut SourceContext<T>) {}

    /// Called on every loop iteration in which an output buffer is claimed.
    fn process(&mut self, ctx: &mut SourceContext<T>);
}

/// User-supplied logic that transforms buffers flowing through a pipeline.
pub trait Stage<T>: Send {
    /// Called once, the first time this stage has both input and output
    /// buffers claimed.
    fn init(&mut self, _ctx: &mut StageContext<T>) {}

    /// Called on every loop iteration in which both buffers are claimed.
    fn process(&mut self, ctx: &mut StageContext<T>);
}

/// User-supplied logic that consumes buffers at the end of a pipeline.
pub trait Sink<T>: Send {
    /// Called once, the first time this sink has a claimed input buffer.
    fn init(&mut self, _ctx: &mut SinkContext<T>) {}

    /// Called on every loop iteration in which an input buffer is claimed.
    fn process(&mut self, ctx: &mut SinkContext<T>);
}

pub(crate) struct SourceDriver<T> {
    user: Box<dyn Source<T>>,
    ctx: SourceContext<T>,
    output_pipe: Arc<Pipe<T>>,
    initialized: bool,
}

impl<T> SourceDriver<T> {
    pub(crate) fn new(user: Box<dyn Source<T>>, output_pipe: Arc<Pipe<T>>, worker: Arc<Worker>, done: Arc<FutexWord>) -> Self {
        Self {
            user,
            ctx: SourceContext {
                output: None,
                ready_to_push: false,
                worker,
                done,
            },
            output_pipe,
            initialized: false,
        }
    }

    pub(crate) fn step(&mut self) {
        if self.ctx.ready_to_push {
            let output = self.ctx.output.take();
            if let Some(output) = output {
                match self.output_pipe.push_buffer(output) {
                    Ok(()) => {
                        self.output_pipe.release_full(1);
                        self.ctx.ready_to_push = false;
                    }
                    Err(output) => {
                        self.ctx.output = Some(output);
                        self.ctx.done.set();
                        std::thread::yield_now();
                        return;
                    }
                }
            }
        }
        if self.ctx.output.is_none() {
            self.ctx.output = self.output_pipe.get_empty_buffer();
        }
        if self.ctx.output.is_some() {
            if !self.initialized {
                self.user.init(&mut self.ctx);
                self.initialized = true;
            }
            self.user.process(&mut self.ctx);
        } else {
            trace!("source has no empty output buffer available, yielding");
            std::thread::yield_now();
        }
    }

    /// Returns the in-flight output buffer, if any, for draining on disable.
    pub(crate) fn take_output(&mut self) -> Option<T> {
        self.ctx.output.take()
    }

    /// Reclaims the user callback, e.g. to restore a slot after rolling back
    /// a failed `enable()`.
    pub(crate) fn into_user(self) -> Box<dyn Source<T>> {
        self.user
    }
}

pub(crate) struct SinkDriver<T> {
    user: Box<dyn Sink<T>>,
    ctx: SinkContext<T>,
    input_pipe: Arc<Pipe<T>>,
    initialized: bool,
    consumer_timeout: Duration,
    done: Arc<FutexWord>,
}

impl<T> SinkDriver<T> {
    pub(crate) fn new(
        user: Box<dyn Sink<T>>,
        input_pipe: Arc<Pipe<T>>,
        worker: Arc<Worker>,
        done: Arc<FutexWord>,
        consumer_timeout: Duration,
    ) -> Self {
        Self {
            user,
            ctx: SinkContext {
                input: None,
                ready_to_pull: true,
                worker,
            },
            input_pipe,
            initialized: false,
            consumer_timeout,
            done,
        }
    }

    pub(crate) fn step(&mut self) {
        if self.ctx.ready_to_pull {
            if let Some(input) = self.ctx.input.take() {
                self.input_pipe.put_back(input);
            }
            if !self.input_pipe.try_acquire_full(self.consumer_timeout) {
                self.done.set();
                std::thread::yield_now();
                return;
            }
            self.done.unset();
            self.ctx.input = self.input_pipe.get_full_buffer();
            if self.ctx.input.is_none() {
                self.input_pipe.release_full(1);
                std::thread::yield_now();
                return;
            }
            self.ctx.ready_to_pull = false;
        }
        if self.ctx.input.is_some() {
            if !self.initialized {
                self.user.init(&mut self.ctx);
                self.initialized = true;
            }
            self.user.process(&mut self.ctx);
        } else {
            self.ctx.ready_to_pull = true;
            std::thread::yield_now();
        }
    }

    pub(crate) fn take_input(&mut self) -> Option<T> {
        self.ctx.input.take()
    }

    /// Reclaims the user callback, e.g. to restore a slot after rolling back
    /// a failed `enable()`.
    pub(crate) fn into_user(self) -> Box<dyn Sink<T>> {
        self.user
    }
}

pub(crate) struct InternalDriver<T> {
    user: Box<dyn Stage<T>>,
    ctx: StageContext<T>,
    input_pipe: Arc<Pipe<T>>,
    output_pipe: Arc<Pipe<T>>,
    initialized: bool,
    consumer_timeout: Duration,
    done: Arc<FutexWord>,
}

impl<T> InternalDriver<T> {
    pub(crate) fn new(
        user: Box<dyn Stage<T>>,
        input_pipe: Arc<Pipe<T>>,
        output_pipe: Arc<Pipe<T>>,
        worker: Arc<Worker>,
        done: Arc<FutexWord>,
        consumer_timeout: Duration,
    ) -> Self {
        Self {
            user,
            ctx: StageContext {
                input: None,
                output: None,
                ready_to_pull: true,
                ready_to_push: false,
                worker,
            },
            input_pipe,
            output_pipe,
            initialized: false,
            consumer_timeout,
            done,
        }
    }

    pub(crate) fn step(&mut self) {
        if self.ctx.ready_to_push {
            let output = self.ctx.output.take();
            if let Some(output) = output {
                match self.output_pipe.push_buffer(output) {
                    Ok(()) => {
                        self.output_pipe.release_full(1);
                        self.ctx.ready_to_push = false;
                    }
                    Err(output) => {
                        self.ctx.output = Some(output);
                        self.done.set();
                        std::thread::yield_now();
                        return;
                    }
                }
            }
        }
        if self.ctx.ready_to_pull {
            if !self.input_pipe.try_acquire_full(self.consumer_timeout) {
                self.done.set();
                std::thread::yield_now();
                return;
            }
            self.done.unset();
            self.ctx.input = self.input_pipe.get_full_buffer();
            if self.ctx.input.is_none() {
                self.input_pipe.release_full(1);
                std::thread::yield_now();
                return;
            }
            self.ctx.ready_to_pull = false;
        }
        if self.ctx.input.is_some() {
            if self.ctx.output.is_none() {
                self.ctx.output = self.output_pipe.get_empty_buffer();
            }
            if self.ctx.output.is_some() {
                if !self.initialized {
                    self.user.init(&mut self.ctx);
                    self.initialized = true;
                }
                self.user.process(&mut self.ctx);
                if self.ctx.ready_to_pull {
                    if let Some(input) = self.ctx.input.take() {
                        self.input_pipe.put_back(input);
                    }
                }
            } else {
                std::thread::yield_now();
            }
        } else {
            self.ctx.ready_to_pull = true;
        }
    }

    pub(crate) fn take_input(&mut self) -> Option<T> {
        self.ctx.input.take()
    }

    pub(crate) fn take_output(&mut self) -> Option<T> {
        self.ctx.output.take()
    }

    /// Reclaims the user callback, e.g. to restore a slot after rolling back
    /// a failed `enable()`.
    pub(crate) fn into_user(self) -> Box<dyn Stage<T>> {
        self.user
    }
}
