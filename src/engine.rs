//! Stage orchestration: the per-message loop and teardown.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::builder::StageBuilder;
use crate::channel::Incoming;
use crate::cli::StageArgs;
use crate::config::{Settings, StageConfig};
use crate::error::{StageError, UnitError};
use crate::io::{Advance, Consumer, Producer, UnitInfo};
use crate::message::{Codec, Content, Message};
use crate::signal;

pub type TransformError = Box<dyn std::error::Error + Send + Sync>;

/// Per-message processing supplied by a stage.
///
/// Returning an error drops whatever the call produced; the stage moves on
/// to the next message.
pub trait Transform {
    fn process(
        &mut self,
        message: &Message,
        ctx: &StageContext<'_>,
    ) -> Result<Vec<Message>, TransformError>;

    /// Used instead of `process` when the stage runs with `--skip`: the
    /// input content is forwarded with the incomplete marker set.
    fn skip(
        &mut self,
        message: &Message,
        ctx: &StageContext<'_>,
    ) -> Result<Vec<Message>, TransformError> {
        let content = message.content().cloned().ok_or("message was not decoded")?;
        let mut forwarded = ctx.message(content);
        forwarded.set_incomplete(true);
        Ok(vec![forwarded])
    }
}

impl<F> Transform for F
where
    F: FnMut(&Message, &StageContext<'_>) -> Result<Vec<Message>, TransformError>,
{
    fn process(
        &mut self,
        message: &Message,
        ctx: &StageContext<'_>,
    ) -> Result<Vec<Message>, TransformError> {
        self(message, ctx)
    }
}

/// Pins a closure to the `Transform` signature so its argument types can be
/// inferred.
pub fn transform_fn<F>(f: F) -> F
where
    F: FnMut(&Message, &StageContext<'_>) -> Result<Vec<Message>, TransformError>,
{
    f
}

/// What a transform can see besides the message itself.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a StageConfig,
    pub settings: &'a Settings,
    /// Unit the message was read from; `None` on the stream source
    pub unit: Option<&'a UnitInfo>,
    output: &'a Codec,
}

impl<'a> StageContext<'a> {
    pub fn new(
        config: &'a StageConfig,
        settings: &'a Settings,
        unit: Option<&'a UnitInfo>,
        output: &'a Codec,
    ) -> Self {
        Self {
            config,
            settings,
            unit,
            output,
        }
    }

    pub fn output_codec(&self) -> &Codec {
        self.output
    }

    /// New output message with the stage's output codec.
    pub fn message(&self, content: impl Into<Content>) -> Message {
        self.output.message(content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Configuring,
    Running,
    Stopping,
    Stopped,
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Units of work opened
    pub units: usize,
    /// Units abandoned because of a backend error
    pub failed_units: usize,
    /// Messages decoded and handed to the transform
    pub messages: usize,
    /// Frames that failed to decode
    pub malformed: usize,
    /// Messages whose transform or output encoding failed
    pub failed: usize,
    /// Backend cleanup failures during teardown
    pub teardown_failures: usize,
}

impl RunReport {
    /// 1 when any backend failed, including during teardown.
    pub fn exit_code(&self) -> i32 {
        if self.failed_units > 0 || self.teardown_failures > 0 {
            1
        } else {
            0
        }
    }
}

struct Wiring<'a> {
    config: &'a StageConfig,
    settings: &'a Settings,
    input: &'a Codec,
    output: &'a Codec,
}

/// One stage: a consumer, a producer and a transform.
pub struct Stage<T> {
    config: StageConfig,
    settings: Settings,
    input: Codec,
    output: Codec,
    consumer: Option<Box<dyn Consumer>>,
    producer: Option<Box<dyn Producer>>,
    transform: T,
    state: StageState,
    report: RunReport,
}

impl<T: Transform> Stage<T> {
    pub(crate) fn new(
        config: StageConfig,
        settings: Settings,
        input: Codec,
        output: Codec,
        consumer: Box<dyn Consumer>,
        producer: Box<dyn Producer>,
        transform: T,
    ) -> Self {
        Self {
            config,
            settings,
            input,
            output,
            consumer: Some(consumer),
            producer: Some(producer),
            transform,
            state: StageState::Configuring,
            report: RunReport::default(),
        }
    }

    /// Resolve arguments and build the default backends.
    pub fn configure(
        args: &StageArgs,
        input: Codec,
        output: Codec,
        transform: T,
    ) -> Result<Self, StageError> {
        StageBuilder::from_args(args)?
            .with_input_codec(input)
            .with_output_codec(output)
            .build(transform)
    }

    /// Process every unit, then release the backends.
    ///
    /// Decode and transform failures are logged and skipped, backend
    /// failures abandon the current unit. Anything else ends the run; the
    /// backends are released in every case.
    pub fn run(&mut self) -> Result<RunReport, StageError> {
        if self.state != StageState::Configuring {
            return Err(StageError::config(format!(
                "Stage cannot run from state {:?}",
                self.state
            )));
        }
        self.state = StageState::Running;
        info!(
            mode = %self.config.mode,
            source = %self.config.source,
            dest = %self.config.dest,
            input_dir = ?self.config.input_dir,
            output_dir = %self.config.output_dir.display(),
            eom = %self.config.eom.escape_ascii(),
            eop = %self.config.eop.escape_ascii(),
            files = self.config.files.len(),
            settings = self.settings.len(),
            skip = self.config.skip,
            "Starting stage"
        );

        let result = self.drive();
        if let Err(e) = &result {
            error!(error = %e, "Stage stopped on an unrecoverable error");
        }
        self.stop();

        let summary = serde_json::to_string(&self.report).unwrap_or_default();
        info!(report = %summary, "Stage finished");
        result.map(|()| self.report)
    }

    fn drive(&mut self) -> Result<(), StageError> {
        let (Some(consumer), Some(producer)) =
            (self.consumer.as_deref_mut(), self.producer.as_deref_mut())
        else {
            return Err(StageError::config("Stage backends were already released"));
        };
        let wiring = Wiring {
            config: &self.config,
            settings: &self.settings,
            input: &self.input,
            output: &self.output,
        };
        let transform = &mut self.transform;
        let report = &mut self.report;

        loop {
            if let Some(sig) = signal::received() {
                return Err(StageError::Interrupted(sig));
            }
            match consumer.advance() {
                Ok(Advance::Done) => return Ok(()),
                Ok(Advance::Unit) => report.units += 1,
                Err(StageError::Unit(e)) => {
                    unit_failed(report, &e);
                    continue;
                }
                Err(e) => return Err(e),
            }
            match run_unit(consumer, producer, transform, &wiring, report) {
                Ok(()) => {}
                Err(StageError::Unit(e)) => {
                    producer.discard();
                    unit_failed(report, &e);
                }
                Err(e) => {
                    producer.discard();
                    return Err(e);
                }
            }
        }
    }
}

impl<T> Stage<T> {
    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn report(&self) -> RunReport {
        self.report
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Close every backend still held, logging individual failures.
    ///
    /// Idempotent. Returns the number of cleanup failures of this call.
    pub fn stop(&mut self) -> usize {
        if self.state == StageState::Stopped {
            return 0;
        }
        self.state = StageState::Stopping;
        let mut failures = 0;
        if let Some(mut producer) = self.producer.take() {
            if let Err(agg) = producer.close() {
                for e in &agg.errors {
                    error!(backend = producer.id(), error = %e, "Failed to close destination");
                }
                failures += agg.len();
            }
        }
        if let Some(mut consumer) = self.consumer.take() {
            if let Err(agg) = consumer.close() {
                for e in &agg.errors {
                    error!(backend = consumer.id(), error = %e, "Failed to close source");
                }
                failures += agg.len();
            }
        }
        self.report.teardown_failures += failures;
        self.state = StageState::Stopped;
        failures
    }
}

impl<T> Drop for Stage<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unit_failed(report: &mut RunReport, e: &UnitError) {
    error!(phase = %e.phase, target = %e.target, error = %e.error, "Abandoning unit of work");
    report.failed_units += 1;
}

fn run_unit<T: Transform>(
    consumer: &mut dyn Consumer,
    producer: &mut dyn Producer,
    transform: &mut T,
    wiring: &Wiring<'_>,
    report: &mut RunReport,
) -> Result<(), StageError> {
    producer.begin_unit(consumer.current_unit())?;
    let per_unit_eop = wiring.config.eop_per_unit();

    loop {
        if let Some(sig) = signal::received() {
            return Err(StageError::Interrupted(sig));
        }
        let Some(channel) = consumer.channel() else {
            break;
        };
        match channel.next_message(wiring.input)? {
            Incoming::EndOfUnit => break,
            Incoming::Malformed { .. } => report.malformed += 1,
            Incoming::Message(message) => {
                report.messages += 1;
                let unit = consumer.current_unit();
                let ctx = StageContext::new(wiring.config, wiring.settings, unit, wiring.output);
                let result = if wiring.config.skip {
                    transform.skip(&message, &ctx)
                } else {
                    transform.process(&message, &ctx)
                };
                match result {
                    Ok(out) => {
                        producer.write_all(out)?;
                        match producer.flush() {
                            Ok(written) => debug!(written, "Flushed output messages"),
                            Err(StageError::Message(e)) => {
                                warn!(error = %e, "Failed to encode output message, dropping its batch");
                                producer.discard();
                                report.failed += 1;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Err(e) => {
                        warn!(
                            source = unit.map(|u| u.name.as_str()).unwrap_or("<stdin>"),
                            error = %e,
                            "Failed to process message"
                        );
                        producer.discard();
                        report.failed += 1;
                    }
                }
            }
        }
        if !per_unit_eop {
            producer.signal_end_of_process()?;
        }
    }

    if per_unit_eop {
        producer.signal_end_of_process()?;
    }
    Ok(())
}

/// Parse `args`, set up logging and signals, and run a stage to completion.
pub fn run_stage<I, A, T>(
    bin_name: &str,
    args: I,
    input: Codec,
    output: Codec,
    transform: T,
) -> Result<RunReport, StageError>
where
    I: IntoIterator<Item = A>,
    A: Into<std::ffi::OsString> + Clone,
    T: Transform,
{
    let args = crate::cli::try_parse_from(bin_name, args)?;
    crate::logging::init_logging(&args.log_level);
    if let Err(e) = signal::install() {
        warn!(error = %e, "Failed to install signal handlers");
    }
    let mut stage = Stage::configure(&args, input, output, transform)?;
    stage.run()
}
