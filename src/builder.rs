//! Builder wiring a configuration to its consumer and producer.

use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use tracing::info;

use crate::cli::StageArgs;
use crate::config::{BackendKind, Mode, Settings, StageConfig};
use crate::engine::{Stage, Transform};
use crate::error::StageError;
use crate::io::{
    Consumer, FileConsumer, FileProducer, HdfsConsumer, HdfsProducer, Producer, StreamConsumer,
    StreamProducer,
};
use crate::message::Codec;
use crate::remote::{HadoopCli, RemoteFs};

pub struct StageBuilder {
    config: StageConfig,
    settings: Settings,
    input: Codec,
    output: Codec,
    remote: Option<Arc<dyn RemoteFs>>,
    remote_names: Option<Box<dyn BufRead + Send>>,
    consumer: Option<Box<dyn Consumer>>,
    producer: Option<Box<dyn Producer>>,
}

impl StageBuilder {
    pub fn new(config: StageConfig) -> Self {
        Self {
            config,
            settings: Settings::default(),
            input: Codec::Json,
            output: Codec::Json,
            remote: None,
            remote_names: None,
            consumer: None,
            producer: None,
        }
    }

    /// Resolve `args` and load the settings file named by `-c`.
    pub fn from_args(args: &StageArgs) -> Result<Self, StageError> {
        let config = StageConfig::from_args(args)?;
        let settings = match &config.config_file {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        Ok(Self::new(config).with_settings(settings))
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_input_codec(mut self, codec: Codec) -> Self {
        self.input = codec;
        self
    }

    pub fn with_output_codec(mut self, codec: Codec) -> Self {
        self.output = codec;
        self
    }

    /// Filesystem client for the HDFS backends (default: `hadoop fs`).
    pub fn with_remote_fs(mut self, remote: Arc<dyn RemoteFs>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Source of remote file names in map-reduce mode (default: stdin).
    pub fn with_remote_names(mut self, names: Box<dyn BufRead + Send>) -> Self {
        self.remote_names = Some(names);
        self
    }

    pub fn with_consumer(mut self, consumer: impl Consumer + 'static) -> Self {
        self.consumer = Some(Box::new(consumer));
        self
    }

    pub fn with_producer(mut self, producer: impl Producer + 'static) -> Self {
        self.producer = Some(Box::new(producer));
        self
    }

    pub fn build<T: Transform>(mut self, transform: T) -> Result<Stage<T>, StageError> {
        let consumer = match self.consumer.take() {
            Some(consumer) => consumer,
            None => {
                self.config.validate()?;
                self.default_consumer()?
            }
        };
        let producer = match self.producer.take() {
            Some(producer) => producer,
            None => self.default_producer()?,
        };
        Ok(Stage::new(
            self.config,
            self.settings,
            self.input,
            self.output,
            consumer,
            producer,
            transform,
        ))
    }

    fn remote_fs(&self) -> Arc<dyn RemoteFs> {
        match &self.remote {
            Some(remote) => remote.clone(),
            None => Arc::new(HadoopCli::from_env()),
        }
    }

    fn default_consumer(&mut self) -> Result<Box<dyn Consumer>, StageError> {
        let config = &self.config;
        let extension = self.input.extension();
        let consumer: Box<dyn Consumer> = match config.source {
            BackendKind::File => Box::new(FileConsumer::new(
                config.input_dir.clone(),
                config.files.clone(),
                extension,
                &config.eom,
            )),
            BackendKind::Stream => Box::new(StreamConsumer::new(&config.eom)),
            BackendKind::Distributed if config.mode == Mode::Batch => {
                if !config.files.is_empty() {
                    info!(
                        ignored = config.files.len(),
                        "Map-reduce mode takes input file names from stdin, ignoring FILE arguments"
                    );
                }
                let names = self
                    .remote_names
                    .take()
                    .unwrap_or_else(|| Box::new(BufReader::new(io::stdin())));
                Box::new(
                    HdfsConsumer::new(
                        self.remote_fs(),
                        config.input_dir.clone(),
                        Vec::new(),
                        &config.eom,
                    )?
                    .with_names(names),
                )
            }
            BackendKind::Distributed => Box::new(HdfsConsumer::new(
                self.remote_fs(),
                config.input_dir.clone(),
                config.files.clone(),
                &config.eom,
            )?),
        };
        Ok(consumer)
    }

    fn default_producer(&self) -> Result<Box<dyn Producer>, StageError> {
        let config = &self.config;
        let extension = self.output.extension();
        let producer: Box<dyn Producer> = match config.dest {
            BackendKind::File => Box::new(FileProducer::new(
                config.output_dir.clone(),
                extension,
                &config.eom,
                &config.eop,
            )),
            BackendKind::Stream => Box::new(StreamProducer::new(&config.eom, &config.eop)),
            BackendKind::Distributed => Box::new(HdfsProducer::new(
                self.remote_fs(),
                config.output_dir.clone(),
                extension,
                &config.eom,
                &config.eop,
            )?),
        };
        Ok(producer)
    }
}
