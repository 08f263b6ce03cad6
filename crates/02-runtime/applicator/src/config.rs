use std::ffi::OsString;
use std::time::Duration;

use clap::{Args, Parser};

use crate::error::{ApplicatorError, ApplicatorResult};

const DEFAULT_POLL_BATCH: usize = 64;

/// Runtime knobs for an [`Applicator`](crate::Applicator).
///
/// With the defaults every wait is indefinite, matching a controller that
/// trusts its workers. Timeouts turn a stalled worker into
/// [`ApplicatorError::WorkerUnresponsive`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicatorConfig {
    /// Upper bound for `next_avail_process` to wait for worker capacity.
    pub acquire_timeout: Option<Duration>,
    /// Upper bound for a blocking `get` or `wait_process_done`.
    pub done_timeout: Option<Duration>,
    /// Frames drained per non-blocking poll of the transport.
    pub poll_batch: usize,
}

impl Default for ApplicatorConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: None,
            done_timeout: None,
            poll_batch: DEFAULT_POLL_BATCH,
        }
    }
}

impl ApplicatorConfig {
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn with_done_timeout(mut self, timeout: Duration) -> Self {
        self.done_timeout = Some(timeout);
        self
    }

    pub fn with_poll_batch(mut self, batch: usize) -> Self {
        self.poll_batch = batch;
        self
    }

    /// Parses a full command line (program name first).
    ///
    /// Only the applicator's own flags are accepted; binaries with more
    /// options should flatten [`ConfigArgs`] into their own parser instead.
    pub fn from_args<I, S>(argv: I) -> ApplicatorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let cli = ConfigCli::try_parse_from(argv)
            .map_err(|err| ApplicatorError::Config(err.to_string()))?;
        Self::try_from(cli.args)
    }

    pub(crate) fn validate(&self) -> ApplicatorResult<()> {
        if self.poll_batch == 0 {
            return Err(ApplicatorError::Config(
                "poll batch must be at least one frame".into(),
            ));
        }
        Ok(())
    }
}

/// Command-line flags understood by the applicator.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ConfigArgs {
    /// Give up waiting for an idle worker after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub acquire_timeout_ms: Option<u64>,

    /// Give up waiting for a completion after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub done_timeout_ms: Option<u64>,

    /// Frames drained per non-blocking transport poll
    #[arg(long, default_value_t = DEFAULT_POLL_BATCH)]
    pub poll_batch: usize,
}

impl TryFrom<ConfigArgs> for ApplicatorConfig {
    type Error = ApplicatorError;

    fn try_from(args: ConfigArgs) -> ApplicatorResult<Self> {
        let config = ApplicatorConfig {
            acquire_timeout: args.acquire_timeout_ms.map(Duration::from_millis),
            done_timeout: args.done_timeout_ms.map(Duration::from_millis),
            poll_batch: args.poll_batch,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Debug)]
#[command(about = "Applicator runtime options")]
struct ConfigCli {
    #[command(flatten)]
    args: ConfigArgs,
}
