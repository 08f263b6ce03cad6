use bytes::Bytes;
use transport_codecs::{CodecResult, MessageReader, MessageWriter};

/// A user-supplied unit of work.
///
/// The controller `put`s inputs in some documented order, the worker's
/// [`get`](Algorithm::get) takes them back in that same order, then
/// [`task`](Algorithm::task) computes and [`put`](Algorithm::put) encodes the
/// results the controller will `get`. The framework never looks inside.
pub trait Algorithm: Send {
    /// Identifier used to match a dispatch to the worker's algorithm and in logs.
    fn name(&self) -> &str;

    /// Decodes this dispatch's inputs.
    fn get(&mut self, input: &mut MessageReader) -> CodecResult<()>;

    /// Runs the computation on previously decoded inputs.
    fn task(&mut self) -> anyhow::Result<()>;

    /// Encodes the results of the last `task`.
    fn put(&mut self, output: &mut MessageWriter) -> CodecResult<()>;
}

impl<A: Algorithm + ?Sized> Algorithm for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&mut self, input: &mut MessageReader) -> CodecResult<()> {
        (**self).get(input)
    }

    fn task(&mut self) -> anyhow::Result<()> {
        (**self).task()
    }

    fn put(&mut self, output: &mut MessageWriter) -> CodecResult<()> {
        (**self).put(output)
    }
}

/// Where a worker is within one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    WaitingForWork,
    Receiving,
    Running,
    Sending,
}

/// Runs one get/task/put cycle on `input`, returning the encoded results or a
/// failure reason suitable for a completion signal.
///
/// `on_state` observes each phase transition.
pub(crate) fn execute(
    algorithm: &mut dyn Algorithm,
    input: Bytes,
    mut on_state: impl FnMut(WorkerState),
) -> Result<Bytes, String> {
    on_state(WorkerState::Receiving);
    let mut reader = MessageReader::new(input);
    algorithm
        .get(&mut reader)
        .map_err(|err| format!("decoding inputs: {err}"))?;
    if !reader.is_exhausted() {
        let left = reader.remaining_values().unwrap_or(0);
        return Err(format!(
            "decoding inputs: {left} value(s) left after position {}",
            reader.position()
        ));
    }

    on_state(WorkerState::Running);
    algorithm.task().map_err(|err| format!("task: {err:#}"))?;

    on_state(WorkerState::Sending);
    let mut writer = MessageWriter::new();
    algorithm
        .put(&mut writer)
        .map_err(|err| format!("encoding results: {err}"))?;
    Ok(writer.into_bytes())
}
