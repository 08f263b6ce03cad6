//! Small algorithms shared by the scenario tests.

use anyhow::ensure;
use applicator::{Algorithm, CodecResult, MessageReader, MessageWriter, Value};
use crossbeam_channel::Receiver;

/// Expects `(7, 3.5)` and answers `true`.
#[derive(Default)]
pub struct CheckPair {
    int: i32,
    float: f64,
}

impl Algorithm for CheckPair {
    fn name(&self) -> &str {
        "check-pair"
    }

    fn get(&mut self, input: &mut MessageReader) -> CodecResult<()> {
        self.int = input.get()?;
        self.float = input.get()?;
        Ok(())
    }

    fn task(&mut self) -> anyhow::Result<()> {
        ensure!(self.int == 7, "expected 7, got {}", self.int);
        ensure!(self.float == 3.5, "expected 3.5, got {}", self.float);
        Ok(())
    }

    fn put(&mut self, output: &mut MessageWriter) -> CodecResult<()> {
        output.put(&true)
    }
}

/// Decodes any single value and echoes its dimensions followed by the value.
#[derive(Default)]
pub struct Describe {
    value: Option<Value>,
}

impl Algorithm for Describe {
    fn name(&self) -> &str {
        "describe"
    }

    fn get(&mut self, input: &mut MessageReader) -> CodecResult<()> {
        self.value = Some(input.get()?);
        Ok(())
    }

    fn task(&mut self) -> anyhow::Result<()> {
        ensure!(self.value.is_some(), "no value received");
        Ok(())
    }

    fn put(&mut self, output: &mut MessageWriter) -> CodecResult<()> {
        let Some(value) = self.value.take() else {
            return Ok(());
        };
        let dims: Vec<i32> = value.shape().dims().iter().map(|&d| d as i32).collect();
        output.put(&dims)?;
        output.put(&value)
    }
}

/// Echoes an `i32` once the gate lets it through.
pub struct Gated {
    gate: Receiver<()>,
    input: i32,
}

impl Gated {
    pub fn new(gate: Receiver<()>) -> Self {
        Self { gate, input: 0 }
    }
}

impl Algorithm for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    fn get(&mut self, input: &mut MessageReader) -> CodecResult<()> {
        self.input = input.get()?;
        Ok(())
    }

    fn task(&mut self) -> anyhow::Result<()> {
        self.gate.recv()?;
        Ok(())
    }

    fn put(&mut self, output: &mut MessageWriter) -> CodecResult<()> {
        output.put(&self.input)
    }
}
