//! Midpoint-rule integration of 4 / (1 + x^2) over a slice of [0, 1].

use anyhow::ensure;
use applicator::{Algorithm, ApplicatorResult, CodecResult, MessageReader, MessageWriter};
use runtime_native::LocalApplicator;

pub const NAME: &str = "pi-quadrature";

/// Inputs `(start: f64, end: f64, steps: i32)`, outputs `(partial: f64, steps: i32)`.
#[derive(Debug, Default)]
pub struct QuadratureChunk {
    start: f64,
    end: f64,
    steps: i32,
    partial: f64,
}

/// Stages one chunk's inputs in the order [`QuadratureChunk::get`] takes them.
pub fn stage(app: &mut LocalApplicator, start: f64, end: f64, steps: i32) -> ApplicatorResult<()> {
    app.put(&start)?;
    app.put(&end)?;
    app.put(&steps)
}

impl Algorithm for QuadratureChunk {
    fn name(&self) -> &str {
        NAME
    }

    fn get(&mut self, input: &mut MessageReader) -> CodecResult<()> {
        self.start = input.get()?;
        self.end = input.get()?;
        self.steps = input.get()?;
        Ok(())
    }

    fn task(&mut self) -> anyhow::Result<()> {
        ensure!(self.steps > 0, "steps must be positive, got {}", self.steps);
        ensure!(
            self.end > self.start,
            "empty interval [{}, {}]",
            self.start,
            self.end
        );
        let h = (self.end - self.start) / f64::from(self.steps);
        self.partial = (0..self.steps)
            .map(|i| {
                let x = self.start + (f64::from(i) + 0.5) * h;
                4.0 / (1.0 + x * x)
            })
            .sum::<f64>()
            * h;
        Ok(())
    }

    fn put(&mut self, output: &mut MessageWriter) -> CodecResult<()> {
        output.put(&self.partial)?;
        output.put(&self.steps)
    }
}
