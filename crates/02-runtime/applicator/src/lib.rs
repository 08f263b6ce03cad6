//! Master/worker task distribution over a point-to-point [`Transport`].
//!
//! One [`Applicator`] exists per process. Rank 0 is the controller: it stages
//! inputs with `put`, reserves a worker with `next_avail_process`, sends the
//! work with `apply` and later reads results with `get`. Every other rank
//! registers one [`Algorithm`] and calls `serve`, which answers dispatches
//! until the controller shuts down.
//!
//! ```text
//! controller                         worker r
//! next_avail_process -> Assigned(r)
//! put(a), put(b)
//! apply ----- DATA [a, b] ---------> get(a), get(b)
//!       ----- RUN  {dispatch} ----->  task()
//!                                     put(x)
//! get(x) <--- DATA [x] -------------
//!        <--- DONE {dispatch} ------
//! ```
//!
//! [`Transport`]: transport::Transport

mod algorithm;
mod applicator;
mod config;
mod dispatcher;
mod error;
mod registry;
mod worker;

pub use algorithm::{Algorithm, WorkerState};
pub use applicator::Applicator;
pub use config::{ApplicatorConfig, ConfigArgs};
pub use dispatcher::Assignment;
pub use error::{ApplicatorError, ApplicatorResult};
pub use registry::{ProcessRegistry, ProcessState, RegistryView, Role};
pub use worker::ServeSummary;

pub use transport_codecs::{
    ArrayD, CodecError, CodecResult, Complex32, Complex64, Decode, Encode, IxDyn, MessageReader,
    MessageWriter, Value,
};
