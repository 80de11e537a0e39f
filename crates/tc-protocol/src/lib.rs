pub mod envelope;
pub mod extremes;
pub mod samples;
pub mod topics;

pub use envelope::Envelope;
pub use extremes::*;
pub use samples::*;
