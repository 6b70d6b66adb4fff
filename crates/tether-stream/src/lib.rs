pub mod consumer;
pub mod trace;
pub mod transport;

pub use consumer::*;
pub use trace::*;
pub use transport::*;
