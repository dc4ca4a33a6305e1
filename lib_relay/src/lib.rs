// Declare the modules to re-export
pub mod aggregate;
pub mod decoder;
pub mod dispatcher;
pub mod errors;
pub mod session;

// Re-export the working surface
pub use aggregate::StateAggregator;
pub use decoder::decode_frame;
pub use dispatcher::Dispatcher;
pub use errors::{DecodeError, RelayError};
pub use session::Negotiation;
