pub mod errors;
pub mod ids;
pub mod transport;

pub use errors::{Delivery, HubError};
pub use ids::DeviceId;
pub use transport::{MessageTransport, TransportError, TransportRead, TransportWrite};
