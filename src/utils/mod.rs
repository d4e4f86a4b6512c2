//! The `utils` module holds the pieces shared by every layer of `topicast`:
//! the error taxonomy and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{BrokerError, ClientError, DeliveryError};
