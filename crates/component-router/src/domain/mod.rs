//! Domain layer: requests, addresses, the directory protocol and errors.

pub mod address;
pub mod config;
pub mod directory;
pub mod error;
pub mod request;

pub use address::{ComponentAddress, Endpoint};
pub use config::{ConfigError, DirectoryConfig, RouterConfig};
pub use directory::{DirectoryReply, LookupTable, ReplyError};
pub use error::{codes, ErrorMessages, RequestFailure, RouterError};
pub use request::{PendingRequest, RequestId, RequestParams, Response};
