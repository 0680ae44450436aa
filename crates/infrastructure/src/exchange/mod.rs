//! Backend token exchange over HTTP.

mod reqwest_transport;

pub use reqwest_transport::{ReqwestExchangeTransport, TOKEN_ENDPOINT_PATH, TransportSetupError};
