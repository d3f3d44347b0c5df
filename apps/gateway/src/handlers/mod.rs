//! Handler modules
//!
//! Every inbound request goes through [`handle_forwarding`]; the response
//! module shapes what comes back from the origin or the downstream tier.

pub mod forwarding;
pub mod response;


pub use forwarding::handle_forwarding;
pub use response::{ProxyBody, ProxyResponse, ResponseShaping, relay_response, shape_origin_response};
