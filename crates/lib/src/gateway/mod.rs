//! Gateway: HTTP control plane for the command executor and background supervisor.
//!
//! JSON in, JSON out. No business logic beyond marshaling and status-code selection.

mod protocol;
mod server;

pub use protocol::{
    BackgroundRequest, BackgroundResponse, ErrorResponse, ExecuteRequest, HealthResponse,
    OutputQuery, ProcessResponse,
};
pub use server::{router, run_gateway, GatewayState};
