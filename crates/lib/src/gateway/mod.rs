//! Gateway: Slack-facing HTTP surface and inbound dispatch.
//!
//! Single POST endpoint. Every request is answered within Slack's deadline; generation work
//! is scheduled on the fulfillment worker and delivered out-of-band.

mod dispatch;
mod protocol;
mod server;
mod signature;

pub use dispatch::{Dispatched, Dispatcher, Reply};
pub use protocol::{parse_command_form, parse_json_payload, InboundPayload, SlackEvent};
pub use server::{build_state, router, run_gateway, GatewayState};
pub use signature::{sign, SIGNATURE_HEADER, TIMESTAMP_HEADER};
