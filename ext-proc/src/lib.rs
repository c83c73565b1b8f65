//! Proxy-side handling of external processing.
//!
//! An [`Exchange`] drives a single request/response exchange through an external processor, as
//! configured by an effective policy's [`ExtProc`]. Each direction of the exchange sends headers
//! and, depending on the processing mode, body chunks to the processor, waiting at most the
//! configured message timeout for each response. Failures either fail the exchange or, when the
//! policy fails open, let the original traffic through unmodified.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod exchange;
mod processor;

#[cfg(test)]
mod tests;

pub use self::{
    exchange::{Error, Exchange, Failure, Outcome, State, DEFAULT_BUFFER_LIMIT},
    processor::{
        Direction, HeaderMutation, ImmediateResponse, Message, ProcessingRequest,
        ProcessingResponse, Processor, ProcessorError,
    },
};
pub use envoy_policy_controller_core::ExtProc;
