//! Customer aggregate service and its inputs.

mod commands;
mod service;

pub use commands::CustomerDetails;
pub use service::CustomerService;
