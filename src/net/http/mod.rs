mod client;
mod deadline;

pub use client::{HttpResponse, HttpsClient};
pub(crate) use client::connect_within;
pub(crate) use deadline::{timeout_aware, RequestDeadline};
