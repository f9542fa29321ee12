mod client;
mod request;

pub use client::{wait_until_ready, Client, ClientError};
pub use request::RunRequest;
