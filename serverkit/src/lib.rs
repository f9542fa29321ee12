pub mod algorithm;
pub mod config;
pub mod error;
pub mod parity;
pub mod routes;
pub mod samples;
pub mod schema;
pub mod server;
pub mod threshold;

pub use algorithm::{Algorithm, AlgorithmError};
pub use schema::{ParamValue, ParamValues, ParameterSchema, ParameterSpec, ValidationError};
pub use server::{build_router, start_server, AlgorithmServer, HttpServer};
pub use threshold::{ModelName, ThresholdAlgorithm, ThresholdParams};
