mod codec;
mod messages;
mod result;

pub use codec::{decode_array, encode_array, image_to_array, CodecError};
pub use messages::{
    ErrorDetail, ErrorResponse, FieldIssue, HealthStatus, SampleImagesResponse, ServerInfo,
    ServicesResponse,
};
pub use result::{AlgorithmResult, EncodedResult, Metadata, MetadataValue, ResultKind};
