pub mod authorization_request;
pub mod credential_format;
pub mod dcql_query;
pub mod error;
pub mod input_descriptor;
pub mod jwe;
pub mod matching;
pub mod object;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod query;
pub mod response;
pub mod sd_jwt;
pub mod signer;
pub mod submission;
pub mod util;
