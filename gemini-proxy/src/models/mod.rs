pub mod request;
pub mod response;

pub use request::{prompt_len, IncomingRequest, PromptPayload, MAX_PROMPT_CHARS};
pub use response::{ErrorDescriptor, ErrorType, OutgoingResponse, SuccessBody};
