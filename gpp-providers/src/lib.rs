//! Chat completion API clients for gpp
//!
//! The [`LLMProvider`] trait is what the session layer talks to;
//! [`OpenAiClient`] implements it for OpenAI, Azure OpenAI and compatible
//! local servers, selected through [`ApiTarget`].

pub mod base;
pub mod credentials;
pub mod openai;
pub mod target;

pub use base::{
    ChatCompletion, ChatRequest, FragmentStream, LLMProvider, ProviderError, ProviderResult,
    ResponseFragment,
};
pub use credentials::load_api_key;
pub use openai::{Auth, OpenAiClient};
pub use target::{ApiTarget, AzureConfig};
