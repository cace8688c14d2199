// Provider clients and the manager that routes between them

pub mod provider_handle;
pub mod provider_base;
pub mod claude;
pub mod openrouter;

pub mod gemini;
pub mod openai;
