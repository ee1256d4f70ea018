//! Inference server access.

pub mod ollama;

pub use ollama::{
    GenerateFuture, GenerateRequest, ModelManager, OllamaClient, OllamaError, TextGenerator,
};
