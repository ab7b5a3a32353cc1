//! Generation engine adapters

mod llama_server;

pub use llama_server::LlamaServerEngine;
