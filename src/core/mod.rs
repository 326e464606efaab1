pub mod cache;
pub mod compare;
pub mod config;
pub mod directives;
pub mod document;
pub mod engine;
pub mod events;
pub mod hash;
pub mod layout;
pub mod literal;
pub mod model;
pub mod processing;
pub mod reader;
pub mod replay;
pub mod store;
pub mod sync;
pub mod timer;
pub mod tokenizer;
pub mod writer;
