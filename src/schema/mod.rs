pub mod directive;
pub mod entity;
pub mod event;
pub mod path;
pub mod scenario;
pub mod scope;
pub mod transcript;
