pub mod archive;
pub mod cache;
pub mod commands;
pub mod error;
pub mod http;
pub mod install;
pub mod logger;
pub mod package;
pub mod resolver;
pub mod runtime;
pub mod source;
pub mod version;
