// Configuration module
//
// This module contains all configuration-related functionality split into focused submodules:
// - endpoints: The remote origin and local mount parsed from the command line
// - types: Settings and the resolved proxy configuration
// - loader: Settings file loading and saving
// - validator: Startup checks that warn or reject before anything is bound

pub mod endpoints;
pub mod loader;
pub mod types;
pub mod validator;

pub use endpoints::{LocalMount, RemoteOrigin, Scheme};
pub use types::{ProxyConfig, Settings};
