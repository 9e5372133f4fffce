// Proxy module
//
// This module contains all reverse proxy functionality split into focused submodules:
// - url_space: Pure mapping between local paths and remote URLs
// - request_handler: Request/response rewriting around the forwarder
// - forwarder: Upstream HTTP(S) client, hop-by-hop headers and WebSocket tunnelling
// - http_server: Plain HTTP listener
// - https_server: TLS listener using a certificate from the cache

pub mod forwarder;
pub mod http_server;
pub mod https_server;
pub mod request_handler;
pub mod url_space;

pub use request_handler::{LocationRewrite, ProxyHandler};
