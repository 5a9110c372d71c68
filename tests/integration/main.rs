//! Integration tests for the HTTP surface and the WebSocket transport.

mod helpers;
mod http_test;
mod ws_test;
