pub mod common;

mod credential_refresh;
mod gateway_http;
