pub mod support;

mod registration_tests;
mod setup_token_tests;
mod tls_tests;
