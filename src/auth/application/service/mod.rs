pub mod api_token_service;
pub mod login_service;
pub mod setup_token_service;
