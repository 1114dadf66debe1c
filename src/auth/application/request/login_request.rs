use serde::Serialize;

/// Body of `POST /access/ticket`. The user name carries its realm.
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}
