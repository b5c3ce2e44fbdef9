use serde::Deserialize;

/// Body of `PUT /user`; absent fields are left as they are.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}
