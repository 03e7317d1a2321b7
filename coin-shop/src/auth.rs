use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use surge::prelude::*;
use tracing::{debug, error};

use crate::STATUS_IS_200;

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

/// Log in and return the bearer token.
///
/// Any failure, whether a non-200 status, an unreadable body or a transport error, is logged and
/// yields an empty token. There is no retry.
pub async fn get_auth_token(client: &Client, url: &str, credentials: &Credentials) -> String {
    let res = match authenticate(client, url, credentials).await {
        Ok(res) => res,
        Err(err) => {
            check(STATUS_IS_200, false);
            error!("Failed to get auth token: {err}");
            return String::new();
        }
    };

    if !check(STATUS_IS_200, res.status() == StatusCode::OK) {
        error!("Failed to get auth token: {}", res.status());
        return String::new();
    }

    match res.json::<AuthResponse>().await {
        Ok(AuthResponse { token }) => {
            debug!("Authenticated as {}", credentials.username);
            token
        }
        Err(err) => {
            error!("Failed to get auth token: {err}");
            String::new()
        }
    }
}

#[transaction]
async fn authenticate(
    client: &Client,
    url: &str,
    credentials: &Credentials,
) -> Result<Response, reqwest::Error> {
    client.post(url).json(credentials).send().await
}
