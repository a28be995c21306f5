use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::feed::FeedPage;
use crate::client::feed_session::{FeedQuery, FeedSource};
use crate::client::session::{AuthBackend, SignUpRequest};
use crate::client::ClientError;
use crate::domain::session::TokenPair;
use crate::domain::user::{Profile, ProfilePatch};

/// Typed client for the HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignupBody<'a> {
    username: &'a str,
    email: &'a str,
    display_name: Option<&'a str>,
    password: &'a str,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url =
            Url::parse(base_url).map_err(|err| ClientError::Decode(format!("base url: {}", err)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            access_token: None,
        })
    }

    /// Returns a copy that authenticates feed requests with `token`.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ClientError::Decode(format!("url: {}", err)))?;
        Ok(self.http.request(method, url))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await.map_err(network_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ClientError> {
        let response = builder.send().await.map_err(network_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn network_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else {
        ClientError::Network(err.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorBody>(&body)
            .map(|body| body.error)
            .unwrap_or(body),
        Err(_) => status.to_string(),
    };

    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        StatusCode::FORBIDDEN if message.contains("early access") => ClientError::EarlyAccessClosed,
        _ => ClientError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl FeedSource for ApiClient {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<FeedPage, ClientError> {
        let mut params = vec![
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if !query.interests.is_empty() {
            let interests = query.interests.iter().cloned().collect::<Vec<_>>().join(",");
            params.push(("interests", interests));
        }

        let mut builder = self
            .request(Method::GET, &format!("feed/{}", query.mode))?
            .query(&params);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }
        self.send(builder).await
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Profile, ClientError> {
        let builder = self.request(Method::POST, "auth/signup")?.json(&SignupBody {
            username: &request.username,
            email: &request.email,
            display_name: request.display_name.as_deref(),
            password: &request.password,
        });
        self.send(builder).await
    }

    async fn sign_in(&self, identifier: &str, password: &str) -> Result<TokenPair, ClientError> {
        let builder = self
            .request(Method::POST, "auth/login")?
            .json(&Credentials {
                identifier,
                password,
            });
        self.send(builder).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let builder = self
            .request(Method::POST, "auth/refresh")?
            .json(&RefreshBody { refresh_token });
        self.send(builder).await
    }

    async fn sign_out(&self, refresh_token: &str) -> Result<(), ClientError> {
        let builder = self
            .request(Method::POST, "auth/logout")?
            .json(&RefreshBody { refresh_token });
        self.send_empty(builder).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, ClientError> {
        let builder = self
            .request(Method::GET, "auth/me")?
            .bearer_auth(access_token);
        self.send(builder).await
    }

    async fn update_profile(
        &self,
        access_token: &str,
        patch: &ProfilePatch,
    ) -> Result<Profile, ClientError> {
        let builder = self
            .request(Method::PATCH, "auth/me")?
            .bearer_auth(access_token)
            .json(patch);
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = ApiClient::new("https://api.example.com/v1").unwrap();
        assert_eq!(client.base_url.as_str(), "https://api.example.com/v1/");
        let url = client.base_url.join("feed/trending").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/feed/trending");
    }

    #[test]
    fn rejects_garbage_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
