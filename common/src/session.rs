//! Session credentials attached to every request of a test run.
use reqwest::{
    header::COOKIE,
    Client, RequestBuilder, Url,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Name of the platform's session cookie.
pub const SESSION_COOKIE: &str = "R_SESS";

const LOGIN_PATH: &str = "/v3-public/localProviders/local?action=login";

/// Credentials presented to the platform. Cloned freely and never modified
/// once a run starts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Session {
    /// No credentials.
    #[default]
    Anonymous,
    /// Value of the `R_SESS` session cookie.
    Cookie(String),
    /// Bearer token sent in the `Authorization` header.
    Bearer(String),
}

/// Errors establishing a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The login request could not be sent.
    #[error("login request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The login endpoint refused the credentials.
    #[error("login returned status {0}")]
    Status(u16),
    /// The login response did not set the session cookie.
    #[error("login response carries no {SESSION_COOKIE} cookie")]
    MissingCookie,
    /// The base URL cannot be combined with the login path.
    #[error("invalid login url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    description: &'a str,
    response_type: &'a str,
    username: &'a str,
    password: &'a str,
}

impl Session {
    /// Attach the credentials to a request.
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Session::Anonymous => builder,
            Session::Cookie(value) => builder.header(COOKIE, format!("{SESSION_COOKIE}={value}")),
            Session::Bearer(token) => builder.bearer_auth(token),
        }
    }

    /// Pick credentials the way the load tests always have: an explicit session
    /// token wins, then a username/password login, else no credentials.
    pub async fn resolve(
        client: &Client,
        base: &Url,
        token: Option<&str>,
        credentials: Option<(&str, &str)>,
    ) -> Result<Self, SessionError> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            debug!("using provided session token");
            return Ok(Session::Cookie(token.to_owned()));
        }
        if let Some((username, password)) = credentials {
            return login(client, base, username, password).await;
        }
        debug!("no credentials, running anonymously");
        Ok(Session::Anonymous)
    }
}

/// Log in through the local authentication provider and return the session
/// cookie it sets.
#[tracing::instrument(skip(client, password))]
pub async fn login(
    client: &Client,
    base: &Url,
    username: &str,
    password: &str,
) -> Result<Session, SessionError> {
    let url = Url::parse(&format!(
        "{}{}",
        base.as_str().trim_end_matches('/'),
        LOGIN_PATH
    ))?;
    let resp = client
        .post(url)
        .json(&LoginRequest {
            description: "UI session",
            response_type: "cookie",
            username,
            password,
        })
        .send()
        .await?;
    if resp.status().as_u16() != 200 {
        return Err(SessionError::Status(resp.status().as_u16()));
    }
    let cookie = resp
        .cookies()
        .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_owned())
        .ok_or(SessionError::MissingCookie)?;
    info!("logged in");
    Ok(Session::Cookie(cookie))
}
