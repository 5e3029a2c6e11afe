//! Shared plumbing for the HTTP collaborator clients.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::error::{DeployError, DeployResult};
use crate::types::AuthToken;

const MAX_ERROR_BODY: usize = 512;

/// Build a client with the configured request timeout.
pub(crate) fn client(timeout: Duration) -> DeployResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Normalise a configured base URL.
pub(crate) fn base_url(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_owned()
}

/// Attach the user's bearer token.
pub(crate) fn authorize(request: RequestBuilder, token: &AuthToken) -> RequestBuilder {
    request.bearer_auth(token.expose())
}

/// Success, not-found, or anything else.
pub(crate) enum Classified {
    Ok(Response),
    NotFound,
}

/// Classify a response; statuses other than success and 404 become
/// [`DeployError::UnexpectedStatus`].
pub(crate) async fn classify(service: &'static str, response: Response) -> DeployResult<Classified> {
    let status = response.status();
    if status.is_success() {
        return Ok(Classified::Ok(response));
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(Classified::NotFound);
    }
    Err(unexpected(service, response).await)
}

/// Require a success status.
pub(crate) async fn expect_success(
    service: &'static str,
    response: Response,
) -> DeployResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(unexpected(service, response).await)
    }
}

pub(crate) async fn unexpected(service: &'static str, response: Response) -> DeployError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    DeployError::UnexpectedStatus {
        service,
        status,
        body,
    }
}
