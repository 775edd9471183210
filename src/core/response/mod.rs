use anyhow::{Context, Error};
use http::{
    header::{CONTENT_TYPE, LOCATION, SET_COOKIE},
    Response, StatusCode,
};
use serde_json::{Map, Value as Json};
use tracing::warn;
use url::Url;

use self::parameters::{IdToken, PresentationSubmission, State, VpToken};

use super::{error::RemoteError, jwe::ResponseEncryption, util::APPLICATION_JSON};

pub mod id_token;
pub mod parameters;

#[derive(Debug, Clone)]
pub enum AuthorizationResponse {
    Unencoded(UnencodedAuthorizationResponse),
    Jwt(JwtAuthorizationResponse),
}

impl AuthorizationResponse {
    /// Url-encoded form fields, in the order they are sent.
    pub fn form(&self) -> Result<Vec<(String, String)>, Error> {
        match self {
            Self::Unencoded(response) => response.form(),
            Self::Jwt(response) => Ok(response.form()),
        }
    }
}

/// Response parameters sent as plain form fields.
#[derive(Debug, Clone, Default)]
pub struct UnencodedAuthorizationResponse {
    pub id_token: Option<IdToken>,
    pub vp_token: Option<VpToken>,
    pub presentation_submission: Option<PresentationSubmission>,
    pub state: Option<State>,
}

impl UnencodedAuthorizationResponse {
    pub fn form(&self) -> Result<Vec<(String, String)>, Error> {
        let mut form = Vec::new();
        if let Some(id_token) = &self.id_token {
            form.push(("id_token".to_owned(), id_token.0.clone()));
        }
        if let Some(vp_token) = &self.vp_token {
            form.push(("vp_token".to_owned(), vp_token.form_value()));
        }
        if let Some(submission) = &self.presentation_submission {
            let submission = Json::try_from(submission.clone())?;
            form.push(("presentation_submission".to_owned(), submission.to_string()));
        }
        if let Some(state) = &self.state {
            form.push(("state".to_owned(), state.0.clone()));
        }
        Ok(form)
    }

    /// Encrypt every parameter except `state`, which stays in the clear.
    pub fn encrypt(self, encryption: &ResponseEncryption) -> Result<JwtAuthorizationResponse, Error> {
        let mut claims = Map::new();
        if let Some(id_token) = self.id_token {
            claims.insert("id_token".into(), id_token.into());
        }
        if let Some(vp_token) = self.vp_token {
            claims.insert("vp_token".into(), vp_token.into());
        }
        if let Some(submission) = self.presentation_submission {
            claims.insert("presentation_submission".into(), submission.try_into()?);
        }
        let response = encryption
            .encrypt(claims)
            .context("unable to encrypt authorization response")?;
        Ok(JwtAuthorizationResponse {
            response,
            state: self.state,
        })
    }
}

/// A `direct_post.jwt` response: the parameters travel inside a JWE.
#[derive(Debug, Clone)]
pub struct JwtAuthorizationResponse {
    pub response: String,
    pub state: Option<State>,
}

impl JwtAuthorizationResponse {
    pub fn form(&self) -> Vec<(String, String)> {
        let mut form = vec![("response".to_owned(), self.response.clone())];
        if let Some(state) = &self.state {
            form.push(("state".to_owned(), state.0.clone()));
        }
        form
    }
}

/// What the verifier answered to a posted response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResult {
    pub status: StatusCode,
    /// Where the user agent should go next, made absolute against the posted URL.
    pub location: Option<Url>,
    /// Raw `Set-Cookie` header values.
    pub cookies: Vec<String>,
}

impl PostResult {
    pub fn from_response(request_url: &Url, response: Response<Vec<u8>>) -> Result<Self, RemoteError> {
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(RemoteError::HttpStatus {
                url: request_url.to_string(),
                status,
                body: String::from_utf8(response.into_body()).ok(),
            });
        }

        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
            .collect();

        let location = if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| RemoteError::MissingLocation {
                    url: request_url.to_string(),
                })?;
            Some(absolute(request_url, location)?)
        } else if status == StatusCode::OK && is_json(&response) {
            match serde_json::from_slice::<Map<String, Json>>(response.body()) {
                Ok(body) => body
                    .get("redirect_uri")
                    .and_then(Json::as_str)
                    .map(|uri| absolute(request_url, uri))
                    .transpose()?,
                Err(e) => {
                    warn!(url = %request_url, "response body is not a JSON object: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            status,
            location,
            cookies,
        })
    }
}

fn is_json(response: &Response<Vec<u8>>) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(APPLICATION_JSON))
}

fn absolute(base: &Url, location: &str) -> Result<Url, RemoteError> {
    base.join(location)
        .map_err(|e| RemoteError::InvalidResponseBody {
            url: base.to_string(),
            reason: format!("invalid redirect location '{location}': {e}"),
        })
}
