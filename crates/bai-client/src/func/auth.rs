use reqwest::header::SET_COOKIE;
use serde::Serialize;
use serde_json::Value;

use crate::data::Method;
use crate::effects::{Session, bind};

/// Outcome of [`Auth::login`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoginResult {
    pub authenticated: bool,
    pub username: String,
    /// The full response body.
    pub data: Value,
    /// Raw `Set-Cookie` values of the web session.
    pub cookies: Vec<String>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// Web-session login for endpoints that sit behind a session proxy.
#[derive(Debug)]
pub struct Auth<'s, S: Session> {
    session: &'s S,
}

impl<'s, S: Session> Auth<'s, S> {
    pub(crate) fn new(session: &'s S) -> Self {
        Self { session }
    }

    /// Log in with a user ID and password. The request is sent unsigned.
    pub fn login(&self, user_id: &str, password: &str) -> S::Output<LoginResult> {
        let user_id = user_id.to_owned();
        let password = password.to_owned();
        bind(self.session, move |ctx| async move {
            let mut request = ctx.request(Method::Post, "/server/login");
            request.set_json(&Credentials { username: &user_id, password: &password })?;
            let response = request.fetch_anonymous().await?;
            let cookies = response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok().map(str::to_owned))
                .collect();
            let data: Value = response.json().await?;
            Ok(LoginResult {
                authenticated: data.get("authenticated").and_then(Value::as_bool).unwrap_or(false),
                username: user_id,
                data,
                cookies,
            })
        })
    }

    /// Clear the server-side web session.
    pub fn logout(&self) -> S::Output<()> {
        bind(self.session, |ctx| async move {
            ctx.request(Method::Post, "/server/logout").fetch().await?;
            Ok(())
        })
    }
}
