use reqwest::header::{HeaderMap, USER_AGENT};
use serde_json::Value;
use tracing::warn;

use crate::core::parse_api_version;
use crate::data::Method;
use crate::effects::{Session, SessionContext, WireBody, WireRequest, bind};
use crate::effects::request::header_value;
use crate::error::{Error, Result};

/// Server-wide information.
#[derive(Debug)]
pub struct System<'s, S: Session> {
    session: &'s S,
}

fn field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::protocol(format!("server information has no {key:?} field")))
}

async fn root_info(ctx: SessionContext) -> Result<Value> {
    ctx.request(Method::Get, "/").fetch().await?.json().await
}

/// GET the unversioned endpoint root and pick the lower of the two versions.
async fn negotiate(ctx: SessionContext) -> Result<String> {
    let config = ctx.config();
    let client_version = parse_api_version(config.api_version())?;

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_value(config.agent())?);
    let request = WireRequest {
        method: Method::Get,
        url: config.endpoint().clone(),
        headers,
        body: WireBody::Empty,
    };

    let reply = async {
        let wire = ctx.transport().send(request).await?;
        let response = crate::effects::Response::from_wire(wire, HeaderMap::new()).await?;
        response.json::<Value>().await
    };
    let info = match reply.await {
        Ok(info) => info,
        Err(error @ (Error::Transport { .. } | Error::Api(_))) => {
            warn!(%error, "API version negotiation failed; using the configured version");
            return Ok(config.api_version().to_string());
        }
        Err(error) => return Err(error),
    };

    let server_version = parse_api_version(&field(&info, "version")?)
        .map_err(|e| Error::protocol(format!("server reported {e}")))?;
    if server_version > client_version {
        warn!(
            server = %server_version,
            client = %client_version,
            "server API version is newer than the client"
        );
    }
    Ok(std::cmp::min(server_version, client_version).to_string())
}

impl<'s, S: Session> System<'s, S> {
    pub(crate) fn new(session: &'s S) -> Self {
        Self { session }
    }

    /// Raw server information from the API root.
    pub fn hello(&self) -> S::Output<Value> {
        bind(self.session, root_info)
    }

    pub fn manager_version(&self) -> S::Output<String> {
        bind(self.session, |ctx| async move { field(&root_info(ctx).await?, "manager") })
    }

    pub fn api_version(&self) -> S::Output<String> {
        bind(self.session, |ctx| async move { field(&root_info(ctx).await?, "version") })
    }

    /// The API version both sides understand: the lower of the configured
    /// and the server-reported version. Falls back to the configured version
    /// when the server cannot be reached or answers with an error.
    pub fn negotiate_api_version(&self) -> S::Output<String> {
        bind(self.session, negotiate)
    }
}
