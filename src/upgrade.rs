//! Accepting connections through a hyper HTTP/1.1 upgrade.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use http_body_util::Full;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tracing::debug;

use crate::conn::Conn;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::options::{Options, UpgradeOptions};

/// Connection produced by [`new_server_conn_with_http`].
pub type UpgradedConn = Conn<TokioIo<Upgraded>>;

/// A refused upgrade: the response to send back and why.
#[derive(Debug)]
pub struct UpgradeRejection {
    pub response: Response<Full<Bytes>>,
    pub error: Error,
}

impl fmt::Display for UpgradeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upgrade rejected with {}: {}", self.response.status(), self.error)
    }
}

impl std::error::Error for UpgradeRejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// An accepted upgrade waiting for the HTTP layer to hand over the stream.
///
/// Resolves once the `101` response has been written by hyper.
pub struct PendingConn {
    upgrade: OnUpgrade,
    options: Options,
    timeout: Duration,
}

impl fmt::Debug for PendingConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConn")
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for PendingConn {
    type Output = Result<UpgradedConn>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let upgraded = if self.timeout.is_zero() {
                self.upgrade.await?
            } else {
                tokio::time::timeout(self.timeout, self.upgrade)
                    .await
                    .map_err(|_| Error::HandshakeTimeout)??
            };
            Ok(Conn::new(
                TokioIo::new(upgraded),
                Role::Server,
                &self.options,
                false,
            ))
        })
    }
}

/// Accept a WebSocket upgrade on a hyper server request.
///
/// On success, return the `101 Switching Protocols` response from the
/// service and await the [`PendingConn`] (typically in a spawned task) to
/// get the connection. Headers in `response_header` are added to the
/// response. `options` defaults to [`UpgradeOptions::default`].
///
/// The hyper connection must be served with `with_upgrades()`.
///
/// # Errors
///
/// An [`UpgradeRejection`] whose response (built by the `error` callback
/// when one is set) should be returned as is.
pub fn new_server_conn_with_http<B>(
    request: &mut Request<B>,
    response_header: Option<&HeaderMap>,
    options: Option<UpgradeOptions>,
) -> std::result::Result<(Response<Full<Bytes>>, PendingConn), UpgradeRejection> {
    let options = options.unwrap_or_default();
    let head = request_head(request);

    let handshake = match options.upgrader().upgrade(&head, response_header) {
        Ok(handshake) => handshake,
        Err(rejection) => {
            debug!(
                status = %rejection.status,
                error = %rejection.error,
                uri = %head.uri(),
                "websocket upgrade rejected"
            );
            let response = options.error_response(&head, rejection.status, &rejection.error);
            return Err(UpgradeRejection {
                response,
                error: rejection.error,
            });
        }
    };

    debug!(
        uri = %head.uri(),
        subprotocol = handshake.subprotocol.as_deref().unwrap_or(""),
        compression = handshake.compression,
        "websocket upgrade accepted"
    );

    let pending = PendingConn {
        upgrade: hyper::upgrade::on(request),
        options: options.negotiated(handshake.subprotocol, handshake.compression),
        timeout: options.handshake_timeout,
    };
    let response = handshake.response.map(|()| Full::new(Bytes::new()));
    Ok((response, pending))
}

/// Copy of the request without its body.
fn request_head<B>(request: &Request<B>) -> Request<()> {
    let mut head = Request::new(());
    *head.method_mut() = request.method().clone();
    *head.uri_mut() = request.uri().clone();
    *head.version_mut() = request.version();
    *head.headers_mut() = request.headers().clone();
    head
}
