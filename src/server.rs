use std::fs;
use std::io::Read;
use std::net::SocketAddr;

use tiny_http::{Header, Request, Response, Server, SslConfig};
use tracing::{debug, error, warn};

use crate::config::TlsConfig;
use crate::decode::STRFAIL;
use crate::engine::StoreEngine;
use crate::executor::Executor;
use crate::handlers::Endpoint;
use crate::thread_pool::ThreadPool;
use crate::{KsError, Result};

/// largest request body that is accepted, in bytes
pub const MAX_BODY: usize = 1024;
/// longest request path that is accepted, in bytes
pub const MAX_URI: usize = 100;
/// content type of every response
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// The status code and JSON body to send back for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code
    pub status: u16,
    /// response body
    pub body: String,
}

impl HttpReply {
    fn fail(status: u16) -> Self {
        HttpReply { status, body: STRFAIL.to_string() }
    }
}

/// The HTTP independent half of the server: maps a method, url and body to a reply.
///
/// | outcome                                                   | status |
/// |-----------------------------------------------------------|--------|
/// | store answered (success, FAIL or NOFOUND envelope)        | 200    |
/// | unknown path or method, oversized body, unacceptable JSON | 404    |
/// | store unreachable                                         | 503    |
/// | command could not be built                                | 500    |
#[derive(Clone, Debug)]
pub struct Gateway<E: StoreEngine> {
    exec: Executor<E>,
}

impl<E: StoreEngine> Gateway<E> {
    /// creates a gateway that runs its requests through `exec`
    pub fn new(exec: Executor<E>) -> Self {
        Gateway { exec }
    }

    /// serves one request
    pub fn dispatch(&self, method: &str, url: &str, body: &[u8]) -> HttpReply {
        let path = url.split('?').next().unwrap_or_default();
        if path.len() > MAX_URI {
            debug!(len = path.len(), "request path too long");
            return HttpReply::fail(404);
        }
        if body.len() > MAX_BODY {
            debug!(%path, "request body too large");
            return HttpReply::fail(404);
        }
        let endpoint = match Endpoint::route(method, path) {
            Some(endpoint) => endpoint,
            None => {
                debug!(%method, %path, "no such endpoint");
                return HttpReply::fail(404);
            }
        };

        match endpoint.handle(&self.exec, body) {
            Ok(outcome) => HttpReply { status: 200, body: outcome.into_body() },
            Err(e @ KsError::Json(_)) | Err(e @ KsError::InvalidRequest(_)) => {
                debug!(?endpoint, "rejected request body: {}", e);
                HttpReply::fail(404)
            }
            Err(e @ KsError::Unavailable(_)) => {
                warn!(?endpoint, "{}", e);
                HttpReply::fail(503)
            }
            Err(e) => {
                error!(?endpoint, "{}", e);
                HttpReply::fail(500)
            }
        }
    }
}

/// Binds the HTTP listener, serving HTTPS when a certificate is configured
///
/// # Errors
/// returns an error if the certificate or key can not be read, or if the address can not be
/// bound
pub fn bind(addr: SocketAddr, tls: &TlsConfig) -> Result<Server> {
    let server = match &tls.certificate {
        Some(cert) => {
            let certificate = fs::read(cert)?;
            let private_key = fs::read(tls.private_key.as_ref().unwrap_or(cert))?;
            Server::https(addr, SslConfig { certificate, private_key })
        }
        None => Server::http(addr),
    };
    server.map_err(|e| KsError::StringErr(format!("could not listen on {}: {}", addr, e)))
}

/// An HTTP server over a [`Gateway`].
///
/// Each request that comes in is handed to a thread from the [`ThreadPool`], which reads the
/// body, dispatches it through the gateway and writes the reply.
pub struct GatewayServer<E: StoreEngine, P: ThreadPool> {
    gateway: Gateway<E>,
    /// a pool of threads that will serve requests using a handle to the gateway
    pool: P,
}

impl<E: StoreEngine, P: ThreadPool> GatewayServer<E, P> {
    /// Create a new `GatewayServer` using the given [`Gateway`] and [`ThreadPool`] implementation.
    pub fn new(gateway: Gateway<E>, pool: P) -> Self {
        GatewayServer { gateway, pool }
    }

    /// serves requests arriving on `server` until it is shut down
    pub fn run(self, server: Server) -> Result<()> {
        for request in server.incoming_requests() {
            let gateway = self.gateway.clone();
            self.pool.spawn(move || {
                if let Err(e) = serve(&gateway, request) {
                    error!("Error on serving client: {}", e);
                }
            });
        }
        Ok(())
    }
}

/// reads at most one byte more than [`MAX_BODY`], so oversized bodies can be told apart
fn serve<E: StoreEngine>(gateway: &Gateway<E>, mut request: Request) -> Result<()> {
    let mut body = Vec::new();
    request.as_reader().take(MAX_BODY as u64 + 1).read_to_end(&mut body)?;

    let reply = gateway.dispatch(request.method().as_str(), request.url(), &body);
    debug!(
        peer = ?request.remote_addr(),
        method = %request.method(),
        url = %request.url(),
        status = reply.status,
        "request served"
    );

    let content_type = Header::from_bytes(&b"Content-Type"[..], CONTENT_TYPE.as_bytes())
        .map_err(|_| KsError::StringErr("invalid content type header".to_string()))?;
    let response = Response::from_data(reply.body.into_bytes())
        .with_status_code(reply.status)
        .with_header(content_type);
    request.respond(response)?;
    Ok(())
}
