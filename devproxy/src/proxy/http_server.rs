use crate::error::{Error, Result};
use crate::proxy::request_handler::ProxyHandler;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request};
use log::info;
use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Bind the listening socket. Nothing else is started here.
pub fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Serve plain HTTP on an already-bound listener until `shutdown` resolves.
pub async fn serve(listener: TcpListener, handler: Arc<ProxyHandler>, shutdown: impl Future<Output = ()>) -> Result<()> {
    let addr = listener.local_addr()?;

    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let remote_addr = conn.remote_addr().ip();
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler.serve(remote_addr, req).await) }
            }))
        }
    });

    let server = hyper::Server::from_tcp(listener)?.serve(make_svc).with_graceful_shutdown(shutdown);

    info!("Reverse Proxy Server running on http://{}", addr);

    server.await?;
    Ok(())
}
