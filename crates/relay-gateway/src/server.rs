use crate::app::get_app;
use crate::state::GatewayState;
use std::future::Future;
use std::io;
use tokio::net::TcpListener;
use tracing::info;

/// Serve the gateway on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: GatewayState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Gateway listening");

    axum::serve(listener, get_app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Gateway stopped");
    Ok(())
}
