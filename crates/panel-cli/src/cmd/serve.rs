use crate::context::Context;
use panel_server::AppState;

pub fn run(ctx: Context, port: Option<u16>, open: bool) -> anyhow::Result<()> {
    let port = port.unwrap_or(ctx.settings.server.port);
    let state = AppState::new(ctx.settings);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!("runner panel API on http://localhost:{actual_port}/api/server-status");

        tokio::select! {
            res = panel_server::serve_on(state, listener, open) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
