//! The initialize/initialized handshake.
//!
//! The client sends `initialize` with its preferred protocol version and
//! capabilities; the server echoes a supported version or counter-offers its
//! own. A client that cannot live with the counter-offer fails the
//! handshake. After accepting, the client emits `notifications/initialized`.

use crate::engine::Protocol;
use crate::options::RequestOptions;
use mcpflow_core::capability::{
    is_version_supported, negotiate_version, Implementation, InitializeParams, InitializeResult,
};
use mcpflow_core::error::{codes, McpError};
use mcpflow_core::methods::{methods, notifications};
use mcpflow_transport::Transport;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

impl<T: Transport + 'static> Protocol<T> {
    /// Run the client side of the handshake.
    ///
    /// Sends `initialize` advertising this protocol's capabilities, verifies
    /// the server's selected version, records the peer's capabilities, and
    /// emits `notifications/initialized`.
    pub async fn initialize(
        &self,
        client_info: Implementation,
    ) -> Result<InitializeResult, McpError> {
        let params = InitializeParams::new(client_info, self.options().capabilities.clone());
        debug!(
            protocol_version = %params.protocol_version,
            "initializing connection"
        );
        let result: InitializeResult = self
            .request(
                methods::INITIALIZE,
                Some(serde_json::to_value(&params)?),
                RequestOptions::new(),
            )
            .await?;

        if !is_version_supported(&result.protocol_version) {
            return Err(McpError::protocol(
                codes::INVALID_REQUEST,
                format!(
                    "server selected unsupported protocol version {}",
                    result.protocol_version
                ),
            ));
        }

        self.set_peer(result.capabilities.clone(), result.server_info.clone());
        self.notify(notifications::INITIALIZED, None).await?;
        debug!(
            server = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "initialization complete"
        );
        Ok(result)
    }

    /// Install the server side of the handshake.
    ///
    /// Registers the `initialize` handler (version negotiation, peer
    /// capability capture) and a logging `notifications/initialized`
    /// handler.
    pub fn serve(
        &self,
        server_info: Implementation,
        instructions: Option<String>,
    ) -> Result<(), McpError> {
        let protocol = self.clone();
        let server_info = Arc::new(server_info);
        let handler: crate::engine::RequestHandlerFn<T> = Arc::new(move |req, _ctx| {
            let protocol = protocol.clone();
            let server_info = Arc::clone(&server_info);
            let instructions = instructions.clone();
            Box::pin(async move {
                let raw = req
                    .params
                    .clone()
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                let params: InitializeParams = serde_json::from_value(raw).map_err(|err| {
                    McpError::invalid_params(format!("invalid initialize params: {err}"))
                })?;

                let negotiated = negotiate_version(&params.protocol_version);
                debug!(
                    client = %params.client_info.name,
                    requested = %params.protocol_version,
                    negotiated,
                    "initialize received"
                );
                protocol.set_peer(params.capabilities, params.client_info);

                let mut result = InitializeResult::new(
                    (*server_info).clone(),
                    protocol.options().capabilities.clone(),
                );
                result.protocol_version = negotiated.to_string();
                result.instructions = instructions;
                serde_json::to_value(result).map_err(McpError::from)
            })
        });
        self.set_request_handler_raw(methods::INITIALIZE, handler)?;

        self.set_notification_handler(
            notifications::INITIALIZED,
            |_params: Value| async move {
                debug!("peer initialized");
                Ok(())
            },
        )?;
        Ok(())
    }
}
