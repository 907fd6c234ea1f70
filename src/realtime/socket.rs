//! WebSocket endpoint for live viewers

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{future, SinkExt, StreamExt};

use super::manager::SessionManager;
use super::session::ClientFrame;

impl ClientFrame {
    /// Reduce an incoming WebSocket frame to what the session loop needs
    pub fn from_ws(frame: Result<Message, axum::Error>) -> Self {
        match frame {
            Ok(Message::Close(_)) | Err(_) => ClientFrame::Close,
            Ok(_) => ClientFrame::Ignored,
        }
    }
}

/// WebSocket upgrade handler
pub async fn live_handler(
    ws: WebSocketUpgrade,
    State(sessions): State<SessionManager>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, sessions))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, sessions: SessionManager) {
    let (sender, receiver) = socket.split();

    let sink = sender.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let incoming = receiver.map(ClientFrame::from_ws);

    sessions.open_session(sink, incoming).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frames() {
        assert_eq!(ClientFrame::from_ws(Ok(Message::Close(None))), ClientFrame::Close);
        assert_eq!(
            ClientFrame::from_ws(Ok(Message::Text("hello".to_string()))),
            ClientFrame::Ignored
        );
        assert_eq!(
            ClientFrame::from_ws(Ok(Message::Ping(vec![1]))),
            ClientFrame::Ignored
        );
        assert_eq!(
            ClientFrame::from_ws(Err(axum::Error::new("reset"))),
            ClientFrame::Close
        );
    }
}
