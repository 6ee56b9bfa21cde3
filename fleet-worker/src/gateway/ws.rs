use crate::gateway::events::EventBroadcaster;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Streams task lifecycle events to a websocket observer until either side
/// closes the connection.
pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    broadcaster: web::Data<Arc<EventBroadcaster>>,
) -> actix_web::Result<HttpResponse> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let mut events = broadcaster.subscribe();

    log::info!("[WS] Observer connected ({} total)", broadcaster.subscriber_count());

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(p) => p,
                            Err(e) => {
                                log::warn!("[WS] Failed to serialize event: {}", e);
                                continue;
                            }
                        };
                        if session.text(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[WS] Observer lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                msg = msg_stream.next() => match msg {
                    Some(Ok(actix_ws::Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(actix_ws::Message::Close(reason))) => {
                        log::info!("[WS] Observer closed connection");
                        let _ = session.close(reason).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("[WS] Protocol error: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }
        let _ = session.close(None).await;
    });

    Ok(response)
}
