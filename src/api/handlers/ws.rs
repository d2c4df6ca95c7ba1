// src/api/handlers/ws.rs
use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::session::{SessionState, SessionView};

/// Pushed to every connected page on each session transition.
#[derive(Message, Clone, Serialize)]
#[rtype(result = "()")]
pub struct SessionUpdate {
    pub session_id: Uuid,
    pub state: SessionState,
    pub file_name: Option<String>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SessionUpdate {
    pub fn from_view(session_id: Uuid, view: &SessionView) -> Self {
        Self {
            session_id,
            state: view.state,
            file_name: view.file_name.clone(),
            message: view.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Default)]
pub struct WsBroker {
    clients: Arc<RwLock<Vec<Addr<WsConnection>>>>,
}

impl WsBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, addr: Addr<WsConnection>) {
        let mut clients = self.clients.write().await;
        clients.push(addr);
    }

    pub async fn unregister(&self, addr: &Addr<WsConnection>) {
        let mut clients = self.clients.write().await;
        clients.retain(|c| c != addr);
    }

    /// Sends `msg` to every live page and forgets connections that have gone away.
    pub async fn broadcast(&self, msg: SessionUpdate) {
        let mut clients = self.clients.write().await;
        clients.retain(|c| c.connected());
        for client in clients.iter() {
            client.do_send(msg.clone());
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

pub struct WsConnection {
    broker: WsBroker,
}

impl WsConnection {
    pub fn new(broker: WsBroker) -> Self {
        Self { broker }
    }
}

impl Actor for WsConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        let broker = self.broker.clone();
        actix::spawn(async move {
            broker.register(addr).await;
        });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        let broker = self.broker.clone();
        actix::spawn(async move {
            broker.unregister(&addr).await;
        });
    }
}

/// Pages only listen; anything they send besides control frames is ignored.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                debug!("Ignoring inbound frame on push-only update socket");
            }
            Ok(_) => (),
            Err(e) => {
                warn!("WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

impl Handler<SessionUpdate> for WsConnection {
    type Result = ();

    fn handle(&mut self, msg: SessionUpdate, ctx: &mut Self::Context) {
        if let Ok(json) = serde_json::to_string(&msg) {
            ctx.text(json);
        }
    }
}

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    broker: web::Data<WsBroker>,
) -> Result<HttpResponse, Error> {
    let conn = WsConnection::new(broker.get_ref().clone());
    ws::start(conn, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Modality, SelectedFile};
    use crate::session::Session;

    #[test]
    fn update_mirrors_view() {
        let mut session = Session::new();
        session.select_file(SelectedFile::new("scan.nii", b"volume".to_vec()).unwrap());
        session.set_options(Modality::T2, None).unwrap();
        let id = Uuid::new_v4();

        let update = SessionUpdate::from_view(id, &session.view());
        assert_eq!(update.session_id, id);
        assert_eq!(update.state, SessionState::Idle);
        assert_eq!(update.file_name.as_deref(), Some("scan.nii"));
        assert!(update.message.is_none());
    }

    #[actix_rt::test]
    async fn broadcast_without_pages_is_a_no_op() {
        let broker = WsBroker::new();
        let update = SessionUpdate::from_view(Uuid::new_v4(), &Session::new().view());
        broker.broadcast(update).await;
        assert_eq!(broker.client_count().await, 0);
    }
}
