//! # Interview WebSocket Handler
//!
//! Connection boundary between actix and the session core. Clients connect to
//! `/ws/interview/{client_id}?type=technical&difficulty=medium&topic=...`.
//!
//! ## Upgrade:
//! Query parameters are validated and a registry slot is reserved *before* the
//! handshake, so a bad category (400), a duplicate id (409) or a full server (503)
//! is refused with a plain HTTP response.
//!
//! ## Actor Model:
//! Each connection is an [`InterviewWebSocket`] actor. It does not interpret frames
//! itself:
//! - **client → session**: text and binary frames are forwarded into an unbounded
//!   channel that the session's inbound handler reads as a stream
//! - **session → client**: the outbound delivery writes through [`ActorSink`], which
//!   sends a `SendText` message to this actor
//! - **stop**: dropping the forwarding channel and closing the [`SessionHandle`]
//!   ends the session, including a generator call still in flight
//!
//! ## Heartbeat:
//! The actor pings every `session.heartbeat_interval_secs` and drops a client that
//! stays silent for `session.client_timeout_secs`.

use crate::error::{AppError, AppResult};
use crate::interview::SessionParams;
use crate::session::{ClientSink, InboundFrame, SessionError, SessionHandle, SessionSupervisor};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// Message for writing one text frame to the client.
#[derive(Message)]
#[rtype(result = "()")]
struct SendText(String);

/// Message sent by the session task once the session has ended.
#[derive(Message)]
#[rtype(result = "()")]
struct SessionFinished;

/// Writes outbound frames by messaging the connection actor.
///
/// `send` waits for the actor to accept the message, so a stopped actor surfaces
/// as a write failure instead of silently dropping the frame.
pub struct ActorSink {
    addr: Addr<InterviewWebSocket>,
}

#[async_trait]
impl ClientSink for ActorSink {
    async fn send_text(&mut self, frame: String) -> Result<(), SessionError> {
        self.addr
            .send(SendText(frame))
            .await
            .map_err(|_| SessionError::ConnectionClosed)
    }
}

/// Session waiting for the actor to start.
struct PendingSession {
    supervisor: SessionSupervisor,
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// WebSocket actor for one interview session.
pub struct InterviewWebSocket {
    session_id: String,

    /// Forwards client frames to the inbound handler; dropped on stop
    inbound_tx: Option<mpsc::UnboundedSender<InboundFrame>>,

    /// Taken in `started` once the actor has an address
    pending: Option<PendingSession>,

    handle: SessionHandle,
    state: web::Data<AppState>,

    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
}

impl InterviewWebSocket {
    pub fn new(
        session_id: String,
        supervisor: SessionSupervisor,
        handle: SessionHandle,
        state: web::Data<AppState>,
    ) -> Self {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let heartbeat_interval = state.get_config().session.heartbeat_interval();
        let client_timeout = state.get_config().session.client_timeout();

        Self {
            session_id,
            inbound_tx: Some(inbound_tx),
            pending: Some(PendingSession {
                supervisor,
                inbound,
            }),
            handle,
            state,
            heartbeat_interval,
            client_timeout,
            last_heartbeat: Instant::now(),
        }
    }

    fn forward(&mut self, frame: InboundFrame, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(tx) = &self.inbound_tx else {
            return;
        };
        if tx.send(frame).is_err() {
            // The inbound handler has already exited; nothing will read this frame.
            debug!(session_id = %self.session_id, "Session no longer reading, closing connection");
            ctx.stop();
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(session_id = %act.session_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }
}

impl Actor for InterviewWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection started");
        self.start_heartbeat(ctx);

        let Some(PendingSession {
            supervisor,
            inbound,
        }) = self.pending.take()
        else {
            error!(session_id = %self.session_id, "Session already started for this connection");
            ctx.stop();
            return;
        };

        let sink = ActorSink {
            addr: ctx.address(),
        };
        let addr = ctx.address();
        let state = self.state.clone();
        state.record_session_start();

        tokio::spawn(async move {
            let summary = supervisor
                .run(UnboundedReceiverStream::new(inbound), sink)
                .await;
            state.record_session_end(&summary);
            addr.do_send(SessionFinished);
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection stopped");
        self.inbound_tx = None;
        self.handle.close();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for InterviewWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                error!(session_id = %self.session_id, error = %err, "WebSocket protocol error");
                ctx.stop();
                return;
            }
        };

        self.last_heartbeat = Instant::now();

        match msg {
            ws::Message::Text(text) => self.forward(InboundFrame::Text(text.to_string()), ctx),
            ws::Message::Binary(data) => self.forward(InboundFrame::Binary(data.len()), ctx),
            ws::Message::Ping(data) => ctx.pong(&data),
            ws::Message::Pong(_) => {}
            ws::Message::Close(reason) => {
                info!(session_id = %self.session_id, ?reason, "Client closed the connection");
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) => {
                warn!(session_id = %self.session_id, "Ignoring continuation frame");
            }
            ws::Message::Nop => {}
        }
    }
}

impl Handler<SendText> for InterviewWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<SessionFinished> for InterviewWebSocket {
    type Result = ();

    fn handle(&mut self, _msg: SessionFinished, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseCode::Normal.into()));
        ctx.stop();
    }
}

/// WebSocket endpoint for an interview session.
pub async fn interview_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let client_id = path.into_inner();
    let peer = req.connection_info().peer_addr().map(str::to_string);
    info!(
        session_id = %client_id,
        peer = ?peer,
        "New interview connection request"
    );

    let params = SessionParams::from_query(
        client_id.as_str(),
        query.get("type").map(String::as_str),
        query.get("difficulty").map(String::as_str),
        query.get("topic").map(String::as_str),
    )
    .map_err(AppError::BadRequest)?;

    let lease = state.registry.register(&params).map_err(|err| {
        warn!(session_id = %client_id, error = %err, "Refusing interview connection");
        AppError::from(err)
    })?;

    let (supervisor, handle) = SessionSupervisor::new(params, state.sessions.clone(), lease);
    let actor = InterviewWebSocket::new(client_id, supervisor, handle, state);

    ws::start(actor, &req, stream).map_err(|err| AppError::BadRequest(err.to_string()))
}

/// Liveness probe: answers `pong` and closes.
pub struct PingWebSocket;

impl Actor for PingWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.text("pong");
        ctx.close(Some(ws::CloseCode::Normal.into()));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PingWebSocket {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, _ctx: &mut Self::Context) {}
}

pub async fn ping_websocket(req: HttpRequest, stream: web::Payload) -> AppResult<HttpResponse> {
    ws::start(PingWebSocket, &req, stream).map_err(|err| AppError::BadRequest(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use actix_web::{http::StatusCode, test, App};

    fn app_config(cfg: &mut web::ServiceConfig) {
        cfg.route("/ws/interview/{client_id}", web::get().to(interview_websocket));
    }

    #[actix_web::test]
    async fn test_rejects_unknown_category() {
        let state = web::Data::new(test_state());
        let app = test::init_service(App::new().app_data(state.clone()).configure(app_config)).await;

        let req = test::TestRequest::get()
            .uri("/ws/interview/abc?type=astrology")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.registry.active_count(), 0);
    }

    #[actix_web::test]
    async fn test_rejects_duplicate_session_id() {
        let state = web::Data::new(test_state());
        let params = SessionParams::from_query("abc", None, None, None).unwrap();
        let _lease = state.registry.register(&params).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(app_config)).await;

        let req = test::TestRequest::get().uri("/ws/interview/abc").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_rejects_when_full() {
        let state = web::Data::new(test_state());
        let _a = state
            .registry
            .register(&SessionParams::from_query("a", None, None, None).unwrap())
            .unwrap();
        let _b = state
            .registry
            .register(&SessionParams::from_query("b", None, None, None).unwrap())
            .unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(app_config)).await;

        let req = test::TestRequest::get().uri("/ws/interview/c").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_failed_handshake_releases_slot() {
        let state = web::Data::new(test_state());
        let app = test::init_service(App::new().app_data(state.clone()).configure(app_config)).await;

        // No upgrade headers, so the handshake itself fails after registration.
        let req = test::TestRequest::get()
            .uri("/ws/interview/abc?type=hr&difficulty=hard")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.registry.active_count(), 0);
    }
}
