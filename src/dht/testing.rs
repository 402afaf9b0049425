//! Scripted in-memory daemon for call path tests

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use libp2p::PeerId;
use prost::Message;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use super::peer::PeerInfo;
use super::protocol::{DhtResponse, Request, Response};
use crate::control::{Connection, Dialer, MessageCodec};

pub(crate) const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// What the fake daemon observed on one connection
#[derive(Debug)]
pub(crate) struct Session {
    pub request: Option<Request>,

    /// The client closed its side after the scripted replies
    pub closed: bool,
}

/// One frame written by the fake daemon
pub(crate) enum Reply {
    /// Control response (single answers and stream openers)
    Response(Response),

    /// Bare stream entry, as sent after the stream began
    Entry(DhtResponse),

    /// Length prefix announcing `len` bytes, with no body behind it
    Header(usize),
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<DhtResponse> for Reply {
    fn from(entry: DhtResponse) -> Self {
        Reply::Entry(entry)
    }
}

/// What the fake daemon does once its replies are written
#[derive(Clone, Copy)]
pub(crate) enum Then {
    /// Wait for the client to close its side
    AwaitClose,

    /// Drop the connection without an end marker
    HangUp,
}

pub(crate) fn test_peer(seed: u8) -> PeerInfo {
    let mut bytes = vec![0x12, 0x20];
    bytes.extend_from_slice(&[seed; 32]);

    PeerInfo {
        id: PeerId::from_bytes(&bytes).unwrap(),
        addrs: vec![format!("/ip4/10.0.0.{}/tcp/4001", seed).parse().unwrap()],
    }
}

/// A well-formed stream: begin, `entries`, end
pub(crate) fn stream_replies(entries: impl IntoIterator<Item = DhtResponse>) -> Vec<Reply> {
    let mut replies = vec![Reply::Response(Response::ok(DhtResponse::begin()))];
    replies.extend(entries.into_iter().map(Reply::Entry));
    replies.push(Reply::Entry(DhtResponse::end()));
    replies
}

async fn write_reply(
    framed: &mut Framed<DuplexStream, MessageCodec>,
    reply: Reply,
) -> io::Result<()> {
    let sent = match reply {
        Reply::Response(response) => framed.send(response).await,
        Reply::Entry(entry) => framed.send(entry).await,
        Reply::Header(len) => {
            let mut buf = unsigned_varint::encode::usize_buffer();
            let header = unsigned_varint::encode::usize(len, &mut buf);
            return framed.get_mut().write_all(header).await;
        }
    };
    sent.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

async fn serve(
    stream: DuplexStream,
    replies: Vec<Reply>,
    expect_request: bool,
    then: Then,
) -> Session {
    let mut framed = Framed::new(stream, MessageCodec::new(MAX_MESSAGE_SIZE));

    let request = if expect_request {
        match framed.next().await {
            Some(Ok(body)) => Request::decode(body).ok(),
            _ => None,
        }
    } else {
        None
    };

    for reply in replies {
        if write_reply(&mut framed, reply).await.is_err() {
            break;
        }
    }

    let closed = match then {
        Then::AwaitClose => framed.next().await.is_none(),
        Then::HangUp => false,
    };
    Session { request, closed }
}

/// A connection whose far end replays `replies` without waiting for a request
pub(crate) fn daemon_pair(
    replies: Vec<Reply>,
    then: Then,
) -> (Connection<DuplexStream>, JoinHandle<Session>) {
    let (client, server) = tokio::io::duplex(MAX_MESSAGE_SIZE);
    let daemon = tokio::spawn(serve(server, replies, false, then));
    (Connection::new(client, MAX_MESSAGE_SIZE, None), daemon)
}

/// Scripted behaviour of one dialed connection
pub(crate) enum Script {
    /// Read the request, send these replies, wait for the client to close
    Reply(Vec<Reply>),

    /// Read the request, send these replies, then drop the connection
    Truncated(Vec<Reply>),

    /// Accept the connection and drop it right away
    HangUp,

    /// Refuse to connect
    Refuse,
}

/// Dialer handing out in-memory connections, one script per dial
pub(crate) struct ScriptedDialer {
    scripts: Mutex<VecDeque<Script>>,
    sessions: Mutex<Vec<JoinHandle<Session>>>,
}

impl ScriptedDialer {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Number of connections opened so far
    pub fn dialed(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Wait for every daemon session to finish
    pub async fn sessions(&self) -> Vec<Session> {
        let handles: Vec<_> = self.sessions.lock().unwrap().drain(..).collect();
        let mut sessions = Vec::with_capacity(handles.len());
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }
        sessions
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    type Stream = DuplexStream;

    async fn dial(&self) -> io::Result<DuplexStream> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Refuse);

        let (client, server) = tokio::io::duplex(MAX_MESSAGE_SIZE);
        let session = match script {
            Script::Reply(replies) => {
                tokio::spawn(serve(server, replies, true, Then::AwaitClose))
            }
            Script::Truncated(replies) => tokio::spawn(serve(server, replies, true, Then::HangUp)),
            Script::HangUp => {
                drop(server);
                tokio::spawn(async {
                    Session {
                        request: None,
                        closed: true,
                    }
                })
            }
            Script::Refuse => {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            }
        };

        self.sessions.lock().unwrap().push(session);
        Ok(client)
    }
}
