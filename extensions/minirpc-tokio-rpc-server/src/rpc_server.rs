use crate::{PlaceholderHandler, ServiceHandler};
use minirpc::{
    codec::{
        AsyncStream, CodecPair, CodecReader, CodecRegistry, CodecWriter, read_message_body,
        write_message,
    },
    error::CodecError,
    handshake::accept_option,
    protocol::RpcHeader,
};
use serde::Serialize;
use std::{io, sync::Arc};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{TcpListener, ToSocketAddrs},
    sync::Mutex,
    task::JoinSet,
};

/// The connection-wide send lock shared by the read loop and every worker.
type SharedWriter = Arc<Mutex<Box<dyn CodecWriter>>>;

/// Body sent with a response whose request could not be decoded or handled.
#[derive(Serialize)]
struct InvalidRequest;

enum ReadOutcome<A> {
    Request(RpcHeader, A),
    /// The header was read but the body could not be decoded.
    InvalidBody(RpcHeader, CodecError),
    Closed,
}

/// Accepts connections, negotiates the option record and serves requests
/// through a [`ServiceHandler`].
pub struct RpcServer<H = PlaceholderHandler> {
    registry: Arc<CodecRegistry>,
    handler: Arc<H>,
}

impl Default for RpcServer<PlaceholderHandler> {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServer<PlaceholderHandler> {
    /// A server with the default codec registry and the placeholder handler.
    pub fn new() -> Self {
        Self::with_handler(Arc::new(CodecRegistry::default()), PlaceholderHandler)
    }
}

impl<H: ServiceHandler> RpcServer<H> {
    pub fn with_handler(registry: Arc<CodecRegistry>, handler: H) -> Self {
        RpcServer {
            registry,
            handler: Arc::new(handler),
        }
    }

    pub fn handler(&self) -> Arc<H> {
        self.handler.clone()
    }

    pub fn registry(&self) -> Arc<CodecRegistry> {
        self.registry.clone()
    }

    /// Binds to an address and serves every connection accepted on it.
    ///
    /// The address can be any type that implements `ToSocketAddrs`, such as
    /// a string "127.0.0.1:8080" or a `SocketAddr`.
    pub async fn serve<A: ToSocketAddrs>(self, addr: A) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        let server = Arc::new(self);
        server.serve_with_listener(listener).await
    }

    /// Serves connections from a pre-bound `TcpListener`, one task each.
    ///
    /// Returns only when accepting fails.
    pub async fn serve_with_listener(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        let address = listener.local_addr()?;
        tracing::info!("rpc server: listening on {}", address);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::error!("rpc server: accept error: {}", err);
                    return Err(err);
                }
            };

            tracing::info!("rpc server: client connected: {}", peer);

            let server = self.clone();
            tokio::spawn(async move {
                server.serve_conn(stream).await;
                tracing::info!("rpc server: client disconnected: {}", peer);
            });
        }
    }

    /// Serves one connection until the peer stops sending requests.
    ///
    /// A connection whose option record is missing, malformed, carries the
    /// wrong magic number or names an unregistered codec is closed without
    /// anything being written to it.
    pub async fn serve_conn<S>(&self, stream: S)
    where
        S: AsyncStream + 'static,
    {
        // The codec must read from this same buffer, which may already hold
        // the first request.
        let mut stream = BufReader::new(stream);

        let option = match accept_option(&mut stream, &self.registry).await {
            Ok(option) => option,
            Err(err) => {
                tracing::warn!("rpc server: options error: {}", err);
                let _ = stream.shutdown().await;
                return;
            }
        };

        match self.registry.new_codec(&option.codec_type, stream) {
            Ok(codec) => self.serve_codec(codec).await,
            Err(err) => tracing::warn!("rpc server: {}", err),
        }
    }

    /// Runs the read loop over an already negotiated codec, then waits for
    /// every dispatched request to be answered and closes the codec.
    pub async fn serve_codec(&self, codec: CodecPair) {
        let CodecPair { mut reader, writer } = codec;
        let sending: SharedWriter = Arc::new(Mutex::new(writer));
        let mut workers = JoinSet::new();

        loop {
            match read_request::<H::Args>(&mut *reader).await {
                ReadOutcome::Closed => break,
                ReadOutcome::InvalidBody(mut header, err) => {
                    tracing::warn!(
                        "rpc server: read body error for {} (seq {}): {}",
                        header.service_method,
                        header.seq,
                        err
                    );
                    header.error = err.to_string();
                    send_response(&sending, &header, &InvalidRequest).await;
                }
                ReadOutcome::Request(header, args) => {
                    tracing::debug!(
                        "rpc server: dispatching {} (seq {})",
                        header.service_method,
                        header.seq
                    );
                    workers.spawn(handle_request(
                        self.handler.clone(),
                        sending.clone(),
                        header,
                        args,
                    ));
                }
            }

            while let Some(joined) = workers.try_join_next() {
                log_worker_exit(joined);
            }
        }

        while let Some(joined) = workers.join_next().await {
            log_worker_exit(joined);
        }

        if let Err(err) = sending.lock().await.close().await {
            tracing::debug!("rpc server: error closing codec: {}", err);
        }
    }
}

async fn read_request<A>(reader: &mut dyn CodecReader) -> ReadOutcome<A>
where
    A: serde::de::DeserializeOwned,
{
    let header = match reader.read_header().await {
        Ok(header) => header,
        Err(err) => {
            if !err.is_eof() {
                tracing::error!("rpc server: read header error: {}", err);
            }
            return ReadOutcome::Closed;
        }
    };

    match read_message_body::<A, _>(reader).await {
        Ok(args) => ReadOutcome::Request(header, args),
        Err(err) => ReadOutcome::InvalidBody(header, err),
    }
}

async fn handle_request<H: ServiceHandler>(
    handler: Arc<H>,
    sending: SharedWriter,
    mut header: RpcHeader,
    args: H::Args,
) {
    match handler.handle(&header, args).await {
        Ok(reply) => send_response(&sending, &header, &reply).await,
        Err(err) => {
            tracing::debug!(
                "rpc server: {} (seq {}) failed: {}",
                header.service_method,
                header.seq,
                err
            );
            header.error = err.to_string();
            send_response(&sending, &header, &InvalidRequest).await;
        }
    }
}

async fn send_response<T>(sending: &SharedWriter, header: &RpcHeader, body: &T)
where
    T: Serialize + Sync + ?Sized,
{
    let mut writer = sending.lock().await;
    if let Err(err) = write_message(&mut **writer, header, body).await {
        tracing::error!("rpc server: write response error: {}", err);
    }
}

fn log_worker_exit(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        tracing::error!("rpc server: worker failed: {}", err);
    }
}
