use crate::{
    Call, CompletionSender, PendingCall, RpcClientError,
    call::{PendingEntry, Waiter, bounded_queue},
};
use minirpc::{
    codec::{AsyncStream, CodecPair, CodecReader, CodecRegistry, CodecWriter, write_message},
    constants::DEFAULT_COMPLETION_QUEUE_CAPACITY,
    error::{CodecError, HandshakeError},
    handshake::write_option,
    protocol::{RpcHeader, RpcOption},
};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, ToSocketAddrs},
    sync::{Mutex, watch},
};

struct ClientState {
    seq: u64,
    pending: HashMap<u64, Box<dyn PendingEntry>>,
    // Set by `close` (or drop).
    closing: bool,
    // Set once the receive loop has stopped.
    shutdown: bool,
}

struct Shared {
    // Send lock. Always taken before `state` when both are needed.
    sending: Mutex<Box<dyn CodecWriter>>,
    state: StdMutex<ClientState>,
    // Flips to `true` once on close or drop. Observed without the send lock
    // so a write stuck on a peer that stopped reading can be abandoned.
    closed: watch::Sender<bool>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the client shut down and completes every pending call.
    async fn terminate_calls(&self, error: RpcClientError) {
        let sending = self.sending.lock().await;

        let (pending, error) = {
            let mut state = self.lock_state();
            state.shutdown = true;

            let error = if state.closing {
                RpcClientError::Shutdown
            } else {
                error
            };

            (std::mem::take(&mut state.pending), error)
        };
        drop(sending);

        if !pending.is_empty() {
            tracing::debug!(
                "rpc client: terminating {} pending call(s): {}",
                pending.len(),
                error
            );
        }

        for entry in pending.into_values() {
            entry.complete_with_error(error.clone()).await;
        }
    }

    fn signal_closed(&self) {
        self.closed.send_replace(true);
    }
}

/// Resolves once the client has been closed or dropped.
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    // An `Err` means the sender is gone, which only happens on teardown.
    let _ = closed.wait_for(|closed| *closed).await;
}

/// A client bound to one negotiated connection.
///
/// All methods take `&self`; share the client behind an `Arc` to issue
/// calls from many tasks at once.
pub struct RpcClient {
    shared: Arc<Shared>,
    option: RpcOption,
}

impl RpcClient {
    /// Connects to `addr` over TCP and negotiates `option`.
    pub async fn dial<A: ToSocketAddrs>(
        addr: A,
        option: Option<RpcOption>,
        registry: &CodecRegistry,
    ) -> Result<Self, HandshakeError> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream, option, registry).await
    }

    /// Writes the option record on `stream` and starts the receive loop.
    ///
    /// An unregistered codec is rejected before anything is written. On
    /// failure the stream is shut down.
    pub async fn new<S>(
        mut stream: S,
        option: Option<RpcOption>,
        registry: &CodecRegistry,
    ) -> Result<Self, HandshakeError>
    where
        S: AsyncStream + 'static,
    {
        let option = RpcOption::resolve(option);

        if !registry.contains(&option.codec_type) {
            tracing::error!("rpc client: invalid codec type {}", option.codec_type);
            let _ = stream.shutdown().await;
            return Err(HandshakeError::UnsupportedCodec(option.codec_type));
        }

        if let Err(err) = write_option(&mut stream, &option).await {
            tracing::error!("rpc client: error writing options: {}", err);
            let _ = stream.shutdown().await;
            return Err(err);
        }

        let codec = registry
            .new_codec(&option.codec_type, stream)
            .map_err(|_| HandshakeError::UnsupportedCodec(option.codec_type.clone()))?;

        Ok(Self::from_codec(codec, option))
    }

    /// Runs a client over a codec whose option record was already exchanged.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_codec(codec: CodecPair, option: RpcOption) -> Self {
        let CodecPair { reader, writer } = codec;

        let shared = Arc::new(Shared {
            sending: Mutex::new(writer),
            state: StdMutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            closed: watch::Sender::new(false),
        });

        tokio::spawn(receive_loop(shared.clone(), reader));

        Self { shared, option }
    }

    pub fn option(&self) -> &RpcOption {
        &self.option
    }

    pub fn is_available(&self) -> bool {
        let state = self.shared.lock_state();
        !state.closing && !state.shutdown
    }

    /// Closes the connection.
    ///
    /// Pending calls complete with [`RpcClientError::Shutdown`]. Only the
    /// first call has any effect; later ones return the same error.
    pub async fn close(&self) -> Result<(), RpcClientError> {
        {
            let mut state = self.shared.lock_state();
            if state.closing {
                return Err(RpcClientError::Shutdown);
            }
            state.closing = true;
        }

        // Abandons any write in flight, releasing the send lock.
        self.shared.signal_closed();

        let mut writer = self.shared.sending.lock().await;
        writer
            .close()
            .await
            .map_err(|err| RpcClientError::Send(Arc::new(err)))
    }

    /// Starts a call and returns once the request has been written.
    ///
    /// The finished [`Call`] is delivered on `done` if given. Otherwise a
    /// queue is created and owned by the returned [`PendingCall`]; await it
    /// with [`PendingCall::done`].
    pub async fn go<A, R>(
        &self,
        service_method: &str,
        args: &A,
        done: Option<CompletionSender<R>>,
    ) -> PendingCall<R>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (done, receiver) = match done {
            Some(done) => (done, None),
            None => {
                let (done, receiver) = bounded_queue(DEFAULT_COMPLETION_QUEUE_CAPACITY);
                (done, Some(receiver))
            }
        };

        let seq = self.send(service_method, args, done).await;

        PendingCall {
            seq,
            service_method: service_method.to_owned(),
            done: receiver,
        }
    }

    /// Invokes `service_method` and waits for its reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R, RpcClientError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (done, mut completed) = bounded_queue(1);
        self.go(service_method, args, Some(done)).await;

        match completed.recv().await {
            Some(call) => call.into_result(),
            None => Err(RpcClientError::Shutdown),
        }
    }

    /// Registers the call and writes its request, returning the assigned
    /// sequence number (`0` if the client refused the call).
    async fn send<A, R>(&self, service_method: &str, args: &A, done: CompletionSender<R>) -> u64
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let mut closed = self.shared.closed.subscribe();
        let mut writer = self.shared.sending.lock().await;

        let seq = {
            let mut state = self.shared.lock_state();

            if state.closing || state.shutdown {
                drop(state);
                drop(writer);
                done.signal(Call {
                    seq: 0,
                    service_method: service_method.to_owned(),
                    result: Err(RpcClientError::Shutdown),
                })
                .await;
                return 0;
            }

            let seq = state.seq;
            state.seq += 1;
            state.pending.insert(
                seq,
                Box::new(Waiter {
                    seq,
                    service_method: service_method.to_owned(),
                    done,
                }),
            );
            seq
        };

        let header = RpcHeader::new(service_method, seq);
        tracing::trace!("rpc client: sending call {} ({})", seq, service_method);

        let error = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => {
                tracing::debug!("rpc client: call {} abandoned by close", seq);
                RpcClientError::Shutdown
            }
            result = write_message(&mut **writer, &header, args) => match result {
                Ok(()) => return seq,
                Err(err) => {
                    tracing::error!("rpc client: error sending call {}: {}", seq, err);
                    RpcClientError::Send(Arc::new(err))
                }
            },
        };
        drop(writer);

        let entry = self.shared.lock_state().pending.remove(&seq);
        if let Some(entry) = entry {
            entry.complete_with_error(error).await;
        }

        seq
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shared.lock_state().closing = true;
        self.shared.signal_closed();
    }
}

async fn receive_loop(shared: Arc<Shared>, mut reader: Box<dyn CodecReader>) {
    let mut closed = shared.closed.subscribe();

    let error = loop {
        let header = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => break RpcClientError::Shutdown,
            header = reader.read_header() => header,
        };

        let header = match header {
            Ok(header) => header,
            Err(err) => {
                if !err.is_eof() {
                    tracing::error!("rpc client: error reading header: {}", err);
                }
                break RpcClientError::Connection(Arc::new(err));
            }
        };

        let entry = shared.lock_state().pending.remove(&header.seq);

        let result = match entry {
            None => {
                tracing::debug!(
                    "rpc client: discarding response for unknown call {}",
                    header.seq
                );
                reader.discard_body().await
            }
            Some(entry) if header.is_error() => {
                let result = reader.discard_body().await;
                entry
                    .complete_with_error(RpcClientError::Remote(header.error))
                    .await;
                result
            }
            Some(entry) => match reader.read_body().await {
                Ok(body) => {
                    entry.complete_with_body(reader.body_format(), &body).await;
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!("rpc client: reading body of call {}: {}", header.seq, err);
                    entry
                        .complete_with_error(RpcClientError::ReadBody(err.to_string()))
                        .await;

                    // An oversized body was skipped, the stream is still aligned.
                    match err {
                        CodecError::FrameTooLarge { .. } => Ok(()),
                        err => Err(err),
                    }
                }
            },
        };

        if let Err(err) = result {
            if !err.is_eof() {
                tracing::error!("rpc client: error reading body: {}", err);
            }
            break RpcClientError::Connection(Arc::new(err));
        }
    };

    shared.terminate_calls(error).await;
}
