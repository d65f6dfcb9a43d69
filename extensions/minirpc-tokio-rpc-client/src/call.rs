use crate::RpcClientError;
use minirpc::codec::BodyFormat;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::{self, error::SendError};

/// A finished call, delivered exactly once on its completion queue.
#[derive(Debug)]
pub struct Call<R> {
    /// The sequence number the call was sent with. `0` if the client refused
    /// to register it.
    pub seq: u64,

    pub service_method: String,

    /// The decoded reply, or why there is none.
    pub result: Result<R, RpcClientError>,
}

impl<R> Call<R> {
    pub fn error(&self) -> Option<&RpcClientError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<R, RpcClientError> {
        self.result
    }
}

/// The sending side of a completion queue.
///
/// Cloning it lets several calls report to the same queue.
#[derive(Debug)]
pub struct CompletionSender<R> {
    tx: mpsc::Sender<Call<R>>,
}

impl<R> Clone for CompletionSender<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<R> CompletionSender<R> {
    /// Delivers a finished call, waiting for room in the queue.
    ///
    /// A caller that stops draining a full queue holds up the receive loop
    /// of the client that completes into it.
    pub(crate) async fn signal(&self, call: Call<R>) {
        if let Err(SendError(call)) = self.tx.send(call).await {
            tracing::debug!(
                "rpc client: completion of call {} dropped, nobody is waiting",
                call.seq
            );
        }
    }
}

/// The receiving side of a completion queue.
#[derive(Debug)]
pub struct CompletionReceiver<R> {
    rx: mpsc::Receiver<Call<R>>,
}

impl<R> CompletionReceiver<R> {
    /// Waits for the next finished call. Returns `None` once every sender
    /// is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<Call<R>> {
        self.rx.recv().await
    }
}

/// Creates a completion queue that holds up to `capacity` finished calls.
///
/// A capacity of zero can never deliver anything and is rejected.
pub fn completion_queue<R>(
    capacity: usize,
) -> Result<(CompletionSender<R>, CompletionReceiver<R>), RpcClientError> {
    if capacity == 0 {
        return Err(RpcClientError::UnbufferedCompletionQueue);
    }

    Ok(bounded_queue(capacity))
}

/// `capacity` must be non-zero.
pub(crate) fn bounded_queue<R>(capacity: usize) -> (CompletionSender<R>, CompletionReceiver<R>) {
    let (tx, rx) = mpsc::channel(capacity);
    (CompletionSender { tx }, CompletionReceiver { rx })
}

/// The handle returned by [`RpcClient::go`](crate::RpcClient::go).
///
/// When the caller supplied its own queue, completion is delivered there and
/// this handle only identifies the call. Otherwise the handle owns the
/// queue the client created for it.
#[derive(Debug)]
pub struct PendingCall<R> {
    pub(crate) seq: u64,
    pub(crate) service_method: String,
    pub(crate) done: Option<CompletionReceiver<R>>,
}

impl<R> PendingCall<R> {
    /// The sequence number assigned to the call, or `0` if the client
    /// refused to register it.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// Waits on the queue this handle owns.
    ///
    /// Returns `None` if the caller supplied its own queue.
    pub async fn done(self) -> Option<Call<R>> {
        let mut done = self.done?;
        done.recv().await
    }

    pub fn into_receiver(self) -> Option<CompletionReceiver<R>> {
        self.done
    }
}

/// A registered, in-flight call with its reply type erased, so calls with
/// different reply types can share one registry.
#[async_trait::async_trait]
pub(crate) trait PendingEntry: Send {
    async fn complete_with_body(self: Box<Self>, format: BodyFormat, body: &[u8]);

    async fn complete_with_error(self: Box<Self>, error: RpcClientError);
}

pub(crate) struct Waiter<R> {
    pub(crate) seq: u64,
    pub(crate) service_method: String,
    pub(crate) done: CompletionSender<R>,
}

#[async_trait::async_trait]
impl<R> PendingEntry for Waiter<R>
where
    R: DeserializeOwned + Send + 'static,
{
    async fn complete_with_body(self: Box<Self>, format: BodyFormat, body: &[u8]) {
        let result = format.decode::<R>(body).map_err(|err| {
            tracing::warn!("rpc client: reading body of call {}: {}", self.seq, err);
            RpcClientError::ReadBody(err.to_string())
        });

        self.finish(result).await;
    }

    async fn complete_with_error(self: Box<Self>, error: RpcClientError) {
        self.finish(Err(error)).await;
    }
}

impl<R> Waiter<R> {
    async fn finish(self, result: Result<R, RpcClientError>) {
        let Waiter {
            seq,
            service_method,
            done,
        } = self;

        done.signal(Call {
            seq,
            service_method,
            result,
        })
        .await;
    }
}
