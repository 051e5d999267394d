//! RPC status and stream abstractions
//!
//! Server streams deliver initial metadata first (an immediate rejection
//! shows up there), then messages until the stream closes. Closing with
//! [`RpcCode::Ok`] is a normal finish.

use std::collections::VecDeque;
use std::fmt;

use arsync_core::ArError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// gRPC-like status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    Unavailable,
    Internal,
    Unimplemented,
}

impl RpcCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RpcCode::Ok => "OK",
            RpcCode::Cancelled => "CANCELLED",
            RpcCode::Unknown => "UNKNOWN",
            RpcCode::InvalidArgument => "INVALID_ARGUMENT",
            RpcCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            RpcCode::NotFound => "NOT_FOUND",
            RpcCode::Unavailable => "UNAVAILABLE",
            RpcCode::Internal => "INTERNAL",
            RpcCode::Unimplemented => "UNIMPLEMENTED",
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of an RPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcStatus {
    pub code: RpcCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        RpcStatus {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        RpcStatus::new(RpcCode::Ok, "")
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        RpcStatus::new(RpcCode::Unknown, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        RpcStatus::new(RpcCode::Unavailable, message)
    }

    pub fn is_ok(&self) -> bool {
        self.code == RpcCode::Ok
    }

    /// The stream died because the transport went away
    pub fn is_transport_loss(&self) -> bool {
        matches!(self.code, RpcCode::Unknown | RpcCode::Unavailable)
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl From<RpcStatus> for ArError {
    fn from(status: RpcStatus) -> Self {
        ArError::Rpc {
            code: status.code.to_string(),
            message: status.message,
        }
    }
}

pub type RpcResult<T> = Result<T, RpcStatus>;

/// Reading side of a server-streaming call
#[async_trait]
pub trait ServerStream<M>: Send {
    /// Wait for the server to accept the call
    async fn initial_metadata(&mut self) -> RpcResult<()>;

    /// Next message, `None` once the server closed the stream normally
    async fn message(&mut self) -> RpcResult<Option<M>>;
}

pub type BoxStream<M> = Box<dyn ServerStream<M>>;

/// Writing side of a client-streaming call
#[async_trait]
pub trait ClientStream<M>: Send {
    async fn send(&mut self, message: M) -> RpcResult<()>;

    /// Half-close and wait for the final status
    async fn finish(&mut self) -> RpcResult<()>;
}

pub type BoxSink<M> = Box<dyn ClientStream<M>>;

/// Stream fed by the paired [`StreamSender`]
pub struct ChannelStream<M> {
    rejection: Option<RpcStatus>,
    rx: mpsc::UnboundedReceiver<RpcResult<M>>,
}

/// Server-side handle of a [`ChannelStream`]
#[derive(Debug)]
pub struct StreamSender<M> {
    tx: mpsc::UnboundedSender<RpcResult<M>>,
}

impl<M> Clone for StreamSender<M> {
    fn clone(&self) -> Self {
        StreamSender {
            tx: self.tx.clone(),
        }
    }
}

impl<M: Send> StreamSender<M> {
    /// Returns false once the reader is gone
    pub fn send(&self, message: M) -> bool {
        self.tx.send(Ok(message)).is_ok()
    }

    /// End the stream with an error status
    pub fn fail(&self, status: RpcStatus) -> bool {
        self.tx.send(Err(status)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Open stream pair; dropping every sender closes the stream normally
pub fn stream_channel<M: Send + 'static>() -> (StreamSender<M>, BoxStream<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = ChannelStream {
        rejection: None,
        rx,
    };
    (StreamSender { tx }, Box::new(stream))
}

/// Stream the server refuses before any message
pub fn rejected_stream<M: Send + 'static>(status: RpcStatus) -> BoxStream<M> {
    let (_, rx) = mpsc::unbounded_channel();
    Box::new(ChannelStream {
        rejection: Some(status),
        rx,
    })
}

#[async_trait]
impl<M: Send> ServerStream<M> for ChannelStream<M> {
    async fn initial_metadata(&mut self) -> RpcResult<()> {
        match self.rejection.take() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    async fn message(&mut self) -> RpcResult<Option<M>> {
        match self.rx.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(status)) => Err(status),
            None => Ok(None),
        }
    }
}

/// Finite stream over a fixed list of messages
pub struct VecStream<M> {
    items: VecDeque<M>,
}

impl<M: Send + 'static> VecStream<M> {
    pub fn boxed(items: Vec<M>) -> BoxStream<M> {
        Box::new(VecStream {
            items: items.into(),
        })
    }
}

#[async_trait]
impl<M: Send> ServerStream<M> for VecStream<M> {
    async fn initial_metadata(&mut self) -> RpcResult<()> {
        Ok(())
    }

    async fn message(&mut self) -> RpcResult<Option<M>> {
        Ok(self.items.pop_front())
    }
}

/// Client stream forwarding into a channel
pub struct ChannelSink<M> {
    tx: Option<mpsc::UnboundedSender<M>>,
}

/// Open client stream pair; the receiver sees every sent message
pub fn sink_channel<M: Send + 'static>() -> (BoxSink<M>, mpsc::UnboundedReceiver<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Box::new(ChannelSink { tx: Some(tx) }), rx)
}

#[async_trait]
impl<M: Send> ClientStream<M> for ChannelSink<M> {
    async fn send(&mut self, message: M) -> RpcResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RpcStatus::new(RpcCode::Cancelled, "stream already finished"))?;
        tx.send(message)
            .map_err(|_| RpcStatus::unavailable("peer closed the stream"))
    }

    async fn finish(&mut self) -> RpcResult<()> {
        self.tx = None;
        Ok(())
    }
}
