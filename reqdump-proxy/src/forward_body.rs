//! Request body handed to the next service after the dump step.

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use reqdump_core::capture::ReplayBody;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::BoxError;

/// What the downstream service reads in place of the original body.
///
/// Every variant yields exactly the bytes the client sent, except `Empty`,
/// which stands in for a body whose stream failed mid-capture.
#[derive(Debug)]
pub enum ForwardBody<B> {
    /// Captured body replayed from memory.
    Replay(ReplayBody),

    /// Over-limit body: the bytes already read, then the unread remainder.
    Spliced { prefix: Option<Bytes>, rest: B },

    /// Fallback after a read failure. Ends immediately.
    Empty,

    /// Original body of a request that bypassed capture.
    Passthrough(B),
}

impl<B> ForwardBody<B> {
    pub fn spliced(prefix: Bytes, rest: B) -> Self {
        let prefix = (!prefix.is_empty()).then_some(prefix);
        ForwardBody::Spliced { prefix, rest }
    }
}

impl<B> Body for ForwardBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            ForwardBody::Replay(body) => Pin::new(body)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            ForwardBody::Spliced { prefix, rest } => {
                if let Some(prefix) = prefix.take() {
                    return Poll::Ready(Some(Ok(Frame::data(prefix))));
                }
                Pin::new(rest).poll_frame(cx).map_err(Into::into)
            }
            ForwardBody::Empty => Poll::Ready(None),
            ForwardBody::Passthrough(body) => Pin::new(body).poll_frame(cx).map_err(Into::into),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            ForwardBody::Replay(body) => body.is_end_stream(),
            ForwardBody::Spliced { prefix, rest } => prefix.is_none() && rest.is_end_stream(),
            ForwardBody::Empty => true,
            ForwardBody::Passthrough(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            ForwardBody::Replay(body) => body.size_hint(),
            ForwardBody::Spliced { prefix, rest } => {
                let extra = prefix.as_ref().map(|p| p.len() as u64).unwrap_or(0);
                let inner = rest.size_hint();
                let mut hint = SizeHint::new();
                hint.set_lower(inner.lower() + extra);
                if let Some(upper) = inner.upper() {
                    hint.set_upper(upper + extra);
                }
                hint
            }
            ForwardBody::Empty => SizeHint::with_exact(0),
            ForwardBody::Passthrough(body) => body.size_hint(),
        }
    }
}
