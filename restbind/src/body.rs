// Copyright 2025 Oxide Computer Company

//! The body type shared by requests and responses.

use bytes::Bytes;
use bytes::BytesMut;
use futures::Stream;
use futures::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use http_body_util::Empty;
use http_body_util::Full;
use http_body_util::StreamBody;
use hyper::body::Body as HttpBody;
use hyper::body::Frame;
use hyper::body::SizeHint;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use crate::error::HttpError;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Bytes of a request or response.
///
/// Encoded responses are buffered in full.  A streamed response (see
/// [`crate::ResponseWriter`]) yields chunks as the interactor writes them.
#[derive(Debug)]
pub struct Body {
    frames: BoxBody<Bytes, BoxError>,
}

impl Body {
    pub fn empty() -> Self {
        Body { frames: Empty::new().map_err(|never| match never {}).boxed() }
    }

    fn buffered(bytes: Bytes) -> Self {
        let frames = Full::new(bytes).map_err(|never| match never {});
        Body { frames: frames.boxed() }
    }

    /// A body made of the chunks `stream` produces.  An `Err` chunk aborts
    /// the body.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + Sync + 'static,
    {
        let frames =
            StreamBody::new(stream.map(|chunk| chunk.map(Frame::data)));
        Body { frames: BodyExt::boxed(frames) }
    }

    /// Reads the whole body.  Fails with a 400 as soon as more than
    /// `max_bytes` are known to be coming, which for a body with a declared
    /// length is before anything is read.  Trailers are ignored.
    pub async fn collect_limited(
        mut self,
        max_bytes: usize,
    ) -> Result<Bytes, HttpError> {
        let too_large = || {
            HttpError::for_bad_request(format!(
                "request body exceeded maximum size of {} bytes",
                max_bytes
            ))
        };

        let announced = self.frames.size_hint().lower();
        if announced > max_bytes as u64 {
            return Err(too_large());
        }

        let mut collected = BytesMut::with_capacity(announced as usize);
        while let Some(frame) = self.frames.frame().await {
            let frame = frame.map_err(|error| {
                HttpError::for_bad_request(format!(
                    "error reading request body: {}",
                    error
                ))
            })?;
            if let Ok(data) = frame.into_data() {
                if collected.len() + data.len() > max_bytes {
                    return Err(too_large());
                }
                collected.extend_from_slice(&data);
            }
        }
        Ok(collected.freeze())
    }

    /// Reads the body to the end, dropping every chunk.
    pub(crate) async fn discard(mut self) {
        while let Some(Ok(_)) = self.frames.frame().await {}
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Body {
        Body::buffered(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Body {
        Body::buffered(bytes.into())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Body {
        Body::buffered(text.into())
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Body {
        Body::buffered(Bytes::from_static(text.as_bytes()))
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        Pin::new(&mut self.frames).poll_frame(cx)
    }

    fn size_hint(&self) -> SizeHint {
        self.frames.size_hint()
    }

    fn is_end_stream(&self) -> bool {
        self.frames.is_end_stream()
    }
}
