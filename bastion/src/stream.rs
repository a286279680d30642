//! Primitives to frame message payloads into binary packets over a [`Pipe`].

use futures::{AsyncReadExt, AsyncWriteExt};
use futures_time::{future::FutureExt as _, time::Duration};
use rand::Rng;

use crate::{
    mac::MacEngine,
    wire::{Disconnect, DisconnectReason},
    DisconnectError, DisconnectedBy, Error, Pipe, Result,
};

/// Hard cap on the size of a received binary packet.
pub const PACKET_MAX_SIZE: usize = 65536;

/// Smallest legal binary packet, length word included.
const PACKET_MIN_SIZE: usize = 16;

const MIN_PAD_SIZE: usize = 4;
const MIN_ALIGN: usize = 8;

#[derive(Debug, Default)]
struct Direction {
    seq: u32,
    mac: Option<MacEngine>,
}

/// A wrapper around a [`Pipe`] framing payloads into integrity-protected
/// binary packets.
#[derive(Debug)]
pub struct Stream<S> {
    inner: S,
    timeout: Duration,

    tx: Direction,
    rx: Direction,
}

impl<S> Stream<S>
where
    S: Pipe,
{
    /// Create a new [`Stream`] over a buffered pipe.
    pub fn new(stream: S, timeout: std::time::Duration) -> Self {
        Self {
            inner: stream,
            timeout: timeout.into(),
            tx: Default::default(),
            rx: Default::default(),
        }
    }

    /// Install the per-direction MAC engines computed from the key exchange.
    pub fn with_mac(&mut self, tx: Option<MacEngine>, rx: Option<MacEngine>) {
        self.tx.mac = tx;
        self.rx.mac = rx;
    }

    /// Receive and verify a _packet_ from the peer, yielding its payload.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let timeout = self.timeout;
        let (frame, tag) = async {
            let mut length = [0u8; 4];
            self.inner.read_exact(&mut length).await?;

            let packet_length = u32::from_be_bytes(length) as usize;
            if !(1..=PACKET_MAX_SIZE).contains(&packet_length) {
                return Err(Error::Malformed("packet length out of bounds"));
            }

            let mut frame = vec![0u8; 4 + packet_length];
            frame[..4].copy_from_slice(&length);
            self.inner.read_exact(&mut frame[4..]).await?;

            let tag = match &self.rx.mac {
                Some(mac) => {
                    let mut tag = vec![0u8; mac.mac_len()];
                    self.inner.read_exact(&mut tag).await?;

                    Some(tag)
                }
                None => None,
            };

            Ok((frame, tag))
        }
        .timeout(timeout)
        .await??;

        if let (Some(mac), Some(tag)) = (&self.rx.mac, &tag) {
            mac.verify(self.rx.seq, &frame, tag)?;
        }

        let padding_length = frame[4] as usize;
        let end = frame
            .len()
            .checked_sub(padding_length)
            .filter(|end| *end > 5 && padding_length >= MIN_PAD_SIZE)
            .ok_or(Error::Malformed("padding length out of bounds"))?;
        let payload = frame[5..end].to_vec();

        tracing::trace!(
            "<~- #{}: ^{:#x} ({} bytes)",
            self.rx.seq,
            payload[0],
            payload.len(),
        );

        self.rx.seq = self.rx.seq.wrapping_add(1);

        Ok(payload)
    }

    /// Frame, protect and send a _packet_ to the peer, flushing the pipe.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::Internal("attempted to send an empty payload"));
        }

        let padding = self.padding(payload.len());
        let packet_length = 1 + payload.len() + padding;

        let mut frame = Vec::with_capacity(4 + packet_length);
        frame.extend_from_slice(&(packet_length as u32).to_be_bytes());
        frame.push(padding as u8);
        frame.extend_from_slice(payload);

        let mut rng = rand::thread_rng();
        frame.extend((0..padding).map(|_| rng.gen::<u8>()));

        if let Some(mac) = &self.tx.mac {
            let tag = mac.compute(self.tx.seq, &frame);
            frame.extend_from_slice(&tag);
        }

        let timeout = self.timeout;
        async {
            self.inner.write_all(&frame).await?;
            self.inner.flush().await
        }
        .timeout(timeout)
        .await??;

        tracing::trace!(
            "-~> #{}: ^{:#x} ({} bytes)",
            self.tx.seq,
            payload[0],
            payload.len(),
        );

        self.tx.seq = self.tx.seq.wrapping_add(1);

        Ok(())
    }

    /// Send a disconnect message and produce the terminal error to surface.
    pub async fn disconnect(
        &mut self,
        reason: DisconnectReason,
        description: impl Into<String>,
    ) -> Error {
        let description = description.into();

        // The peer may be gone already, its error is not the interesting one.
        self.send(
            &Disconnect {
                reason,
                description: description.clone(),
            }
            .encode(),
        )
        .await
        .ok();

        Error::Disconnected(DisconnectError {
            by: DisconnectedBy::Us,
            reason,
            description,
        })
    }

    fn padding(&self, payload: usize) -> usize {
        let etm = self
            .tx
            .mac
            .as_ref()
            .is_some_and(|mac| mac.alg().etm());

        let size = if etm {
            std::mem::size_of::<u8>() + payload
        } else {
            std::mem::size_of::<u32>() + std::mem::size_of::<u8>() + payload
        };
        let padding = MIN_ALIGN - size % MIN_ALIGN;

        let padding = if padding < MIN_PAD_SIZE {
            padding + MIN_ALIGN
        } else {
            padding
        };

        if size + padding < PACKET_MIN_SIZE {
            padding + MIN_ALIGN
        } else {
            padding
        }
    }
}
