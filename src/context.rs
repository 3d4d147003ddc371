// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    backend::{Backend, BackendState, TransactionId},
    codec::{self, CustomLengths},
    Error, MessageType, Result, Slave,
};

/// A fixed-capacity byte buffer with an explicit fill level.
#[derive(Debug, Clone)]
pub(crate) struct FrameBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl FrameBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub(crate) fn as_capacity(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn as_mut_capacity(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The state of one logical _Modbus_ endpoint.
///
/// A context owns a send and a receive buffer, both sized to at least the
/// maximum frame length of its backend. It never performs I/O: requests
/// and responses are built into the send buffer, received bytes are
/// placed into the receive buffer by the caller.
///
/// A context serves one transaction at a time and must not be shared
/// between threads without external synchronization.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) backend: Backend,
    pub(crate) state: BackendState,
    pub(crate) slave: Slave,
    pub(crate) send: FrameBuffer,
    pub(crate) read: FrameBuffer,
    pub(crate) custom_lengths: Option<CustomLengths>,
}

impl Context {
    /// Creates a context with buffers of the maximum frame length.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        let max = backend.max_adu_length();
        Self::with_capacity(backend, max, max)
    }

    /// Creates a context for a serial line targeting slave 1.
    #[cfg(feature = "rtu")]
    #[must_use]
    pub fn rtu() -> Self {
        Self::new(Backend::Rtu)
    }

    /// Creates a context for TCP targeting unit id `0xFF`.
    #[cfg(feature = "tcp")]
    #[must_use]
    pub fn tcp() -> Self {
        Self::new(Backend::Tcp)
    }

    /// Creates a context with custom buffer capacities.
    ///
    /// Capacities below the maximum frame length of `backend` are raised.
    #[must_use]
    pub fn with_capacity(backend: Backend, send_capacity: usize, read_capacity: usize) -> Self {
        let max = backend.max_adu_length();
        Self {
            backend,
            state: BackendState::default(),
            slave: backend.default_slave(),
            send: FrameBuffer::with_capacity(send_capacity.max(max)),
            read: FrameBuffer::with_capacity(read_capacity.max(max)),
            custom_lengths: None,
        }
    }

    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// The slave this context targets (master) or answers as (slave).
    #[must_use]
    pub const fn slave(&self) -> Slave {
        self.slave
    }

    /// Sets the slave address.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSlave`] if the address is reserved on this transport.
    pub fn set_slave(&mut self, slave: Slave) -> Result<()> {
        self.slave = self.backend.set_slave(slave)?;
        Ok(())
    }

    /// The transaction id of the last request that has been built.
    #[must_use]
    pub const fn transaction_id(&self) -> TransactionId {
        self.state.transaction_id()
    }

    /// Registers length rules for function codes the engine doesn't know.
    pub fn set_custom_lengths(&mut self, custom_lengths: Option<CustomLengths>) {
        self.custom_lengths = custom_lengths;
    }

    /// The last frame built into the send buffer.
    #[must_use]
    pub fn send_buf(&self) -> &[u8] {
        self.send.as_slice()
    }

    /// The receive buffer, for the caller to fill with received bytes.
    pub fn read_buf_mut(&mut self) -> &mut [u8] {
        self.read.as_mut_capacity()
    }

    #[must_use]
    pub fn read_capacity(&self) -> usize {
        self.read.capacity()
    }

    /// Copies `msg` into the receive buffer.
    ///
    /// Returns the number of bytes to pass on as `msg_len`.
    ///
    /// # Errors
    ///
    /// [`Error::BufferOverflow`] if `msg` exceeds the receive buffer.
    pub fn receive(&mut self, msg: &[u8]) -> Result<usize> {
        let capacity = self.read.capacity();
        let Some(dst) = self.read.as_mut_capacity().get_mut(..msg.len()) else {
            return Err(Error::BufferOverflow {
                required: msg.len(),
                capacity,
            });
        };
        dst.copy_from_slice(msg);
        self.read.len = msg.len();
        Ok(msg.len())
    }

    /// Validates the indication in the first `msg_len` bytes of the
    /// receive buffer and returns the length of the frame it starts with.
    ///
    /// # Errors
    ///
    /// Fails if the frame is incomplete, too long or corrupted.
    pub fn receive_judge(&self, msg_len: usize) -> Result<usize> {
        self.judge(msg_len, MessageType::Indication)
    }

    pub(crate) fn judge(&self, msg_len: usize, msg_type: MessageType) -> Result<usize> {
        let capacity = self.read.capacity();
        let Some(msg) = self.read.as_capacity().get(..msg_len) else {
            return Err(Error::BufferOverflow {
                required: msg_len,
                capacity,
            });
        };
        codec::judge_frame(self.backend, msg, msg_type, self.custom_lengths.as_ref())
    }

    /// Finalizes the first `len` bytes of the send buffer.
    pub(crate) fn finalize(&mut self, len: usize) -> Result<&[u8]> {
        let len = self.backend.send_msg_pre(self.send.as_mut_capacity(), len)?;
        self.send.len = len;
        Ok(self.send.as_slice())
    }

    /// Fails unless a PDU of `pdu_size` bytes fits into a frame.
    pub(crate) fn check_send_capacity(&self, pdu_size: usize) -> Result<()> {
        let required =
            self.backend.header_length() + pdu_size + self.backend.checksum_length();
        let capacity = self.send.capacity().min(self.backend.max_adu_length());
        if required > capacity {
            return Err(Error::BufferOverflow { required, capacity });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "rtu")]
    #[test]
    fn rtu_defaults() {
        let ctx = Context::rtu();
        assert_eq!(ctx.slave(), Slave(1));
        assert_eq!(ctx.read_capacity(), 256);
        assert!(ctx.send_buf().is_empty());
    }

    #[cfg(feature = "tcp")]
    #[test]
    fn tcp_defaults() {
        let ctx = Context::tcp();
        assert_eq!(ctx.slave(), Slave(0xFF));
        assert_eq!(ctx.read_capacity(), 260);
        assert_eq!(ctx.transaction_id(), 0);
    }

    #[cfg(feature = "tcp")]
    #[test]
    fn capacities_are_raised_to_the_maximum_frame_length() {
        let ctx = Context::with_capacity(Backend::Tcp, 10, 1000);
        assert_eq!(ctx.send.capacity(), 260);
        assert_eq!(ctx.read_capacity(), 1000);
    }

    #[cfg(feature = "rtu")]
    #[test]
    fn rtu_rejects_reserved_slaves() {
        let mut ctx = Context::rtu();
        assert_eq!(
            ctx.set_slave(Slave(248)).unwrap_err(),
            Error::InvalidSlave(Slave(248))
        );
        assert_eq!(ctx.slave(), Slave(1));
        ctx.set_slave(Slave(0)).unwrap();
        assert_eq!(ctx.slave(), Slave::broadcast());
    }

    #[cfg(feature = "tcp")]
    #[test]
    fn tcp_accepts_any_unit_id() {
        let mut ctx = Context::tcp();
        ctx.set_slave(Slave(248)).unwrap();
        assert_eq!(ctx.slave(), Slave(248));
    }

    #[cfg(feature = "tcp")]
    #[test]
    fn receive_judge_with_overflowing_custom_lengths() {
        let mut ctx = Context::tcp();
        ctx.set_custom_lengths(Some(CustomLengths {
            meta: |_, _| usize::MAX,
            data: |_, _| 1,
        }));
        let len = ctx
            .receive(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0xFF, 0x41, 0x00])
            .unwrap();
        assert!(matches!(
            ctx.receive_judge(len),
            Err(Error::FrameTooLong { max: 260, .. })
        ));
    }

    #[cfg(feature = "rtu")]
    #[test]
    fn receive_more_than_the_capacity() {
        let mut ctx = Context::rtu();
        assert_eq!(
            ctx.receive(&[0; 257]).unwrap_err(),
            Error::BufferOverflow {
                required: 257,
                capacity: 256
            }
        );
        assert!(matches!(
            ctx.receive_judge(300),
            Err(Error::BufferOverflow { .. })
        ));
    }
}
