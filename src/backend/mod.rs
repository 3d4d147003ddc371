// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport backends
//!
//! A [`Backend`] knows the frame geometry of one transport and the
//! handful of operations that differ between RTU and TCP framing. Master
//! and slave logic is written once against this enum.

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

use crate::{FunctionCode, Result, Slave};

/// TCP transaction identifier.
pub type TransactionId = u16;

/// Everything needed to address a response to an indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionDescriptor {
    pub slave: Slave,
    pub function: FunctionCode,
    /// Always `0` for RTU.
    pub transaction_id: TransactionId,
}

/// Backend-private scratch data of a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendState {
    transaction_id: TransactionId,
}

impl BackendState {
    /// The transaction id of the last request that has been built.
    #[must_use]
    pub const fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }
}

/// The transport of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Serial line framing with a trailing CRC-16.
    #[cfg(feature = "rtu")]
    Rtu,
    /// MBAP framing without checksum.
    #[cfg(feature = "tcp")]
    Tcp,
}

impl Backend {
    /// Number of bytes in front of the function code.
    #[must_use]
    pub const fn header_length(self) -> usize {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::HEADER_LENGTH,
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::HEADER_LENGTH,
        }
    }

    /// Number of bytes after the PDU.
    #[must_use]
    pub const fn checksum_length(self) -> usize {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::CHECKSUM_LENGTH,
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::CHECKSUM_LENGTH,
        }
    }

    /// Maximum length of a complete frame.
    #[must_use]
    pub const fn max_adu_length(self) -> usize {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::MAX_ADU_LENGTH,
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::MAX_ADU_LENGTH,
        }
    }

    /// The address a fresh context of this backend targets.
    #[must_use]
    pub const fn default_slave(self) -> Slave {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => Slave::min_device(),
            #[cfg(feature = "tcp")]
            Self::Tcp => Slave::tcp_device(),
        }
    }

    /// Validates `slave` for this transport.
    pub fn set_slave(self, slave: Slave) -> Result<Slave> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::set_slave(slave),
            #[cfg(feature = "tcp")]
            Self::Tcp => Ok(slave),
        }
    }

    /// Writes the header and the function code of a request into `buf`.
    ///
    /// TCP allocates the next transaction id from `state`. Returns the
    /// number of bytes written.
    pub fn build_request_basis(
        self,
        state: &mut BackendState,
        slave: Slave,
        function: FunctionCode,
        buf: &mut [u8],
    ) -> Result<usize> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => {
                let _ = state;
                rtu::build_basis(slave, function, buf)
            }
            #[cfg(feature = "tcp")]
            Self::Tcp => {
                let transaction_id = state.next_transaction_id();
                tcp::build_basis(transaction_id, slave, function, buf)
            }
        }
    }

    /// Writes the header and the function code of a response into `buf`.
    pub fn build_response_basis(
        self,
        descriptor: &TransactionDescriptor,
        buf: &mut [u8],
    ) -> Result<usize> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::build_basis(descriptor.slave, descriptor.function, buf),
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::build_basis(
                descriptor.transaction_id,
                descriptor.slave,
                descriptor.function,
                buf,
            ),
        }
    }

    /// Extracts the transaction id of a received indication.
    #[must_use]
    pub fn prepare_response_tid(self, msg: &[u8]) -> TransactionId {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => {
                let _ = msg;
                0
            }
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::transaction_id(msg),
        }
    }

    /// Finalizes the first `len` bytes of `buf` for transmission.
    ///
    /// RTU appends the CRC, TCP patches the MBAP length field. Returns
    /// the number of bytes to transmit.
    pub fn send_msg_pre(self, buf: &mut [u8], len: usize) -> Result<usize> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::send_msg_pre(buf, len),
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::send_msg_pre(buf, len),
        }
    }

    /// Verifies a complete received frame.
    ///
    /// Returns the length of the validated frame.
    pub fn check_integrity(self, msg: &[u8]) -> Result<usize> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::check_integrity(msg),
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::check_integrity(msg),
        }
    }

    /// Checks that the header of a confirmation matches its request.
    pub fn pre_check_confirmation(self, req: &[u8], rsp: &[u8]) -> Result<()> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::pre_check_confirmation(req, rsp),
            #[cfg(feature = "tcp")]
            Self::Tcp => tcp::pre_check_confirmation(req, rsp),
        }
    }

    /// Whether a slave with address `own` has to process an indication
    /// addressed to `target`.
    #[must_use]
    pub fn accepts(self, own: Slave, target: Slave) -> bool {
        if target == own || target.is_broadcast() {
            return true;
        }
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => false,
            #[cfg(feature = "tcp")]
            Self::Tcp => target == Slave::tcp_device(),
        }
    }

    /// Whether an indication addressed to `target` must remain unanswered.
    #[must_use]
    pub fn suppresses_response(self, target: Slave) -> bool {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => target.is_broadcast(),
            #[cfg(feature = "tcp")]
            Self::Tcp => {
                let _ = target;
                false
            }
        }
    }

    /// The slave address carried in the header of `msg`.
    pub(crate) fn slave_of(self, msg: &[u8]) -> Option<Slave> {
        let offset = self.header_length().checked_sub(1)?;
        msg.get(offset).copied().map(Slave)
    }
}
