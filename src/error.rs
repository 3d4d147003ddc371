// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use thiserror::Error;

use crate::{backend::TransactionId, FunctionCode, Slave};

/// Local error conditions that cannot be expressed on the wire.
///
/// None of these are ever transmitted. The operation that reported them
/// is abandoned and the engine does not retry it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The buffer ends before the frame does.
    #[error("frame too short: {actual} byte(s) received, {expected} required")]
    FrameTooShort { expected: usize, actual: usize },

    /// The frame exceeds the maximum ADU length of the backend.
    #[error("frame too long: {actual} byte(s), at most {max} allowed")]
    FrameTooLong { max: usize, actual: usize },

    /// The RTU CRC does not match the frame contents.
    #[error("checksum mismatch: calculated 0x{calculated:04X}, received 0x{received:04X}")]
    ChecksumMismatch { calculated: u16, received: u16 },

    /// The MBAP length field disagrees with the bytes of the frame.
    #[error("length field mismatch: header declares {declared} byte(s), frame carries {actual}")]
    LengthFieldMismatch { declared: usize, actual: usize },

    /// The MBAP protocol identifier is not _Modbus_ (`0x0000`).
    #[error("invalid protocol identifier: 0x{0:04X}")]
    InvalidProtocolId(u16),

    /// The confirmation belongs to another transaction.
    #[error("transaction mismatch: request = {request}, response = {response}")]
    TransactionMismatch {
        request: TransactionId,
        response: TransactionId,
    },

    /// The confirmation was sent by another slave than the one addressed.
    #[error("slave mismatch: request = {request}, response = {response}")]
    SlaveMismatch { request: Slave, response: Slave },

    /// The function code of the confirmation doesn't match the request.
    #[error("function code mismatch: request = {request}, response = {response}")]
    FunctionCodeMismatch {
        request: FunctionCode,
        response: FunctionCode,
    },

    /// The confirmation is well-formed but doesn't answer the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),

    /// The frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// The function code is not supported by this operation.
    #[error("illegal function: {0}")]
    IllegalFunction(FunctionCode),

    /// The addressed range exceeds the 16 bit address space.
    #[error("illegal data address: {address} + {quantity} item(s)")]
    IllegalDataAddress { address: u16, quantity: u16 },

    /// A quantity or value is outside of the range permitted by the protocol.
    #[error("illegal data value: {0}")]
    IllegalDataValue(&'static str),

    /// The encoded frame would not fit into the buffer.
    #[error("buffer overflow: {required} byte(s) required, capacity is {capacity}")]
    BufferOverflow { required: usize, capacity: usize },

    /// The address is not valid for the active backend.
    #[error("invalid slave address: {0}")]
    InvalidSlave(Slave),

    /// A confirmation was passed before any request has been built.
    #[error("no pending request")]
    NoPendingRequest,
}
