// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus slave

mod storage;

pub use self::storage::{BitTable, MemoryStorage, RegisterTable, Storage, DEFAULT_SERVER_ID};

use byteorder::{BigEndian, ByteOrder as _};
use bytes::BufMut as _;

use crate::{
    backend::TransactionDescriptor,
    codec::{self, check_range},
    frame::{
        ExceptionCode, FunctionCode, Quantity, Word, MAX_PDU_SIZE, MAX_READ_BITS,
        MAX_READ_REGISTERS, MAX_RW_READ_REGISTERS, MAX_RW_WRITE_REGISTERS, MAX_WRITE_BITS,
        MAX_WRITE_REGISTERS,
    },
    Context, Error, Result, Slave,
};

/// How a processed indication is answered.
enum Reply {
    /// Repeat the request.
    Echo,
    /// Send the given number of data bytes following the function code.
    Data(usize),
}

fn read_u16(pdu: &[u8], offset: usize) -> u16 {
    BigEndian::read_u16(&pdu[offset..offset + 2])
}

fn check_quantity(quantity: Quantity, max: Quantity) -> std::result::Result<(), ExceptionCode> {
    if quantity == 0 || quantity > max {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(())
}

fn check_address(address: u16, quantity: Quantity) -> std::result::Result<(), ExceptionCode> {
    check_range(address, quantity).map_err(|_| ExceptionCode::IllegalDataAddress)
}

/// Executes the request in `pdu` against `storage`, writing the response
/// data into `body`.
///
/// `pdu` starts at the function code and has the length required by it.
#[allow(clippy::too_many_lines)]
fn dispatch<S: Storage + ?Sized>(
    storage: &mut S,
    server_id: Slave,
    pdu: &[u8],
    body: &mut [u8],
) -> std::result::Result<Reply, ExceptionCode> {
    let function = pdu[0];
    let reply = match function {
        0x01 | 0x02 => {
            let (address, quantity) = (read_u16(pdu, 1), read_u16(pdu, 3));
            check_quantity(quantity, MAX_READ_BITS)?;
            check_address(address, quantity)?;
            let table = if function == 0x01 {
                BitTable::Coils
            } else {
                BitTable::DiscreteInputs
            };
            let mut bits = [false; MAX_READ_BITS as usize];
            let bits = &mut bits[..usize::from(quantity)];
            storage.read_bits(table, address, bits)?;
            let byte_count = codec::packed_coils_size(bits.len());
            let mut dst = &mut body[..];
            dst.put_u8(codec::u8_len(byte_count));
            codec::encode_packed_coils(&mut dst, bits);
            Reply::Data(1 + byte_count)
        }
        0x03 | 0x04 => {
            let (address, quantity) = (read_u16(pdu, 1), read_u16(pdu, 3));
            check_quantity(quantity, MAX_READ_REGISTERS)?;
            check_address(address, quantity)?;
            let table = if function == 0x03 {
                RegisterTable::Holding
            } else {
                RegisterTable::Input
            };
            let mut words = [0; MAX_READ_REGISTERS as usize];
            let words = &mut words[..usize::from(quantity)];
            storage.read_registers(table, address, words)?;
            encode_words(body, words)
        }
        0x05 => {
            let address = read_u16(pdu, 1);
            let coil = codec::coil_to_bool(read_u16(pdu, 3)).ok_or(ExceptionCode::IllegalDataValue)?;
            storage.write_bits(address, &[coil])?;
            Reply::Echo
        }
        0x06 => {
            storage.write_registers(read_u16(pdu, 1), &[read_u16(pdu, 3)])?;
            Reply::Echo
        }
        0x07 => {
            body[0] = storage.read_exception_status()?;
            Reply::Data(1)
        }
        0x0F => {
            let (address, quantity) = (read_u16(pdu, 1), read_u16(pdu, 3));
            let byte_count = usize::from(pdu[5]);
            check_quantity(quantity, MAX_WRITE_BITS)?;
            if byte_count != codec::packed_coils_size(quantity.into()) {
                return Err(ExceptionCode::IllegalDataValue);
            }
            check_address(address, quantity)?;
            let mut bits = [false; MAX_WRITE_BITS as usize];
            let bits = &mut bits[..usize::from(quantity)];
            codec::decode_packed_coils(&pdu[6..6 + byte_count], bits);
            storage.write_bits(address, bits)?;
            echo_range(body, address, quantity)
        }
        0x10 => {
            let (address, quantity) = (read_u16(pdu, 1), read_u16(pdu, 3));
            let byte_count = usize::from(pdu[5]);
            check_quantity(quantity, MAX_WRITE_REGISTERS)?;
            if byte_count != usize::from(quantity) * 2 {
                return Err(ExceptionCode::IllegalDataValue);
            }
            check_address(address, quantity)?;
            let mut words = [0; MAX_WRITE_REGISTERS as usize];
            let words = decode_words(&pdu[6..6 + byte_count], &mut words);
            storage.write_registers(address, words)?;
            echo_range(body, address, quantity)
        }
        0x11 => {
            let (run, len) = storage.report_server_id(&mut body[3..])?;
            let len = len.min(body.len() - 3);
            body[0] = codec::u8_len(len + 2);
            body[1] = server_id.into();
            body[2] = if run { 0xFF } else { 0x00 };
            Reply::Data(3 + len)
        }
        0x16 => {
            let (address, and_mask, or_mask) = (read_u16(pdu, 1), read_u16(pdu, 3), read_u16(pdu, 5));
            let mut current = [0];
            storage.read_registers(RegisterTable::Holding, address, &mut current)?;
            let value = (current[0] & and_mask) | (or_mask & !and_mask);
            storage.write_registers(address, &[value])?;
            Reply::Echo
        }
        0x17 => {
            let (read_address, read_quantity) = (read_u16(pdu, 1), read_u16(pdu, 3));
            let (write_address, write_quantity) = (read_u16(pdu, 5), read_u16(pdu, 7));
            let byte_count = usize::from(pdu[9]);
            check_quantity(write_quantity, MAX_RW_WRITE_REGISTERS)?;
            check_quantity(read_quantity, MAX_RW_READ_REGISTERS)?;
            if byte_count != usize::from(write_quantity) * 2 {
                return Err(ExceptionCode::IllegalDataValue);
            }
            check_address(write_address, write_quantity)?;
            check_address(read_address, read_quantity)?;
            // The read range is probed first so a failing read leaves the
            // registers untouched.
            let mut words = [0; MAX_RW_READ_REGISTERS as usize];
            storage.read_registers(
                RegisterTable::Holding,
                read_address,
                &mut words[..usize::from(read_quantity)],
            )?;
            {
                let written = decode_words(&pdu[10..10 + byte_count], &mut words);
                storage.write_registers(write_address, written)?;
            }
            let words = &mut words[..usize::from(read_quantity)];
            storage.read_registers(RegisterTable::Holding, read_address, words)?;
            encode_words(body, words)
        }
        _ => {
            let len = storage.custom_function(function, &pdu[1..], body)?;
            if len > body.len() {
                log::warn!("Custom function 0x{function:02X} overflowed the response");
                return Err(ExceptionCode::ServerDeviceFailure);
            }
            Reply::Data(len)
        }
    };
    Ok(reply)
}

fn encode_words(body: &mut [u8], words: &[Word]) -> Reply {
    let mut dst = &mut body[..];
    dst.put_u8(codec::u8_len(words.len() * 2));
    for word in words {
        dst.put_u16(*word);
    }
    Reply::Data(1 + words.len() * 2)
}

fn decode_words<'a>(bytes: &[u8], dest: &'a mut [Word]) -> &'a [Word] {
    let count = bytes.len() / 2;
    for (word, chunk) in dest.iter_mut().zip(bytes.chunks_exact(2)) {
        *word = BigEndian::read_u16(chunk);
    }
    &dest[..count]
}

fn echo_range(body: &mut [u8], address: u16, quantity: Quantity) -> Reply {
    let mut dst = &mut body[..];
    dst.put_u16(address);
    dst.put_u16(quantity);
    Reply::Data(4)
}

impl Context {
    /// Processes the indication in the first `msg_len` bytes of the
    /// receive buffer.
    ///
    /// Returns the response frame to transmit, or `None` if the indication
    /// is not answered: it is addressed to another slave, it is an RTU
    /// broadcast, or the storage reported [`ExceptionCode::Unknown`].
    ///
    /// # Errors
    ///
    /// Incomplete or corrupted indications. Those are never answered.
    pub fn process_indication<S>(&mut self, msg_len: usize, storage: &mut S) -> Result<Option<&[u8]>>
    where
        S: Storage + ?Sized,
    {
        let frame_length = self.receive_judge(msg_len)?;
        let backend = self.backend;
        let header_length = backend.header_length();
        let checksum_length = backend.checksum_length();
        let frame = &self.read.as_capacity()[..frame_length];
        let target = backend
            .slave_of(frame)
            .ok_or(Error::MalformedFrame("missing slave address"))?;
        if !backend.accepts(self.slave, target) {
            log::debug!("Ignoring indication for slave {target}");
            return Ok(None);
        }
        let pdu = &frame[header_length..frame_length - checksum_length];
        let descriptor = TransactionDescriptor {
            slave: target,
            function: FunctionCode::new(pdu[0]),
            transaction_id: backend.prepare_response_tid(frame),
        };

        let mut body = [0; MAX_PDU_SIZE - 1];
        let reply = storage
            .check_indication(target, descriptor.function)
            .and_then(|()| dispatch(&mut *storage, self.slave, pdu, &mut body));
        let outcome = match &reply {
            Ok(_) => Ok(()),
            Err(exception) => Err(*exception),
        };
        storage.indication_done(descriptor.function, outcome);

        if backend.suppresses_response(target) {
            log::debug!("No response to broadcast {}", descriptor.function);
            return Ok(None);
        }
        match reply {
            Ok(Reply::Echo) => {
                let echo_length = frame_length - checksum_length;
                let (read, send) = (&self.read, &mut self.send);
                send.as_mut_capacity()[..echo_length]
                    .copy_from_slice(&read.as_capacity()[..echo_length]);
                self.finalize(echo_length).map(Some)
            }
            Ok(Reply::Data(len)) => {
                self.check_send_capacity(1 + len)?;
                let offset = backend.build_response_basis(&descriptor, self.send.as_mut_capacity())?;
                self.send.as_mut_capacity()[offset..offset + len].copy_from_slice(&body[..len]);
                self.finalize(offset + len).map(Some)
            }
            Err(ExceptionCode::Unknown) => {
                log::debug!("Suppressed response to {}", descriptor.function);
                Ok(None)
            }
            Err(exception) => self.build_exception_response(&descriptor, exception).map(Some),
        }
    }

    /// Builds an exception response to the transaction described by
    /// `descriptor`.
    pub fn build_exception_response(
        &mut self,
        descriptor: &TransactionDescriptor,
        exception: ExceptionCode,
    ) -> Result<&[u8]> {
        log::debug!(
            "Exception response to function {}: {exception}",
            descriptor.function
        );
        let offset = self
            .backend
            .build_response_basis(descriptor, self.send.as_mut_capacity())?;
        let buf = self.send.as_mut_capacity();
        buf[offset - 1] = descriptor.function.exception_value();
        buf[offset] = exception.into();
        self.finalize(offset + 1)
    }
}

/// A slave: a [`Context`] together with the data it serves.
#[derive(Debug)]
pub struct Server<S> {
    context: Context,
    storage: S,
}

impl<S: Storage> Server<S> {
    #[must_use]
    pub fn new(context: Context, storage: S) -> Self {
        Self { context, storage }
    }

    /// Processes the indication in the first `msg_len` bytes of the
    /// receive buffer, see [`Context::process_indication`].
    pub fn process_indication(&mut self, msg_len: usize) -> Result<Option<&[u8]>> {
        self.context.process_indication(msg_len, &mut self.storage)
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_parts(self) -> (Context, S) {
        (self.context, self.storage)
    }
}
