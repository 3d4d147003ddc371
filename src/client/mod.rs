// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus master
//!
//! Every request is built into the send buffer of a [`Context`] and
//! transmitted by the caller. The confirmation is then placed into the
//! receive buffer and parsed against the pending request.

use std::borrow::Cow;

use byteorder::{BigEndian, ByteOrder as _};
use bytes::BufMut as _;

use crate::{
    codec, frame::*, Context, Error, ExceptionCode, MessageType, ResponseResult, Result, Slave,
};

/// Request fields needed to judge a confirmation.
struct PendingRequest {
    function: u8,
    address: Option<u16>,
    // Quantity or written value
    quantity: Option<u16>,
}

impl PendingRequest {
    fn from_pdu(pdu: &[u8]) -> Self {
        Self {
            function: pdu.first().copied().unwrap_or_default(),
            address: pdu.get(1..3).map(BigEndian::read_u16),
            quantity: pdu.get(3..5).map(BigEndian::read_u16),
        }
    }

    /// The frame length of a successful confirmation, if it can be derived
    /// from the request.
    fn response_length(&self, header_length: usize, checksum_length: usize) -> Option<usize> {
        let quantity = usize::from(self.quantity?);
        let pdu_length = match self.function {
            0x01 | 0x02 => 2 + codec::packed_coils_size(quantity),
            0x03 | 0x04 | 0x17 => 2 + 2 * quantity,
            0x05 | 0x06 | 0x0F | 0x10 => 5,
            0x16 => 7,
            _ => return None,
        };
        Some(header_length + pdu_length + checksum_length)
    }
}

impl Context {
    /// Builds a request for the current slave.
    ///
    /// Returns the frame to transmit.
    ///
    /// # Errors
    ///
    /// Quantities and address ranges outside of the protocol limits are
    /// rejected before anything is written to the send buffer.
    pub fn build_request(&mut self, request: &Request<'_>) -> Result<&[u8]> {
        codec::validate_request(request)?;
        let pdu_size = codec::request_pdu_size(request)?;
        self.check_send_capacity(pdu_size)?;
        let header_length = self.backend.header_length();
        let offset = self.backend.build_request_basis(
            &mut self.state,
            self.slave,
            request.function_code(),
            self.send.as_mut_capacity(),
        )?;
        let mut dst = &mut self.send.as_mut_capacity()[offset..header_length + pdu_size];
        codec::encode_request_data(&mut dst, request);
        log::debug!(
            "Built request {:?} for slave {}",
            request.function_code(),
            self.slave
        );
        self.finalize(header_length + pdu_size)
    }

    /// Builds a request from a raw PDU with a leading slave address:
    /// `[slave, function, data..]`.
    ///
    /// The transport header is generated, e.g. a fresh TCP transaction id.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalDataValue`] unless `raw` holds 2 to 254 bytes.
    pub fn build_raw_request(&mut self, raw: &[u8]) -> Result<&[u8]> {
        if !(2..=MAX_PDU_SIZE + 1).contains(&raw.len()) {
            return Err(Error::IllegalDataValue("raw request length"));
        }
        let slave = Slave(raw[0]);
        let pdu = &raw[1..];
        self.check_send_capacity(pdu.len())?;
        let header_length = self.backend.header_length();
        let offset = self.backend.build_request_basis(
            &mut self.state,
            slave,
            FunctionCode::new(pdu[0]),
            self.send.as_mut_capacity(),
        )?;
        let mut dst = &mut self.send.as_mut_capacity()[offset..header_length + pdu.len()];
        dst.put_slice(&pdu[1..]);
        log::debug!("Built raw request 0x{:02X} for slave {slave}", pdu[0]);
        self.finalize(header_length + pdu.len())
    }

    /// Read multiple coils (0x01)
    pub fn build_read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<&[u8]> {
        self.build_request(&Request::ReadCoils(addr, cnt))
    }

    /// Read multiple discrete inputs (0x02)
    pub fn build_read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<&[u8]> {
        self.build_request(&Request::ReadDiscreteInputs(addr, cnt))
    }

    /// Read multiple holding registers (0x03)
    pub fn build_read_holding_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<&[u8]> {
        self.build_request(&Request::ReadHoldingRegisters(addr, cnt))
    }

    /// Read multiple input registers (0x04)
    pub fn build_read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<&[u8]> {
        self.build_request(&Request::ReadInputRegisters(addr, cnt))
    }

    /// Write a single coil (0x05)
    pub fn build_write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<&[u8]> {
        self.build_request(&Request::WriteSingleCoil(addr, coil))
    }

    /// Write a single holding register (0x06)
    pub fn build_write_single_register(&mut self, addr: Address, word: Word) -> Result<&[u8]> {
        self.build_request(&Request::WriteSingleRegister(addr, word))
    }

    /// Read the exception status outputs (0x07)
    pub fn build_read_exception_status(&mut self) -> Result<&[u8]> {
        self.build_request(&Request::ReadExceptionStatus)
    }

    /// Write multiple coils (0x0F)
    pub fn build_write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<&[u8]> {
        self.build_request(&Request::WriteMultipleCoils(addr, Cow::Borrowed(coils)))
    }

    /// Write multiple holding registers (0x10)
    pub fn build_write_multiple_registers(
        &mut self,
        addr: Address,
        words: &[Word],
    ) -> Result<&[u8]> {
        self.build_request(&Request::WriteMultipleRegisters(addr, Cow::Borrowed(words)))
    }

    /// Report server id (0x11)
    pub fn build_report_server_id(&mut self) -> Result<&[u8]> {
        self.build_request(&Request::ReportServerId)
    }

    /// Set or clear individual bits of a holding register (0x16)
    pub fn build_masked_write_register(
        &mut self,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<&[u8]> {
        self.build_request(&Request::MaskWriteRegister(addr, and_mask, or_mask))
    }

    /// Read and write multiple holding registers (0x17)
    ///
    /// The write operation is performed before the read unlike
    /// the name of the operation might suggest!
    pub fn build_read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<&[u8]> {
        self.build_request(&Request::ReadWriteMultipleRegisters(
            read_addr,
            read_count,
            write_addr,
            Cow::Borrowed(write_data),
        ))
    }

    /// Parses the confirmation in the first `msg_len` bytes of the receive
    /// buffer against the pending request.
    ///
    /// An exception response of the slave is returned as the inner `Err`.
    ///
    /// # Errors
    ///
    /// Integrity failures and confirmations that don't answer the pending
    /// request.
    pub fn parse_response(&mut self, msg_len: usize) -> ResponseResult<Response> {
        if self.send.is_empty() {
            return Err(Error::NoPendingRequest);
        }
        let frame_length = self.judge(msg_len, MessageType::Confirmation)?;
        let header_length = self.backend.header_length();
        let checksum_length = self.backend.checksum_length();
        let req = self.send.as_slice();
        let rsp = &self.read.as_capacity()[..frame_length];
        self.backend.pre_check_confirmation(req, rsp)?;

        let req_pdu = &req[header_length..req.len() - checksum_length];
        let rsp_pdu = &rsp[header_length..frame_length - checksum_length];
        let pending = PendingRequest::from_pdu(req_pdu);
        let function = rsp_pdu[0];

        if function == pending.function | 0x80 && pending.function & 0x80 == 0 {
            let exception = ExceptionCode::new(rsp_pdu[1]);
            log::debug!(
                "Exception response to function 0x{:02X}: {exception}",
                pending.function
            );
            return Ok(Err(exception));
        }
        if function != pending.function {
            return Err(Error::FunctionCodeMismatch {
                request: FunctionCode::new(pending.function),
                response: FunctionCode::new(function),
            });
        }
        if let Some(expected) = pending.response_length(header_length, checksum_length) {
            if frame_length != expected {
                return Err(Error::UnexpectedResponse("response length"));
            }
        }
        let response = codec::decode_response_pdu(rsp_pdu)?;
        check_response(&pending, req_pdu, response).map(Ok)
    }

    fn parse_typed<T>(
        &mut self,
        msg_len: usize,
        extract: impl FnOnce(Response) -> Option<T>,
    ) -> ResponseResult<T> {
        match self.parse_response(msg_len)? {
            Ok(response) => extract(response)
                .map(Ok)
                .ok_or(Error::UnexpectedResponse("response type")),
            Err(exception) => Ok(Err(exception)),
        }
    }

    pub fn parse_read_coils(&mut self, msg_len: usize) -> ResponseResult<Vec<Coil>> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::ReadCoils(coils) => Some(coils),
            _ => None,
        })
    }

    pub fn parse_read_discrete_inputs(&mut self, msg_len: usize) -> ResponseResult<Vec<Coil>> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::ReadDiscreteInputs(coils) => Some(coils),
            _ => None,
        })
    }

    pub fn parse_read_holding_registers(&mut self, msg_len: usize) -> ResponseResult<Vec<Word>> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::ReadHoldingRegisters(words) => Some(words),
            _ => None,
        })
    }

    pub fn parse_read_input_registers(&mut self, msg_len: usize) -> ResponseResult<Vec<Word>> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::ReadInputRegisters(words) => Some(words),
            _ => None,
        })
    }

    pub fn parse_read_write_multiple_registers(
        &mut self,
        msg_len: usize,
    ) -> ResponseResult<Vec<Word>> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::ReadWriteMultipleRegisters(words) => Some(words),
            _ => None,
        })
    }

    /// Parses the confirmation of any write request.
    ///
    /// The echoed address and values have already been checked against
    /// the request.
    pub fn parse_write(&mut self, msg_len: usize) -> ResponseResult<()> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::WriteSingleCoil(_, _)
            | Response::WriteSingleRegister(_, _)
            | Response::WriteMultipleCoils(_, _)
            | Response::WriteMultipleRegisters(_, _)
            | Response::MaskWriteRegister(_, _, _) => Some(()),
            _ => None,
        })
    }

    pub fn parse_read_exception_status(&mut self, msg_len: usize) -> ResponseResult<u8> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::ReadExceptionStatus(status) => Some(status),
            _ => None,
        })
    }

    /// Returns the server id, the run indicator and the additional data.
    pub fn parse_report_server_id(
        &mut self,
        msg_len: usize,
    ) -> ResponseResult<(u8, bool, Vec<u8>)> {
        self.parse_typed(msg_len, |rsp| match rsp {
            Response::ReportServerId(server_id, run, data) => Some((server_id, run, data)),
            _ => None,
        })
    }
}

/// Matches the decoded confirmation against the fields of the request.
fn check_response(pending: &PendingRequest, req_pdu: &[u8], response: Response) -> Result<Response> {
    use crate::frame::Response::*;
    let echoed = |address: Address, value: u16| {
        if pending.address == Some(address) && pending.quantity == Some(value) {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse("echoed address or value"))
        }
    };
    let quantity = usize::from(pending.quantity.unwrap_or_default());
    let response = match response {
        ReadCoils(mut coils) => {
            coils.truncate(quantity);
            ReadCoils(coils)
        }
        ReadDiscreteInputs(mut coils) => {
            coils.truncate(quantity);
            ReadDiscreteInputs(coils)
        }
        WriteSingleCoil(address, coil) => {
            echoed(address, codec::bool_to_coil(coil))?;
            WriteSingleCoil(address, coil)
        }
        WriteSingleRegister(address, word) => {
            echoed(address, word)?;
            WriteSingleRegister(address, word)
        }
        WriteMultipleCoils(address, cnt) => {
            echoed(address, cnt)?;
            WriteMultipleCoils(address, cnt)
        }
        WriteMultipleRegisters(address, cnt) => {
            echoed(address, cnt)?;
            WriteMultipleRegisters(address, cnt)
        }
        MaskWriteRegister(address, and_mask, or_mask) => {
            let or_echoed = req_pdu.get(5..7).map(BigEndian::read_u16) == Some(or_mask);
            echoed(address, and_mask)?;
            if !or_echoed {
                return Err(Error::UnexpectedResponse("echoed address or value"));
            }
            MaskWriteRegister(address, and_mask, or_mask)
        }
        other => other,
    };
    Ok(response)
}
