// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A transport-agnostic [Modbus](https://en.wikipedia.org/wiki/Modbus)
//! frame engine for masters and slaves.
//!
//! The engine builds, parses and validates RTU and TCP frames in
//! caller-owned buffers and never performs any I/O itself: the caller
//! moves the bytes between a [`Context`] and its serial port or socket.
//!
//! Modbus is based on a [master/slave](https://en.wikipedia.org/wiki/Master/slave_(technology))
//! model. The master side is implemented by the `build_*` and `parse_*`
//! methods of [`Context`], the slave side by
//! [`Context::process_indication`] together with a [`Storage`].
//!
//! ## Example
//!
//! ```
//! # #[cfg(feature = "rtu")]
//! # fn main() -> Result<(), modbus_engine::Error> {
//! use modbus_engine::{Context, MemoryStorage, Server, Slave};
//!
//! let mut master = Context::rtu();
//! master.set_slave(Slave(5))?;
//! let request = master.build_read_holding_registers(0x10, 2)?.to_vec();
//!
//! let mut storage = MemoryStorage::new(0, 0, 32, 0);
//! storage.holding_registers[0x10] = 0x1234;
//! let mut context = Context::rtu();
//! context.set_slave(Slave(5))?;
//! let mut slave = Server::new(context, storage);
//! let len = slave.context_mut().receive(&request)?;
//! let response = slave.process_indication(len)?.expect("response").to_vec();
//!
//! let len = master.receive(&response)?;
//! let words = master.parse_read_holding_registers(len)?;
//! assert_eq!(words, Ok(vec![0x1234, 0]));
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "rtu"))]
//! # fn main() {}
//! ```
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! modbus-engine = "*"
//! ```
//!
//! The `rtu` and `tcp` features select the available transports. Both
//! are enabled by default.

pub mod backend;
pub mod server;

mod client;
mod codec;
mod context;
mod error;
mod frame;
mod slave;

pub use self::{
    backend::{Backend, TransactionDescriptor, TransactionId},
    codec::CustomLengths,
    context::Context,
    error::Error,
    frame::*,
    server::{BitTable, MemoryStorage, RegisterTable, Server, Storage},
    slave::{Slave, SlaveId},
};

/// Result of an engine operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result of parsing a confirmation.
///
/// The outer `Err` reports local failures, the inner one an exception
/// response of the slave.
pub type ResponseResult<T> = Result<std::result::Result<T, ExceptionCode>>;
