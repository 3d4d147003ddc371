// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execute this test only if `tcp` feature is selected.

#![cfg(feature = "tcp")]

mod exception;

use exception::check_master_context;
use modbus_engine::{Context, Slave};

#[test]
fn all_exceptions() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut master = Context::tcp();
    master.set_slave(Slave(0x11))?;
    let mut slave = Context::tcp();
    slave.set_slave(Slave(0x11))?;

    check_master_context(master, slave);
    Ok(())
}

#[test]
fn all_exceptions_via_the_tcp_device_unit_id() {
    let _ = env_logger::builder().is_test(true).try_init();

    // The master targets 0xFF by default, which every TCP slave accepts.
    let master = Context::tcp();
    let mut slave = Context::tcp();
    slave.set_slave(Slave(0x11)).unwrap();

    check_master_context(master, slave);
}
