// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # RTU loopback example
//!
//! A master and a slave exchanging frames through memory instead of a
//! serial line.

use modbus_engine::{Context, MemoryStorage, Server, Slave};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let slave = Slave(0x17);
    let mut master = Context::rtu();
    master.set_slave(slave)?;

    let mut ctx = Context::rtu();
    ctx.set_slave(slave)?;
    let mut server = Server::new(ctx, MemoryStorage::new(32, 0, 16, 0));

    let mut transfer = |master: &mut Context| -> anyhow::Result<usize> {
        let request = master.send_buf().to_vec();
        println!("-> {request:02X?}");
        let len = server.context_mut().receive(&request)?;
        let Some(response) = server.process_indication(len)? else {
            anyhow::bail!("no response");
        };
        println!("<- {response:02X?}");
        Ok(master.receive(response)?)
    };

    master.build_write_multiple_registers(0x02, &[0xABCD, 0x0102])?;
    let len = transfer(&mut master)?;
    println!("Write: {:?}", master.parse_write(len)?);

    master.build_read_holding_registers(0x00, 4)?;
    let len = transfer(&mut master)?;
    println!("Holding registers: {:?}", master.parse_read_holding_registers(len)?);

    master.build_write_single_coil(0x05, true)?;
    let len = transfer(&mut master)?;
    println!("Write: {:?}", master.parse_write(len)?);

    master.build_read_coils(0x00, 8)?;
    let len = transfer(&mut master)?;
    println!("Coils: {:?}", master.parse_read_coils(len)?);

    master.build_read_coils(0x1E, 4)?;
    let len = transfer(&mut master)?;
    println!("Coils beyond the table: {:?}", master.parse_read_coils(len)?);

    Ok(())
}
