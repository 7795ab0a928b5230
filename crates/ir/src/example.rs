//! Bundled example register map (a small UART controller).

use crate::{Field, Register, RegisterMapConfig};

/// File name the example is presented under, as if it had been uploaded.
pub const EXAMPLE_FILE_NAME: &str = "example-default.json";

fn field(name: &str, bits: &str, access: &str, description: &str) -> Field {
    Field::new(name, bits, access).with_description(description)
}

/// Builds the default example map.
pub fn default_example() -> RegisterMapConfig {
    let data = Register::new("DATA", 0x04)
        .with_description("Data register")
        .with_field(field(
            "FIFO",
            "7:0",
            "rw",
            "Write to push value to TX FIFO, read to get data from RX FIFO",
        ))
        .with_field(field(
            "FERR",
            "16",
            "rolh",
            "Frame error flag. Read to clear.",
        ))
        .with_field(field(
            "PERR",
            "17",
            "rolh",
            "Parity error flag. Read to clear.",
        ));
    let stat = Register::new("STAT", 0x0c)
        .with_description("Status register")
        .with_field(field("BUSY", "2", "ro", "Transceiver is busy"))
        .with_field(field("RXE", "4", "ro", "RX FIFO is empty"))
        .with_field(field("TXF", "8", "ro", "TX FIFO is full"));
    let ctrl = Register::new("CTRL", 0x10)
        .with_description("Control register")
        .with_field(
            field("BAUD", "1:0", "rw", "Baudrate value")
                .with_enum("B9600", 0)
                .with_enum("B38400", 1)
                .with_enum("B115200", 2),
        )
        .with_field(field("TXEN", "4", "rw", "Transmitter enable"))
        .with_field(field("RXEN", "5", "rw", "Receiver enable"))
        .with_field(field("TXST", "6", "wosc", "Force transmission start"));
    let lpmode = Register::new("LPMODE", 0x14)
        .with_description("Low power mode control")
        .with_field(field("DIV", "7:0", "rw", "Clock divider in low power mode"))
        .with_field(field("EN", "31", "rw", "Low power mode enable"));
    let intstat = Register::new("INTSTAT", 0x20)
        .with_description("Interrupt status register")
        .with_field(field(
            "TX",
            "0",
            "rw1c",
            "Transmitter interrupt flag. Write 1 to clear.",
        ))
        .with_field(field(
            "RX",
            "1",
            "rw1c",
            "Receiver interrupt. Write 1 to clear.",
        ));
    let id = Register::new("ID", 0x40)
        .with_description("IP-core ID register")
        .with_reset(0xcafe_0666)
        .with_field(field("UID", "31:0", "ro", "Unique ID"));

    RegisterMapConfig::new("uart")
        .with_register(data)
        .with_register(stat)
        .with_register(ctrl)
        .with_register(lpmode)
        .with_register(intstat)
        .with_register(id)
}
