//! Integration tests running complete programs
//!
//! Each test loads a small hand-assembled program into a `Simulator`, runs
//! it and checks what the program did to RAM, the SFRs and the outside
//! world seen through the `ExternalBus`.

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::bus::ExternalBus;
    use crate::config::SimConfig;
    use crate::peripherals::{I2cCommand, I2cStatus};
    use crate::sim::Simulator;

    /// What the chip did to the outside world
    #[derive(Debug, Default)]
    struct Wires {
        serial: Vec<u8>,
        i2c: Vec<(I2cCommand, u8)>,
    }

    /// ROM plus a recording of every outbound transfer
    struct Board {
        rom: Vec<u8>,
        wires: Rc<RefCell<Wires>>,
        /// Address the I2C slave answers to (write address)
        slave: u8,
    }

    impl ExternalBus for Board {
        fn code_byte(&mut self, address: u16) -> u8 {
            self.rom.get(address as usize).copied().unwrap_or(0xFF)
        }

        fn ram_byte(&mut self, _address: u16) -> u8 {
            0xFF
        }

        fn set_ram_byte(&mut self, _address: u16, _value: u8) {}

        fn i2c_command(&mut self, command: I2cCommand, data: &mut u8) -> bool {
            self.wires.borrow_mut().i2c.push((command, *data));
            match command {
                I2cCommand::Address => *data & 0xFE == self.slave,
                _ => true,
            }
        }

        fn serial_transmit(&mut self, byte: u8) {
            self.wires.borrow_mut().serial.push(byte);
        }
    }

    fn board(rom: &[u8], config: SimConfig) -> (Simulator, Rc<RefCell<Wires>>) {
        let wires = Rc::new(RefCell::new(Wires::default()));
        let external = Box::new(Board {
            rom: rom.to_vec(),
            wires: Rc::clone(&wires),
            slave: 0xA0,
        });
        let mut sim = Simulator::new(config, external, rom.to_vec()).unwrap();
        sim.build_listing().unwrap();
        (sim, wires)
    }

    /// Place `bytes` at `address` in a NOP-filled image
    fn place(image: &mut Vec<u8>, address: usize, bytes: &[u8]) {
        if image.len() < address + bytes.len() {
            image.resize(address + bytes.len(), 0x00);
        }
        image[address..address + bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn test_timer0_interrupt_counts_overflows() {
        let mut rom = Vec::new();
        place(&mut rom, 0x0000, &[0x02, 0x00, 0x30]); // LJMP main
        place(&mut rom, 0x000B, &[0x05, 0x30, 0x32]); // INC 30h; RETI
        place(
            &mut rom,
            0x0030,
            &[
                0x75, 0x89, 0x02, // MOV TMOD,#02h (mode 2)
                0x75, 0x8C, 0xF6, // MOV TH0,#F6h
                0x75, 0x8A, 0xF6, // MOV TL0,#F6h
                0x75, 0xA8, 0x82, // MOV IEN0,#82h
                0xD2, 0x8C, // SETB TR0
                0x80, 0xFE, // SJMP $
            ],
        );
        let (mut sim, _) = board(&rom, SimConfig::default());

        assert_eq!(sim.run(200).unwrap(), 200);
        let count = sim.bus.read_byte(0x30);
        assert!(count >= 10, "only {count} overflows");
        assert_eq!(sim.read_register("TH0").unwrap(), 0xF6);
        assert!(sim.listing().get(0x000B).is_some_and(|e| !e.is_data()));
    }

    #[test]
    fn test_uart_transmits_string_table() {
        let mut rom = Vec::new();
        place(
            &mut rom,
            0x0000,
            &[
                0x90, 0x00, 0x20, // MOV DPTR,#0020h
                0xE4, // next: CLR A
                0x93, // MOVC A,@A+DPTR
                0x60, 0x0A, // JZ done
                0xF5, 0x99, // MOV S0BUF,A
                0x30, 0x99, 0xFD, // JNB TI,$
                0xC2, 0x99, // CLR TI
                0xA3, // INC DPTR
                0x80, 0xF2, // SJMP next
                0x80, 0xFE, // done: SJMP $
            ],
        );
        place(&mut rom, 0x0020, b"HI!\0");
        let config = SimConfig {
            serial_cycles_per_byte: 8,
            ..SimConfig::default()
        };
        let (mut sim, wires) = board(&rom, config);

        sim.run(300).unwrap();
        assert_eq!(sim.pc(), 0x0011);
        assert_eq!(wires.borrow().serial, b"HI!");
    }

    #[test]
    fn test_uart_receive_sets_ri() {
        // MOV S0CON,#10h (REN); JNB RI,$; MOV A,S0BUF; SJMP $
        let rom = [0x75, 0x98, 0x10, 0x30, 0x98, 0xFD, 0xE5, 0x99, 0x80, 0xFE];
        let (mut sim, _) = board(&rom, SimConfig::default());

        assert!(!sim.receive_serial(0x11));
        sim.run(10).unwrap();
        assert_eq!(sim.pc(), 0x0003);

        assert!(sim.receive_serial(0x42));
        sim.run(3).unwrap();
        assert_eq!(sim.read_register("ACC").unwrap(), 0x42);
        assert_eq!(sim.pc(), 0x0008);
    }

    #[test]
    fn test_external_interrupt_edges() {
        let mut rom = Vec::new();
        place(&mut rom, 0x0000, &[0x02, 0x00, 0x30]); // LJMP main
        place(&mut rom, 0x0003, &[0x05, 0x31, 0x32]); // INC 31h; RETI
        place(
            &mut rom,
            0x0030,
            &[
                0xD2, 0x88, // SETB IT0
                0x75, 0xA8, 0x81, // MOV IEN0,#81h
                0x80, 0xFE, // SJMP $
            ],
        );
        let (mut sim, _) = board(&rom, SimConfig::default());
        sim.run(5).unwrap();

        sim.write_bit("P3.2", false).unwrap();
        sim.run(5).unwrap();
        assert_eq!(sim.bus.read_byte(0x31), 1);
        assert!(!sim.read_bit("IE0").unwrap());

        // Holding the pin low is not another edge
        sim.run(5).unwrap();
        assert_eq!(sim.bus.read_byte(0x31), 1);

        sim.write_bit("P3.2", true).unwrap();
        sim.run(2).unwrap();
        sim.write_bit("P3.2", false).unwrap();
        sim.run(5).unwrap();
        assert_eq!(sim.bus.read_byte(0x31), 2);
    }

    #[test]
    fn test_adc_conversion_polling() {
        let rom = [
            0x75, 0xC5, 0x0B, // MOV ADCON,#0Bh (ADCS, channel 3)
            0xE5, 0xC5, // wait: MOV A,ADCON
            0x30, 0xE4, 0xFB, // JNB ACC.4,wait
            0xAF, 0xC6, // MOV R7,ADCH
            0x80, 0xFE, // SJMP $
        ];
        let (mut sim, _) = board(&rom, SimConfig::default());
        sim.set_adc_input(3, 0x2A7);

        sim.run(100).unwrap();
        assert_eq!(sim.pc(), 0x000A);
        assert_eq!(sim.bus.read_byte(0x07), 0xA9);
        let adcon = sim.read_register("ADCON").unwrap();
        assert_eq!(adcon & 0xC0, 0xC0);
        assert_eq!(adcon & 0x07, 3);
        assert!(sim.read_bit("ADCI").unwrap());
    }

    #[test]
    fn test_i2c_master_write() {
        let rom = [
            0x75, 0xD8, 0xC6, // MOV S1CON,#C6h (ENS1, AA, fastest rate)
            0xD2, 0xDD, // SETB STA
            0x30, 0xDB, 0xFD, // JNB SI,$
            0x75, 0xDA, 0xA0, // MOV S1DAT,#A0h
            0xC2, 0xDD, // CLR STA
            0xC2, 0xDB, // CLR SI
            0x30, 0xDB, 0xFD, // JNB SI,$
            0x75, 0xDA, 0x5A, // MOV S1DAT,#5Ah
            0xC2, 0xDB, // CLR SI
            0x30, 0xDB, 0xFD, // JNB SI,$
            0xD2, 0xDC, // SETB STO
            0xC2, 0xDB, // CLR SI
            0x80, 0xFE, // SJMP $
        ];
        let (mut sim, wires) = board(&rom, SimConfig::default());

        sim.run(400).unwrap();
        assert_eq!(sim.pc(), 0x001E);
        assert_eq!(sim.i2c_status(), I2cStatus::Reset);
        assert_eq!(sim.read_register("S1STA").unwrap(), 0xF8);

        let log = &wires.borrow().i2c;
        let commands: Vec<_> = log.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            commands,
            [
                I2cCommand::Start,
                I2cCommand::Address,
                I2cCommand::Data,
                I2cCommand::Stop
            ]
        );
        assert_eq!(log[1].1, 0xA0);
        assert_eq!(log[2].1, 0x5A);
    }

    #[test]
    fn test_i2c_address_nack() {
        let rom = [
            0x75, 0xD8, 0xC6, // MOV S1CON,#C6h
            0xD2, 0xDD, // SETB STA
            0x30, 0xDB, 0xFD, // JNB SI,$
            0x75, 0xDA, 0x42, // MOV S1DAT,#42h (nobody home)
            0xC2, 0xDD, // CLR STA
            0xC2, 0xDB, // CLR SI
            0x30, 0xDB, 0xFD, // JNB SI,$
            0x80, 0xFE, // SJMP $
        ];
        let (mut sim, _) = board(&rom, SimConfig::default());

        sim.run(200).unwrap();
        assert_eq!(sim.pc(), 0x0012);
        assert_eq!(sim.i2c_status(), I2cStatus::SlaWNack);
    }

    #[test]
    fn test_watchdog_resets_program() {
        // INC 30h; SJMP $
        let rom = [0x05, 0x30, 0x80, 0xFE];
        let (mut sim, _) = board(&rom, SimConfig::default());

        // T3 loads only while the watchdog is held off
        sim.write_register("PCON", 0x10).unwrap();
        sim.write_register("T3", 0xFE).unwrap();
        assert_eq!(sim.read_register("T3").unwrap(), 0xFE);
        assert_eq!(sim.read_register("PCON").unwrap() & 0x10, 0);

        sim.set_ew_pin(false);
        sim.run(3000).unwrap();
        // RAM survives the reset, so the boot count shows it
        assert_eq!(sim.bus.read_byte(0x30), 2);
        assert!(sim.cycles() < 3000 * 2);
    }

    #[test]
    fn test_watchdog_off_with_ew_high() {
        let rom = [0x05, 0x30, 0x80, 0xFE];
        let (mut sim, _) = board(&rom, SimConfig::default());
        sim.write_register("PCON", 0x10).unwrap();
        sim.write_register("T3", 0xFF).unwrap();

        sim.run(3000).unwrap();
        assert_eq!(sim.bus.read_byte(0x30), 1);
        assert_eq!(sim.cycles(), 1 + 2999 * 2);
    }

    #[test]
    fn test_listing_round_trip_keeps_running() {
        let mut rom = Vec::new();
        place(&mut rom, 0x0000, &[0x02, 0x00, 0x30]);
        place(&mut rom, 0x0030, &[0x7F, 0x03, 0xDF, 0xFE, 0x80, 0xFE]); // MOV R7,#3; DJNZ R7,$; SJMP $
        let (mut sim, _) = board(&rom, SimConfig::default());

        let text = sim.listing_text();
        sim.load_listing(&text).unwrap();
        assert_eq!(sim.listing_text(), text);

        sim.run(5).unwrap();
        assert_eq!(sim.pc(), 0x0034);
        assert_eq!(sim.bus.read_byte(0x07), 0);
    }
}
