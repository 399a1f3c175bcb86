// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dataport` module assembles bytes arriving on the sound data port
//! into commands.
//!
//! Plain two-byte words below 0x8000 queue as track commands. The 0x55xx
//! range carries control commands: volume and channel levels arrive as
//! four-byte sequences whose last two bytes must be bitwise complements,
//! and 0x55C2/0x55C3 query the reported firmware version. A partial
//! sequence is silently discarded if more than 13 main-loop passes (about
//! 100 ms) elapse between bytes.

use log::debug;

use crate::{Decoder, GameId};

impl Decoder {
    pub(crate) fn data_port_write(&mut self, data: u8) {
        // age out any partial sequence
        if self.data_port_timeout >= 13 {
            self.n_data_port_bytes = 0;
        }

        match self.n_data_port_bytes {
            0 => {
                self.data_port_word = u16::from(data) << 8;
                self.n_data_port_bytes = 1;
            }

            1 => {
                let word = self.data_port_word | u16::from(data);
                self.data_port_word = word;

                if (word >= 0x55AA && word <= 0x55B2) || (word >= 0x55BA && word <= 0x55C1) {
                    // start of a four-byte sequence
                    self.data_port_ext = word;
                    self.n_data_port_bytes = 2;
                }
                else if word > 0x55B2 && word < 0x55BA {
                    // a hole in the extended command space
                    debug!("data port: discarding invalid command {:04x}", word);
                    self.n_data_port_bytes = 0;
                }
                else if word == 0x55C2 || word == 0x55C3 {
                    // version query: 55C2 reports the high byte, 55C3 the low
                    let v = if word == 0x55C2 {
                        (self.reported_version >> 8) as u8
                    }
                    else {
                        self.reported_version as u8
                    };
                    self.host.receive_data_port(v);
                    self.n_data_port_bytes = 0;
                }
                else if (word & 0x8000) != 0 {
                    // the track command space is 15 bits
                    self.n_data_port_bytes = 0;
                }
                else if word == 0x03E7 && self.game_id == GameId::Totan {
                    // TOTAN's firmware intercepts this one command in its
                    // IRQ handler and answers 0x11 instead of queueing it
                    self.host.receive_data_port(0x11);
                    self.n_data_port_bytes = 0;
                }
                else {
                    self.command_queue.push_back(word);
                    self.n_data_port_bytes = 0;
                }
            }

            2 => {
                // third byte: the payload of a four-byte sequence
                self.data_port_word = u16::from(data);
                self.n_data_port_bytes = 3;
            }

            _ => {
                // Fourth byte: must be the complement of the third, or the
                // whole sequence is dropped.
                if self.data_port_word == u16::from(data ^ 0xFF) {
                    let value = self.data_port_word as u8;
                    if self.data_port_ext == 0x55AA {
                        self.set_master_volume(value);
                    }
                    else if self.data_port_ext <= 0x55B2 {
                        let ch = (self.data_port_ext - 0x55AB) as usize;
                        self.set_channel_volume(ch, value);
                    }
                    else if self.data_port_ext >= 0x55BA && self.data_port_ext <= 0x55C1 {
                        // shadow parameter writes; stored but unobservable
                        let ch = (self.data_port_ext - 0x55BA) as usize;
                        if ch < self.channels.len() {
                            self.channels[ch].shadow_params.target = 0;
                            self.channels[ch].shadow_params.command =
                                u32::from(self.data_port_word);
                        }
                    }
                }
                else {
                    debug!(
                        "data port: bad complement for {:04x}, dropping",
                        self.data_port_ext
                    );
                }
                self.n_data_port_bytes = 0;
            }
        }

        // every byte restarts the inter-byte timeout
        self.data_port_timeout = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::{Decoder, Host, NullHost};
    use dcs_core::rom::OsVersion;

    struct RecordingHost {
        bytes: Rc<RefCell<Vec<u8>>>,
    }

    impl Host for RecordingHost {
        fn receive_data_port(&mut self, byte: u8) {
            self.bytes.borrow_mut().push(byte);
        }
    }

    fn booted_decoder() -> Decoder {
        let mut dec = Decoder::new(Box::new(NullHost));
        dec.init_standalone(OsVersion::Os94);
        dec.soft_boot().unwrap();
        dec
    }

    #[test]
    fn verify_master_volume_sequence() {
        let mut dec = booted_decoder();
        for b in [0x55, 0xAA, 0x80, 0x7F] {
            dec.irq2(b);
        }
        assert_eq!(dec.master_volume(), 0x80);
    }

    #[test]
    fn verify_bad_complement_is_dropped() {
        let mut dec = booted_decoder();
        let before = dec.master_volume();
        for b in [0x55, 0xAA, 0x80, 0x00] {
            dec.irq2(b);
        }
        assert_eq!(dec.master_volume(), before);
    }

    #[test]
    fn verify_track_command_queued() {
        let mut dec = booted_decoder();
        dec.irq2(0x01);
        dec.irq2(0x23);
        assert_eq!(dec.command_queue.back(), Some(&0x0123));
    }

    #[test]
    fn verify_version_query() {
        let bytes = Rc::new(RefCell::new(Vec::new()));
        let mut dec = Decoder::new(Box::new(RecordingHost { bytes: Rc::clone(&bytes) }));
        dec.init_standalone(OsVersion::Os95);
        dec.soft_boot().unwrap();
        dec.set_reported_version(0x0105);

        for b in [0x55, 0xC2, 0x55, 0xC3] {
            dec.irq2(b);
        }
        assert_eq!(*bytes.borrow(), vec![0x01, 0x05]);
    }

    #[test]
    fn verify_timeout_discards_partial_sequence() {
        let mut dec = booted_decoder();
        let before = dec.master_volume();

        // first half of a volume command...
        dec.irq2(0x55);
        dec.irq2(0xAA);

        // ...then 13 frames of silence on the port
        for _ in 0..13 {
            dec.main_loop().unwrap();
        }

        // The next bytes start a fresh sequence; the stale 55AA is gone.
        // 0x807F has the high bit set, so it isn't queued as a command
        // either.
        dec.irq2(0x80);
        dec.irq2(0x7F);
        assert_eq!(dec.master_volume(), before);
        assert!(dec.command_queue.is_empty());
    }

    #[test]
    fn verify_channel_volume_sequence() {
        let mut dec = booted_decoder();
        for b in [0x55, 0xAD, 0x40, 0xBF] {
            dec.irq2(b);
        }
        assert_eq!(dec.channels[2].channel_volume, 0x40);
    }

    #[test]
    fn verify_shadow_commands_accepted() {
        // 55BA..55C1 must accept their operands without observable effect
        let mut dec = booted_decoder();
        for b in [0x55, 0xBA, 0x12, 0xED] {
            dec.irq2(b);
        }
        assert_eq!(dec.channels[0].shadow_params.command, 0x12);
        assert!(dec.command_queue.is_empty());
    }
}
