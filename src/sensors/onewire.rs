//! Bit-banged one-wire bus for the DS18B20 engine probe (ESP-IDF only).
//!
//! The data pin is configured open-drain with a pull-up by hw_init; a
//! "0" drives the line low, a "1" releases it. Timings follow the
//! DS18B20 datasheet standard-speed slots.

#![cfg(target_os = "espidf")]

use esp_idf_svc::sys::{ets_delay_us, gpio_get_level, gpio_set_level};

use crate::pins;

const PIN: i32 = pins::ENGINE_PROBE_GPIO;

fn drive_low() {
    // SAFETY: pin was configured as open-drain output during hw_init.
    unsafe {
        gpio_set_level(PIN, 0);
    }
}

fn release() {
    // SAFETY: see drive_low().
    unsafe {
        gpio_set_level(PIN, 1);
    }
}

fn sample() -> bool {
    // SAFETY: read-only register access on a configured pin.
    (unsafe { gpio_get_level(PIN) }) != 0
}

fn delay_us(us: u32) {
    // SAFETY: busy-wait helper, no shared state.
    unsafe {
        ets_delay_us(us);
    }
}

/// Reset pulse. Returns `true` if a device answered with presence.
pub fn reset() -> bool {
    drive_low();
    delay_us(480);
    release();
    delay_us(70);
    let present = !sample();
    delay_us(410);
    present
}

fn write_bit(bit: bool) {
    drive_low();
    if bit {
        delay_us(6);
        release();
        delay_us(64);
    } else {
        delay_us(60);
        release();
        delay_us(10);
    }
}

fn read_bit() -> bool {
    drive_low();
    delay_us(6);
    release();
    delay_us(9);
    let bit = sample();
    delay_us(55);
    bit
}

pub fn write_byte(mut byte: u8) {
    for _ in 0..8 {
        write_bit(byte & 0x01 != 0);
        byte >>= 1;
    }
}

pub fn read_byte() -> u8 {
    let mut byte = 0u8;
    for i in 0..8 {
        if read_bit() {
            byte |= 1 << i;
        }
    }
    byte
}
