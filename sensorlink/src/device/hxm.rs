//! Zephyr HxM heart-rate strap.
//!
//! The strap streams one fixed-size packet per second over its Bluetooth
//! serial profile:
//!
//! ```text
//! STX | MSG ID | DLC | payload (DLC bytes) | CRC | ETX
//! 02  |   26   | 37  |        ...          | xx  | 03
//! ```
//!
//! The CRC is CRC-8/MAXIM (polynomial 0x8C, reflected) over the payload.

use bytes::{Buf, BytesMut};
use crc::{Crc, CRC_8_MAXIM_DOW};
use std::sync::Arc;
use tokio_util::codec::Decoder;

use super::serial::{Family, SerialDevice};
use super::{Device, DriverDescriptor};
use crate::{
    config::Config,
    error::{Error, Result},
    tracing::prelude::*,
};

/// Family name in the driver registry.
pub const FAMILY: &str = "zephyr-hxm";

const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// Message id of the HxM general data packet.
pub const MSG_ID: u8 = 0x26;

/// Payload length of the general data packet.
pub const DLC: usize = 55;

/// Header (3) + payload + CRC + ETX.
pub const FRAME_LEN: usize = DLC + 5;

// Payload offsets
const BATTERY: usize = 8;
const HEART_RATE: usize = 9;
const HEART_BEAT_NUMBER: usize = 10;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Fields of interest from one general data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HxmReading {
    /// Battery charge, percent.
    pub battery: u8,
    /// Heart rate, beats per minute.
    pub heart_rate: u8,
    /// Rolling beat counter (wraps at 255).
    pub heart_beat_number: u8,
}

/// Splits the HxM byte stream into packets, resynchronizing on corruption.
#[derive(Debug, Default)]
pub struct HxmCodec;

impl Decoder for HxmCodec {
    type Item = HxmReading;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<HxmReading>> {
        loop {
            match src.iter().position(|&b| b == STX) {
                Some(start) => src.advance(start),
                None => {
                    src.clear();
                    return Ok(None);
                }
            }

            if src.len() < FRAME_LEN {
                return Ok(None);
            }

            let frame = &src[..FRAME_LEN];
            let payload = &frame[3..3 + DLC];
            let valid = frame[1] == MSG_ID
                && usize::from(frame[2]) == DLC
                && frame[FRAME_LEN - 1] == ETX
                && CRC8.checksum(payload) == frame[3 + DLC];

            if !valid {
                trace!(frame = %hex::encode(frame), "Discarding malformed HxM packet");
                src.advance(1);
                continue;
            }

            let reading = HxmReading {
                battery: payload[BATTERY],
                heart_rate: payload[HEART_RATE],
                heart_beat_number: payload[HEART_BEAT_NUMBER],
            };
            src.advance(FRAME_LEN);
            return Ok(Some(reading));
        }
    }
}

/// Zephyr HxM family.
pub struct Hxm;

impl Family for Hxm {
    type Frame = HxmReading;
    type Codec = HxmCodec;
    const NAME: &'static str = FAMILY;
    const BAUD_RATE: u32 = 115_200;

    fn codec() -> HxmCodec {
        HxmCodec
    }

    fn report(device: &str, frame: &HxmReading) {
        info!(
            device,
            heart_rate = frame.heart_rate,
            beat = frame.heart_beat_number,
            battery = frame.battery,
            "hxm"
        );
    }
}

fn create(config: &Config) -> Result<Arc<dyn Device>> {
    Ok(Arc::new(SerialDevice::<Hxm>::new(config)))
}

inventory::submit! {
    DriverDescriptor {
        family: FAMILY,
        prefix: "HXM",
        create,
    }
}
