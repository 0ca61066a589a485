//! CRC-8 used by the CK inverter command frame

/// Generator polynomial
pub const CRC8_GENERATOR: u8 = 0xAD;

/// CRC-8, MSB first, initial value 0, no final xor
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| {
        (0..8).fold(crc ^ byte, |crc, _| {
            if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_GENERATOR
            } else {
                crc << 1
            }
        })
    })
}
