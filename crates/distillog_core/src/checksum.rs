//! CRC-16/ARC (poly refletido `0xA001`, init 0, sem XOR final).
//!
//! Mesma rotina do `crc16_update` da avr-libc usada no firmware.

/// Polinômio refletido do CRC-16/ARC.
const POLY: u16 = 0xA001;

/// Atualiza o CRC com um byte.
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ u16::from(byte);
    for _ in 0..8 {
        crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
    }
    crc
}

/// Calcula o CRC-16/ARC de um bloco de bytes.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0, |crc, &b| crc16_update(crc, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn reference_check_value() {
        // Valor de verificação do catálogo CRC-16/ARC
        assert_eq!(checksum(b"123456789"), 0xBB3D);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(checksum(&[0x00]), 0x0000);
        assert_eq!(checksum(&[0x01]), 0xC0C1);
        assert_eq!(checksum(&[0xFF]), 0x4040);
        assert_eq!(checksum(b"A"), 0x30C0);
    }

    #[test]
    fn incremental_matches_block() {
        let data = b"SETUP DONE!";
        let mut crc = 0;
        for &b in data {
            crc = crc16_update(crc, b);
        }
        assert_eq!(crc, checksum(data));
    }

    #[test]
    fn is_deterministic() {
        let data = [0x01, 0x2A, 0x00, 0x10, 0x27, 0x02, 0x08, 0xBC, 0x07];
        assert_eq!(checksum(&data), checksum(&data));
    }
}
