/// 16-bit ones'-complement sum over big-endian halfwords, carries folded back
/// in. An odd trailing byte is padded with a zero on the right.
///
/// This is the raw sum. Segments store its complement.
pub fn checksum16(data: &[u8]) -> u16 {
    let mut tally: u32 = 0;

    let mut words = data.chunks_exact(2);
    for pair in &mut words {
        tally += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
        tally = (tally & 0xffff) + (tally >> 16);
    }
    if let [last] = words.remainder() {
        tally += u32::from(*last) << 8;
        tally = (tally & 0xffff) + (tally >> 16);
    }

    tally as u16
}
