//! The Adler-32 trailing checksum used for section headers, chunk
//! payloads and table payloads.
//!
//! `flate2`/zlib compute this internally but don't expose it standalone,
//! so it's implemented directly here — the classical two 16-bit
//! running-sum algorithm, about a dozen lines.

const MOD_ADLER: u32 = 65521;

/// Computes the Adler-32 checksum of `data`.
pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + byte as u32) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}
