//! Packet files: each RTP packet as a 2-byte big-endian length plus its bytes.

use std::io::{self, Read, Write};

use rtpvc2::{Result, Vc2Error};

pub fn write_packet<W: Write>(out: &mut W, packet: &[u8]) -> Result<()> {
    let len = u16::try_from(packet.len())
        .map_err(|_| Vc2Error::Rtp("packet too large for packet file"))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(packet)?;
    Ok(())
}

/// Read the next packet, or `None` at a clean end of file.
pub fn read_packet<R: Read>(input: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 2];
    match input.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let mut packet = vec![0u8; u16::from_be_bytes(len) as usize];
    input.read_exact(&mut packet)?;
    Ok(Some(packet))
}
