//! DBGP message framing.
//!
//! Engine to client: `<decimal length> NUL <payload> NUL`.
//! Client to engine: `<command line> NUL`.

use crate::error::{Error, Result};
use std::io::{Read, Write};

const NUL: u8 = 0;

/// Read a single byte, `None` means the peer closed the stream.
fn read_byte<R: Read>(reader: &mut R) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_length<R: Read>(reader: &mut R) -> Result<usize> {
    let mut digits = String::new();
    loop {
        match read_byte(reader)? {
            None => return Err(Error::ConnectionClosed),
            Some(NUL) => break,
            Some(b) if b.is_ascii_digit() => digits.push(b as char),
            Some(b) => {
                return Err(Error::MalformedLength(format!(
                    "unexpected byte {b:#04x} after \"{digits}\""
                )))
            }
        }
    }

    digits
        .parse()
        .map_err(|e| Error::MalformedLength(format!("\"{digits}\": {e}")))
}

/// The buffer grows with the received data, the announced length is not trusted for allocation.
fn read_body<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut body = vec![];
    reader.take(len as u64).read_to_end(&mut body)?;
    if body.len() < len {
        return Err(Error::ConnectionClosed);
    }
    Ok(body)
}

/// Read one length-prefixed message and return its payload.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_length(reader)?;
    let body = read_body(reader, len)?;
    // trailing terminator, its value is not checked
    if read_byte(reader)?.is_none() {
        return Err(Error::ConnectionClosed);
    }
    Ok(body)
}

/// Write a NUL-terminated command line.
pub fn write_command<W: Write>(writer: &mut W, command: &str) -> Result<()> {
    writer.write_all(command.as_bytes())?;
    writer.write_all(&[NUL])?;
    writer.flush()?;
    Ok(())
}

/// Write a length-prefixed message, the way a debugger engine frames its responses.
pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    write!(writer, "{}", payload.len())?;
    writer.write_all(&[NUL])?;
    writer.write_all(payload)?;
    writer.write_all(&[NUL])?;
    writer.flush()?;
    Ok(())
}
