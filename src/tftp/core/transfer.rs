//! Lock-step transfer drivers
//!
//! [`receive_file`] runs on whichever peer is receiving content (client RRQ,
//! server WRQ) and [`send_file`] on whichever peer is sending it (client WRQ,
//! server RRQ). Both expect the opening packet to have gone out through the
//! session already, so a timeout before the first reply retransmits it.

use std::io::{self, Read, Write};

use super::error::{Result, TftpError};
use super::packet::{ErrorCode, HEADER_LEN, Packet};
use super::session::{Reply, TransferSession, TransferState};
use super::socket::Socket;

/// Receive DATA blocks into `sink` until a short block arrives
///
/// `session.block()` must be the last block already acknowledged (0 when the
/// transfer starts). Returns the number of payload bytes written.
pub fn receive_file<S, W>(socket: &S, session: &mut TransferSession, sink: &mut W) -> Result<u64>
where
    S: Socket + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; HEADER_LEN + session.block_size() + 1];
    let mut first_reply = true;
    session.advance();

    loop {
        let packet = match session.wait_reply(socket, &mut buf)? {
            Reply::Timeout => {
                session.on_timeout(socket)?;
                continue;
            }
            Reply::Packet(packet) => packet,
        };

        match packet {
            Packet::Data { block_num, data } => {
                if data.len() > session.block_size() {
                    session.abort(socket, ErrorCode::IllegalOperation, "Oversized data block");
                    return Err(TftpError::MalformedPacket(format!(
                        "block {} carries {} bytes, block size is {}",
                        block_num,
                        data.len(),
                        session.block_size()
                    )));
                }

                if !session.accept(block_num) {
                    let previous = session.block().wrapping_sub(1);
                    if !first_reply && block_num == previous {
                        // Our ACK got lost; the peer is resending the last block
                        log::warn!("Duplicate block {}, acknowledging again", block_num);
                        session.retransmit(socket)?;
                        session.restart_wait();
                    } else {
                        log::warn!(
                            "Received unexpected block {}, expected {}",
                            block_num,
                            session.block()
                        );
                    }
                    continue;
                }
                first_reply = false;

                if let Err(e) = sink.write_all(&data).and_then(|_| sink.flush()) {
                    session.abort(socket, ErrorCode::DiskFull, "Write failed");
                    return Err(TftpError::File(e));
                }
                session.add_bytes(data.len());
                log::debug!("Received block {} ({} bytes)", block_num, data.len());

                session.transmit(socket, &Packet::Ack(block_num))?;

                if data.len() < session.block_size() {
                    session.complete();
                    log::debug!(
                        "Transfer complete. Total bytes: {}",
                        session.bytes_transferred()
                    );
                    return Ok(session.bytes_transferred());
                }
                session.advance();
            }
            Packet::Error { code, msg } => {
                session.fail();
                return Err(TftpError::Remote { code, message: msg });
            }
            request @ (Packet::Rrq { .. } | Packet::Wrq { .. }) if first_reply => {
                answer_repeated_request(socket, session, &request)?;
            }
            other => {
                session.abort(socket, ErrorCode::IllegalOperation, "Expected DATA");
                return Err(TftpError::UnexpectedPacket(other.kind()));
            }
        }
    }
}

/// Wait for the ACK of the outstanding block, retransmitting on timeout
///
/// An ACK for the previous block is a late duplicate and is ignored without
/// answering it; any other number aborts the transfer.
pub fn await_ack<S>(socket: &S, session: &mut TransferSession) -> Result<()>
where
    S: Socket + ?Sized,
{
    let mut buf = vec![0u8; HEADER_LEN + session.block_size() + 1];

    loop {
        let packet = match session.wait_reply(socket, &mut buf)? {
            Reply::Timeout => {
                session.on_timeout(socket)?;
                continue;
            }
            Reply::Packet(packet) => packet,
        };

        match packet {
            Packet::Ack(block_num) => {
                if session.accept(block_num) {
                    log::debug!("Received ACK for block {}", block_num);
                    return Ok(());
                }
                let expected = session.block();
                if block_num == expected.wrapping_sub(1) {
                    log::debug!("Ignoring duplicate ACK {}", block_num);
                    continue;
                }
                log::error!(
                    "Unexpected ACK received. Expected: {}, Received: {}",
                    expected,
                    block_num
                );
                session.abort(socket, ErrorCode::NotDefined, "Unexpected block number");
                return Err(TftpError::UnexpectedBlock {
                    expected,
                    received: block_num,
                });
            }
            Packet::Error { code, msg } => {
                session.fail();
                return Err(TftpError::Remote { code, message: msg });
            }
            request @ (Packet::Rrq { .. } | Packet::Wrq { .. })
                if session.state() == TransferState::AwaitingFirstReply =>
            {
                answer_repeated_request(socket, session, &request)?;
            }
            other => {
                session.abort(socket, ErrorCode::IllegalOperation, "Expected ACK");
                return Err(TftpError::UnexpectedPacket(other.kind()));
            }
        }
    }
}

/// Send `source` as DATA blocks, one outstanding at a time
///
/// `session.block()` must be the last block the peer acknowledged (0 both for
/// a fresh server-side read and after the write handshake). The session only
/// completes once the short final block, possibly empty, is acknowledged.
pub fn send_file<S, R>(socket: &S, session: &mut TransferSession, source: &mut R) -> Result<u64>
where
    S: Socket + ?Sized,
    R: Read + ?Sized,
{
    let mut block = vec![0u8; session.block_size()];

    loop {
        session.advance();
        let len = match read_block(source, &mut block) {
            Ok(len) => len,
            Err(e) => {
                session.abort(socket, ErrorCode::NotDefined, "Read failed");
                return Err(TftpError::File(e));
            }
        };

        let packet = Packet::Data {
            block_num: session.block(),
            data: block[..len].to_vec(),
        };
        session.transmit(socket, &packet)?;
        log::debug!("Sent block {} ({} bytes)", session.block(), len);

        await_ack(socket, session)?;
        session.add_bytes(len);

        if len < session.block_size() {
            session.complete();
            log::debug!(
                "Transfer complete. Total bytes: {}",
                session.bytes_transferred()
            );
            return Ok(session.bytes_transferred());
        }
    }
}

/// The peer repeated its request, so our first reply never reached it
fn answer_repeated_request<S>(
    socket: &S,
    session: &mut TransferSession,
    request: &Packet,
) -> Result<()>
where
    S: Socket + ?Sized,
{
    log::warn!(
        "Repeated {} from {}, resending last packet",
        request.kind(),
        session.peer()
    );
    session.retransmit(socket)?;
    session.restart_wait();
    Ok(())
}

/// Fill `buf` from `source`, stopping early only at end of input
fn read_block<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
