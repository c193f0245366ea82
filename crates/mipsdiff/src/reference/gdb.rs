//! GDB remote-protocol client for the reference model's debug stub.

use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use gdbstub::arch::Registers;
use gdbstub_arch::mips::reg::MipsCoreRegs;
use tracing::{debug, trace};

use super::packet::{self, decode_hex, encode_hex, hex_digit};
use super::{Reference, ReferenceError};
use crate::cancel::{CancelToken, Deadline};
use crate::regs::RegisterFile;

/// Granularity at which blocking reads re-check cancellation and deadlines.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Pause between connection attempts while the model starts up.
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// Timeouts for a reference session.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// How long to keep retrying the initial connection.
    pub connect_timeout: Duration,
    /// Budget for one request/reply exchange.
    pub call_timeout: Duration,
    /// Budget for free-running to a breakpoint.
    pub run_timeout: Duration,
    pub cancel: CancelToken,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(5),
            run_timeout: Duration::from_secs(30),
            cancel: CancelToken::new(),
        }
    }
}

/// Reference controller speaking GDB RSP over TCP.
pub struct GdbReference {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    options: ConnectOptions,
    connected: bool,
}

impl GdbReference {
    /// Connect to a stub listening on `addr`, retrying until
    /// `options.connect_timeout` elapses.
    pub fn connect(addr: SocketAddr, options: ConnectOptions) -> Result<Self, ReferenceError> {
        let deadline = Deadline::after(options.connect_timeout);
        let stream = loop {
            if options.cancel.is_cancelled() {
                return Err(ReferenceError::Cancelled { op: "connect" });
            }
            let attempt = deadline.remaining().clamp(Duration::from_millis(1), POLL_INTERVAL * 10);
            match TcpStream::connect_timeout(&addr, attempt) {
                Ok(stream) => break stream,
                Err(e) => {
                    trace!(%addr, error = %e, "reference not accepting yet");
                    if deadline.expired() {
                        return Err(ReferenceError::Unreachable {
                            addr: addr.to_string(),
                            after: deadline.budget(),
                        });
                    }
                    thread::sleep(CONNECT_BACKOFF.min(deadline.remaining()));
                }
            }
        };

        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        let writer = stream.try_clone()?;
        debug!(%addr, "connected to reference stub");

        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            options,
            connected: true,
        })
    }

    fn read_byte(&mut self, op: &'static str, deadline: &Deadline) -> Result<u8, ReferenceError> {
        let mut byte = [0u8; 1];
        loop {
            if self.options.cancel.is_cancelled() {
                return Err(ReferenceError::Cancelled { op });
            }
            if deadline.expired() {
                return Err(ReferenceError::Timeout {
                    op,
                    after: deadline.budget(),
                });
            }
            match self.reader.read(&mut byte) {
                Ok(0) => return Err(ReferenceError::Closed),
                Ok(_) => return Ok(byte[0]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send(
        &mut self,
        op: &'static str,
        payload: &str,
        deadline: &Deadline,
    ) -> Result<(), ReferenceError> {
        trace!(packet = payload, "->");
        self.writer.write_all(&packet::frame(payload.as_bytes()))?;
        self.writer.flush()?;
        loop {
            match self.read_byte(op, deadline)? {
                b'+' => return Ok(()),
                b'-' => return Err(ReferenceError::Nak { op }),
                _ => {}
            }
        }
    }

    fn recv(&mut self, op: &'static str, deadline: &Deadline) -> Result<String, ReferenceError> {
        while self.read_byte(op, deadline)? != b'$' {}

        let mut body = Vec::new();
        loop {
            match self.read_byte(op, deadline)? {
                b'#' => break,
                b => body.push(b),
            }
        }
        let hi = hex_digit(self.read_byte(op, deadline)?)?;
        let lo = hex_digit(self.read_byte(op, deadline)?)?;

        match packet::unframe(&body, (hi << 4) | lo) {
            Ok(payload) => {
                self.writer.write_all(b"+")?;
                let reply = String::from_utf8_lossy(&payload).into_owned();
                trace!(packet = %reply, "<-");
                Ok(reply)
            }
            Err(e) => {
                self.writer.write_all(b"-")?;
                Err(e.into())
            }
        }
    }

    fn transact_within(
        &mut self,
        op: &'static str,
        payload: &str,
        budget: Duration,
    ) -> Result<String, ReferenceError> {
        let deadline = Deadline::after(budget);
        self.send(op, payload, &deadline)?;
        let mut reply = self.recv(op, &deadline)?;
        // Console output packets may precede the real reply.
        while reply.starts_with('O') && reply != "OK" {
            debug!(output = %reply, "reference console output");
            reply = self.recv(op, &deadline)?;
        }
        Ok(reply)
    }

    fn transact(&mut self, op: &'static str, payload: &str) -> Result<String, ReferenceError> {
        self.transact_within(op, payload, self.options.call_timeout)
    }

    fn expect_ok(op: &'static str, reply: &str) -> Result<(), ReferenceError> {
        if reply == "OK" {
            return Ok(());
        }
        Err(Self::reply_error(op, reply))
    }

    fn reply_error(op: &'static str, reply: &str) -> ReferenceError {
        let code = reply
            .strip_prefix('E')
            .and_then(|code| u8::from_str_radix(code, 16).ok());
        if let Some(code) = code {
            return ReferenceError::ErrorReply { op, code };
        }
        ReferenceError::UnexpectedReply {
            op,
            reply: reply.to_string(),
        }
    }

    /// Interpret a stop reply: `S`/`T` mean stopped, `W`/`X` mean gone.
    fn expect_stopped(op: &'static str, reply: &str) -> Result<(), ReferenceError> {
        match reply.as_bytes().first() {
            Some(b'S' | b'T') => Ok(()),
            Some(b'W') => Err(ReferenceError::Exited(format!("exit code 0x{}", &reply[1..]))),
            Some(b'X') => Err(ReferenceError::Exited(format!("signal 0x{}", &reply[1..]))),
            _ => Err(Self::reply_error(op, reply)),
        }
    }

    fn read_block(&mut self) -> Result<MipsCoreRegs<u32>, ReferenceError> {
        let reply = self.transact("g", "g")?;
        if reply.starts_with('E') {
            return Err(Self::reply_error("g", &reply));
        }
        let bytes = decode_hex(reply.as_bytes())?;
        let mut block = MipsCoreRegs::<u32>::default();
        block
            .gdb_deserialize(&bytes)
            .map_err(|()| ReferenceError::RegisterLayout(bytes.len()))?;
        Ok(block)
    }

    fn write_block(&mut self, block: &MipsCoreRegs<u32>) -> Result<(), ReferenceError> {
        let mut payload = String::from("G");
        block.gdb_serialize(|byte| match byte {
            Some(b) => payload.push_str(&encode_hex(&[b])),
            None => payload.push_str("xx"),
        });
        let reply = self.transact("G", &payload)?;
        Self::expect_ok("G", &reply)
    }
}

impl Reference for GdbReference {
    fn set_registers(&mut self, regs: &RegisterFile) -> Result<(), ReferenceError> {
        let mut block = self.read_block()?;
        regs.write_to(&mut block);
        self.write_block(&block)
    }

    fn get_registers(&mut self) -> Result<RegisterFile, ReferenceError> {
        Ok(RegisterFile::from(&self.read_block()?))
    }

    fn set_breakpoint(&mut self, addr: u32) -> Result<(), ReferenceError> {
        let reply = self.transact("Z0", &format!("Z0,{addr:x},4"))?;
        Self::expect_ok("Z0", &reply)
    }

    fn remove_breakpoint(&mut self, addr: u32) -> Result<(), ReferenceError> {
        let reply = self.transact("z0", &format!("z0,{addr:x},4"))?;
        Self::expect_ok("z0", &reply)
    }

    fn continue_until_breakpoint(&mut self) -> Result<(), ReferenceError> {
        let reply = self.transact_within("c", "c", self.options.run_timeout)?;
        Self::expect_stopped("c", &reply)
    }

    fn single_step(&mut self) -> Result<(), ReferenceError> {
        let reply = self.transact("s", "s")?;
        Self::expect_stopped("s", &reply)
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, ReferenceError> {
        let reply = self.transact("m", &format!("m{addr:x},4"))?;
        let bytes = decode_hex(reply.as_bytes())
            .ok()
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
            .ok_or_else(|| Self::reply_error("m", &reply))?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn disconnect(&mut self) -> Result<(), ReferenceError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let result = self
            .transact("D", "D")
            .and_then(|reply| Self::expect_ok("D", &reply));
        let _ = self.writer.shutdown(Shutdown::Both);
        debug!("disconnected from reference stub");
        result
    }
}
