//! OS boundary for the hotkey subsystem: reading raw evdev events and
//! writing synthesized ones back out. The read/write loops handle EINTR
//! retry, `read_unaligned`, and `BrokenPipe`/`UnexpectedEof` the same
//! way, behind a pair of small traits so the executor and hotkey core
//! can be driven by an in-memory fake in tests.

use crate::key::Key;
use input_linux_sys::{input_event, timeval, EV_KEY};
use libc::{self, c_ulong, ioctl};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::mem::size_of;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEdge {
    pub key: Key,
    pub down: bool,
}

/// Source of real user keystrokes (T-Hook's input side).
pub trait EventSource: Send {
    /// Blocks until the next key press/release edge (auto-repeat events
    /// are filtered out by the implementation), or returns `Ok(None)` on
    /// clean end-of-stream.
    fn next_edge(&mut self) -> io::Result<Option<KeyEdge>>;
}

/// Sink for synthesized output (executor writes, rewritten hook output).
pub trait OutputSink: Send + Sync {
    fn send(&self, key: Key, down: bool) -> io::Result<()>;
}

/// Raw evdev fd pair implementing the `input_event` byte-level protocol.
pub struct EvdevSource {
    fd: RawFd,
}

impl EvdevSource {
    pub fn new(fd: RawFd) -> Self {
        EvdevSource { fd }
    }
}

impl EventSource for EvdevSource {
    fn next_edge(&mut self) -> io::Result<Option<KeyEdge>> {
        loop {
            match read_event_raw(self.fd)? {
                None => return Ok(None),
                Some(event) => {
                    if i32::from(event.type_) != EV_KEY {
                        continue;
                    }
                    // value: 0 = up, 1 = down, 2 = OS auto-repeat (ignored).
                    let down = match event.value {
                        0 => false,
                        1 => true,
                        _ => continue,
                    };
                    let Some(key) = resolve_evdev_code(event.code) else {
                        continue;
                    };
                    return Ok(Some(KeyEdge { key, down }));
                }
            }
        }
    }
}

fn resolve_evdev_code(code: u16) -> Option<Key> {
    Some(Key::from_code(code))
}

pub struct EvdevSink {
    fd: RawFd,
}

impl EvdevSink {
    pub fn new(fd: RawFd) -> Self {
        EvdevSink { fd }
    }
}

impl OutputSink for EvdevSink {
    fn send(&self, key: Key, down: bool) -> io::Result<()> {
        let event = input_event {
            time: timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            type_: EV_KEY as u16,
            code: key.code(),
            value: if down { 1 } else { 0 },
        };
        write_event_raw(self.fd, &event)
    }
}

/// Reads exactly one `input_event` from a raw fd, retrying on `EINTR` and
/// treating a partial read followed by EOF as corruption rather than a
/// clean end-of-stream.
pub fn read_event_raw(fd: RawFd) -> io::Result<Option<input_event>> {
    let mut buf = vec![0u8; size_of::<input_event>()];
    let mut bytes_read = 0;
    let total_bytes = buf.len();

    while bytes_read < total_bytes {
        // SAFETY: `buf` is a valid, appropriately sized, mutably-borrowed
        // buffer; `fd` is provided by the caller and assumed open for reads.
        let result = unsafe {
            libc::read(
                fd,
                buf.as_mut_ptr().add(bytes_read) as *mut libc::c_void,
                total_bytes - bytes_read,
            )
        };
        match result {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() != ErrorKind::Interrupted {
                    return Err(err);
                }
            }
            0 => {
                if bytes_read == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "EOF mid-event"));
            }
            n if n > 0 => bytes_read += n as usize,
            _ => return Err(io::Error::new(ErrorKind::Other, "unexpected read() result")),
        }
    }

    // SAFETY: `buf` holds exactly `size_of::<input_event>()` bytes read
    // from the device; `read_unaligned` tolerates the fd stream's lack of
    // alignment guarantees.
    let event: input_event = unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const _) };
    Ok(Some(event))
}

/// Writes exactly one `input_event` to a raw fd, retrying on `EINTR`.
pub fn write_event_raw(fd: RawFd, event: &input_event) -> io::Result<()> {
    let total_bytes = size_of::<input_event>();
    let mut bytes_written = 0;

    // SAFETY: reinterprets a `&input_event` as its byte representation for
    // the duration of this call; the reference outlives the write loop.
    let buf: &[u8] =
        unsafe { std::slice::from_raw_parts(event as *const _ as *const u8, total_bytes) };

    while bytes_written < total_bytes {
        // SAFETY: `buf` is valid for `total_bytes`; `fd` is caller-provided.
        let result = unsafe {
            libc::write(
                fd,
                buf.as_ptr().add(bytes_written) as *const libc::c_void,
                total_bytes - bytes_written,
            )
        };
        match result {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() != ErrorKind::Interrupted {
                    return Err(err);
                }
            }
            0 => return Err(io::Error::new(ErrorKind::WriteZero, "write() returned 0")),
            n if n > 0 => bytes_written += n as usize,
            _ => return Err(io::Error::new(ErrorKind::Other, "unexpected write() result")),
        }
    }
    Ok(())
}

/// Enumerates `/dev/input/event*`, reporting the device name and whether
/// it exposes `EV_KEY`.
pub fn list_input_devices() -> io::Result<()> {
    println!("{:<20} {:<30} {}", "Device", "Name", "Has EV_KEY");
    let mut entries: Vec<_> = fs::read_dir("/dev/input/")?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            let file_name = path.file_name()?.to_str()?.to_string();
            if file_name.starts_with("event") {
                let num = file_name.trim_start_matches("event").parse::<u64>().ok();
                Some((path, num))
            } else {
                None
            }
        })
        .collect();
    entries.sort_by_key(|(_, num)| *num);

    for (path, _) in entries {
        let path_str = path.display().to_string();
        let file = match OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) => {
                println!("{:<20} {:<30} error: {e}", path_str, "");
                continue;
            }
        };
        let fd = file.as_raw_fd();
        let mut name_buf = [0u8; 256];
        let name = eviocgname(fd, &mut name_buf).unwrap_or_else(|_| "<unknown>".to_string());
        let has_key = eviocgbit(fd, 0)
            .map(|bits| is_bit_set(&bits, EV_KEY as usize))
            .unwrap_or(false);
        println!("{:<20} {:<30} {}", path_str, name, has_key);
        drop(file);
    }
    Ok(())
}

#[inline]
fn is_bit_set(buf: &[u8], bit: usize) -> bool {
    let byte_index = bit / 8;
    let bit_index = bit % 8;
    buf.get(byte_index)
        .map(|b| (b & (1 << bit_index)) != 0)
        .unwrap_or(false)
}

const EVIOCGNAME_LEN: usize = 256;

const fn ior(ty: u8, nr: u8, size: usize) -> c_ulong {
    ((2u64 << 30) | ((size as u64) << 16) | ((ty as u64) << 8) | (nr as u64)) as c_ulong
}

fn eviocgname(fd: RawFd, buf: &mut [u8; 256]) -> io::Result<String> {
    const EVIOCGNAME_IOCTL: c_ulong = ior(b'E', 0x06, EVIOCGNAME_LEN);
    // SAFETY: `buf` is a fixed 256-byte buffer matching EVIOCGNAME_LEN.
    let res = unsafe { ioctl(fd, EVIOCGNAME_IOCTL, buf.as_mut_ptr()) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    let nul = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..nul]).to_string())
}

fn eviocgbit(fd: RawFd, ev_type: u8) -> io::Result<Vec<u8>> {
    const EV_MAX: usize = 0x1f;
    let mut buf = vec![0u8; EV_MAX / 8 + 1];
    let ioctl_num = ior(b'E', 0x20 + ev_type, buf.len());
    // SAFETY: `buf` is sized for the requested bitmap length.
    let res = unsafe { ioctl(fd, ioctl_num, buf.as_mut_ptr()) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_bit_set_reads_correct_bit() {
        let buf = [0b0000_0010u8];
        assert!(is_bit_set(&buf, 1));
        assert!(!is_bit_set(&buf, 0));
        assert!(!is_bit_set(&buf, 100));
    }
}
